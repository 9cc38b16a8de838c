//! cmdexec core - backend-independent command abstractions
//!
//! This crate provides the command traits, the constructor seam, error types
//! and the expectation configuration shared by the real process backend and
//! the test doubles.

mod config;
mod error;
mod invocation;
mod process;
mod stdio;

pub use config::*;
pub use error::*;
pub use invocation::*;
pub use process::*;
pub use stdio::*;

// Re-exported so that constructor signatures can be written without a direct tokio-util dependency
pub use tokio_util::sync::CancellationToken;
