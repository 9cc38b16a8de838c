//! Swappable external command execution.
//!
//! Code that runs external programs takes a [`CommandConstructor`] and asks it
//! for a [`Commander`] per invocation. Production wires in
//! [`default_constructor`], tests wire in one of the doubles from [`mock`].

use tracing::debug;

pub use cmdexec_core::*;
pub use cmdexec_process::{ProcessCommand, command_context};

/// Test doubles
pub mod mock {
    pub use cmdexec_mock::*;
}

/// Platform-independent factory that selects the process backend at compile time
pub struct PlatformCommandFactory;

impl PlatformCommandFactory {
    pub fn create_constructor() -> CommandConstructor {
        debug!(
            "Creating command constructor for {}",
            Self::platform_name()
        );
        cmdexec_process::ProcessCommandFactory::create_constructor()
    }

    pub fn platform_name() -> &'static str {
        cmdexec_process::ProcessCommandFactory::platform_name()
    }
}

/// Constructor that spawns real processes
pub fn default_constructor() -> CommandConstructor {
    PlatformCommandFactory::create_constructor()
}
