//! Test doubles for the cmdexec command abstraction.
//!
//! [`MockCommand`] answers every invocation with one canned result, while
//! [`MultiCommandMock`] holds an ordered list of expectations and answers
//! each invocation with the first exact match.

mod mock;
mod multi;

pub use mock::*;
pub use multi::*;
