//! Real process backend for the cmdexec command abstraction.

mod pipe;
mod process_command;

use cmdexec_core::{CancellationToken, CommandConstructor, Commander, command_constructor};

pub use process_command::ProcessCommand;

/// Create a handle for a real child process running `name` with `args`.
///
/// This is the production [`CommandConstructor`]; nothing is spawned until one
/// of the lifecycle or output operations is called.
pub fn command_context(token: CancellationToken, name: &str, args: &[&str]) -> Box<dyn Commander> {
    Box::new(ProcessCommand::new(token, name, args))
}

pub struct ProcessCommandFactory;

impl ProcessCommandFactory {
    pub fn create_constructor() -> CommandConstructor {
        command_constructor(command_context)
    }

    pub fn platform_name() -> &'static str {
        #[cfg(unix)]
        return "unix";

        #[cfg(windows)]
        return "windows";

        #[cfg(not(any(unix, windows)))]
        return "unknown";
    }
}
