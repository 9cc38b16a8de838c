use crate::error::{CommandError, OutputError};
use crate::stdio::{PipeReader, PipeWriter};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Unique identifier for a process
pub type ProcessId = u32;

/// Lifecycle, buffered output and pipe operations of an external command
///
/// Every backend implements this: the real process adapter as well as the
/// test doubles. Callers should only ever hold a `Box<dyn Commander>` handed
/// out by a [`CommandConstructor`], so production and test wiring differ only
/// in which constructor is passed in.
#[async_trait]
pub trait CommandRunner: Send {
    /// Start the command and wait for it to complete
    async fn run(&mut self) -> Result<(), CommandError>;

    /// Run the command and return its standard output
    ///
    /// On failure the returned [`OutputError`] still carries whatever output
    /// was produced.
    async fn output(&mut self) -> Result<Vec<u8>, OutputError>;

    /// Run the command and return standard output and standard error together
    async fn combined_output(&mut self) -> Result<Vec<u8>, OutputError>;

    /// Start the command without waiting for it to complete
    async fn start(&mut self) -> Result<(), CommandError>;

    /// Wait for a started command to exit
    async fn wait(&mut self) -> Result<(), CommandError>;

    /// Pipe connected to the command's standard input once it starts
    fn stdin_pipe(&mut self) -> Result<PipeWriter, CommandError>;

    /// Pipe connected to the command's standard output once it starts
    fn stdout_pipe(&mut self) -> Result<PipeReader, CommandError>;

    /// Pipe connected to the command's standard error once it starts
    fn stderr_pipe(&mut self) -> Result<PipeReader, CommandError>;
}

/// A configurable handle to one external command invocation
pub trait Commander: CommandRunner {
    /// The program name this handle was constructed with
    fn name(&self) -> &str;

    /// The arguments this handle was constructed with
    fn args(&self) -> &[String];

    fn set_dir(&mut self, dir: &Path);

    /// Replace the command's environment with exactly these variables
    fn set_env(&mut self, env: HashMap<String, String>);

    fn set_stdin(&mut self, stdin: Stdio);

    fn set_stdout(&mut self, stdout: Stdio);

    fn set_stderr(&mut self, stderr: Stdio);

    /// Process ID of the started command (None if it never started)
    fn process_id(&self) -> Option<ProcessId>;

    /// Exit status once the command has been waited on
    fn exit_status(&self) -> Option<ExitStatus>;
}

/// Creates a command handle from a cancellation token, a program name and its arguments.
///
/// This is the seam between calling code and the backend: production code is
/// wired with the real process constructor, tests with one of the mocks.
pub type CommandConstructor =
    Arc<dyn Fn(CancellationToken, &str, &[&str]) -> Box<dyn Commander> + Send + Sync>;

/// Wrap a closure or function as a [`CommandConstructor`]
pub fn command_constructor<F>(f: F) -> CommandConstructor
where
    F: Fn(CancellationToken, &str, &[&str]) -> Box<dyn Commander> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Implementation of CommandRunner for boxed trait objects so generic code accepts constructor output
#[async_trait]
impl CommandRunner for Box<dyn Commander> {
    async fn run(&mut self) -> Result<(), CommandError> {
        (**self).run().await
    }

    async fn output(&mut self) -> Result<Vec<u8>, OutputError> {
        (**self).output().await
    }

    async fn combined_output(&mut self) -> Result<Vec<u8>, OutputError> {
        (**self).combined_output().await
    }

    async fn start(&mut self) -> Result<(), CommandError> {
        (**self).start().await
    }

    async fn wait(&mut self) -> Result<(), CommandError> {
        (**self).wait().await
    }

    fn stdin_pipe(&mut self) -> Result<PipeWriter, CommandError> {
        (**self).stdin_pipe()
    }

    fn stdout_pipe(&mut self) -> Result<PipeReader, CommandError> {
        (**self).stdout_pipe()
    }

    fn stderr_pipe(&mut self) -> Result<PipeReader, CommandError> {
        (**self).stderr_pipe()
    }
}

impl Commander for Box<dyn Commander> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn args(&self) -> &[String] {
        (**self).args()
    }

    fn set_dir(&mut self, dir: &Path) {
        (**self).set_dir(dir)
    }

    fn set_env(&mut self, env: HashMap<String, String>) {
        (**self).set_env(env)
    }

    fn set_stdin(&mut self, stdin: Stdio) {
        (**self).set_stdin(stdin)
    }

    fn set_stdout(&mut self, stdout: Stdio) {
        (**self).set_stdout(stdout)
    }

    fn set_stderr(&mut self, stderr: Stdio) {
        (**self).set_stderr(stderr)
    }

    fn process_id(&self) -> Option<ProcessId> {
        (**self).process_id()
    }

    fn exit_status(&self) -> Option<ExitStatus> {
        (**self).exit_status()
    }
}
