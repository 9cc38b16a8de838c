use std::process::ExitStatus;
use std::sync::Arc;
use thiserror::Error;

/// Error types for command operations
///
/// Errors are `Clone` so that a test double can hand out the same configured
/// failure on every call. I/O errors are wrapped in an `Arc` for that reason.
#[derive(Error, Debug, Clone)]
pub enum CommandError {
    /// The invocation did not match any configured expectation.
    ///
    /// This signals a mistake in the test setup rather than a simulated
    /// command failure; compare against it with
    /// [`CommandError::is_no_matching_command`].
    #[error("no matching command found in this mock")]
    NoMatchingCommand,

    /// A failure configured on a test double, returned verbatim.
    #[error("{0}")]
    Simulated(String),

    #[error("executable file not found: {0}")]
    ExecutableNotFound(String),

    #[error("failed to spawn {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: Arc<std::io::Error>,
    },

    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    /// The command ran but exited unsuccessfully.
    ///
    /// `stderr` holds the captured error stream when the caller asked for
    /// buffered output and did not redirect stderr itself.
    #[error("command exited with {status}")]
    Exit { status: ExitStatus, stderr: Vec<u8> },

    #[error("command already started")]
    AlreadyStarted,

    #[error("command not started")]
    NotStarted,

    #[error("wait was already called")]
    AlreadyWaited,

    #[error("stdin already set")]
    StdinAlreadySet,

    #[error("stdout already set")]
    StdoutAlreadySet,

    #[error("stderr already set")]
    StderrAlreadySet,

    #[error("command cancelled")]
    Cancelled,
}

impl CommandError {
    /// Create a simulated failure with the given message
    pub fn simulated(message: impl Into<String>) -> Self {
        CommandError::Simulated(message.into())
    }

    /// Check if this is the "no matching command" sentinel
    pub fn is_no_matching_command(&self) -> bool {
        matches!(self, CommandError::NoMatchingCommand)
    }

    /// Check if the command was cancelled through its token
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CommandError::Cancelled)
    }

    /// Exit code of an unsuccessful command, if it exited normally
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            CommandError::Exit { status, .. } => status.code(),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CommandError {
    fn from(error: std::io::Error) -> Self {
        CommandError::Io(Arc::new(error))
    }
}

/// Error returned by the buffered output operations.
///
/// A failed command may still have produced output; it is kept next to the
/// error instead of being discarded.
#[derive(Error, Debug, Clone)]
#[error("{error}")]
pub struct OutputError {
    /// Whatever was collected before the failure was reported
    pub output: Vec<u8>,
    pub error: CommandError,
}

impl OutputError {
    pub fn new(output: Vec<u8>, error: CommandError) -> Self {
        Self { output, error }
    }

    pub fn is_no_matching_command(&self) -> bool {
        self.error.is_no_matching_command()
    }

    pub fn into_parts(self) -> (Vec<u8>, CommandError) {
        (self.output, self.error)
    }
}

impl From<CommandError> for OutputError {
    fn from(error: CommandError) -> Self {
        Self::new(Vec::new(), error)
    }
}

impl From<std::io::Error> for OutputError {
    fn from(error: std::io::Error) -> Self {
        CommandError::from(error).into()
    }
}

impl From<OutputError> for CommandError {
    fn from(error: OutputError) -> Self {
        error.error
    }
}
