use crate::error::{CommandError, OutputError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A program name plus its ordered arguments
///
/// Two invocations are equal only when the names are equal and the argument
/// lists are equal element by element, in order. Nothing is normalized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Invocation {
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new<S: ToString, I: IntoIterator<Item = S>>(name: impl Into<String>, args: I) -> Self {
        Self {
            name: name.into(),
            args: args.into_iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Exact comparison against a name and argument list
    pub fn matches(&self, name: &str, args: &[String]) -> bool {
        self.name == name && self.args == args
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Canned outcome of a simulated command: both output streams and an optional error
#[derive(Debug, Clone, Default)]
pub struct CannedResult {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub error: Option<CommandError>,
}

impl CannedResult {
    /// A successful result writing `stdout`
    pub fn stdout(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Default::default()
        }
    }

    /// A result that fails with `error` and produces no output
    pub fn failure(error: CommandError) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn with_stderr(mut self, stderr: impl Into<Vec<u8>>) -> Self {
        self.stderr = stderr.into();
        self
    }

    pub fn with_error(mut self, error: CommandError) -> Self {
        self.error = Some(error);
        self
    }

    /// The configured error, if any
    pub fn result(&self) -> Result<(), CommandError> {
        match &self.error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    /// Standard output, with the configured error attached when there is one
    pub fn output(&self) -> Result<Vec<u8>, OutputError> {
        self.finish(self.stdout.clone())
    }

    /// Standard output immediately followed by standard error
    pub fn combined_output(&self) -> Result<Vec<u8>, OutputError> {
        let mut combined = Vec::with_capacity(self.stdout.len() + self.stderr.len());
        combined.extend_from_slice(&self.stdout);
        combined.extend_from_slice(&self.stderr);
        self.finish(combined)
    }

    fn finish(&self, output: Vec<u8>) -> Result<Vec<u8>, OutputError> {
        match &self.error {
            Some(error) => Err(OutputError::new(output, error.clone())),
            None => Ok(output),
        }
    }
}
