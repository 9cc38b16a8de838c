use crate::error::CommandError;
use crate::invocation::{CannedResult, Invocation};
use anyhow::Context;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// One expected invocation and the result handed back when it is seen
#[derive(Debug, Clone, Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct CommandExpectation {
    #[builder(setter(into))]
    pub name: String,
    #[builder(default)]
    #[builder(setter(custom))]
    pub args: Vec<String>,
    #[builder(default, setter(into))]
    pub stdout: Vec<u8>,
    #[builder(default, setter(into))]
    pub stderr: Vec<u8>,
    #[builder(default, setter(into, strip_option))]
    pub error: Option<CommandError>,
}

impl CommandExpectation {
    pub fn builder() -> CommandExpectationBuilder {
        CommandExpectationBuilder::default()
    }

    pub fn invocation(&self) -> Invocation {
        Invocation {
            name: self.name.clone(),
            args: self.args.clone(),
        }
    }

    pub fn canned(&self) -> CannedResult {
        CannedResult {
            stdout: self.stdout.clone(),
            stderr: self.stderr.clone(),
            error: self.error.clone(),
        }
    }
}

impl CommandExpectationBuilder {
    pub fn args<S: ToString, I: IntoIterator<Item = S>>(&mut self, iter: I) -> &mut Self {
        let args: Vec<String> = iter.into_iter().map(|s| s.to_string()).collect();
        self.args = Some(args);
        self
    }

    pub fn arg<T: ToString>(&mut self, arg: T) -> &mut Self {
        self.args
            .get_or_insert_with(Vec::new)
            .push(arg.to_string());
        self
    }

    fn validate(&self) -> Result<(), String> {
        match &self.name {
            Some(name) if name.is_empty() => Err("name must not be empty".to_string()),
            _ => Ok(()),
        }
    }
}

/// Serialized form of a set of expectations
///
/// ```json
/// {
///   "commands": [
///     { "name": "ls", "args": ["-l"], "stdout": "file1\nfile2\n" },
///     { "name": "rm", "args": ["file2"], "error": "permission denied" }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExpectationSet {
    #[serde(default)]
    pub commands: Vec<ExpectationRecord>,
}

/// A single serialized expectation
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExpectationRecord {
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    /// Message of a simulated failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExpectationSet {
    /// Parse and validate a JSON fixture
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let set: Self = serde_json::from_str(json).context("Failed to parse expectation set")?;
        set.validate()?;
        Ok(set)
    }

    /// Read, parse and validate a JSON fixture file
    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read expectation set from {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("Invalid expectation set in {}", path.display()))
    }

    /// Validate the configuration and return errors if invalid
    pub fn validate(&self) -> anyhow::Result<()> {
        for (index, record) in self.commands.iter().enumerate() {
            if record.name.is_empty() {
                return Err(anyhow::anyhow!("commands[{index}]: name must not be empty"));
            }
        }
        Ok(())
    }

    /// Patterns configured more than once; every entry after the first is unreachable
    pub fn duplicate_patterns(&self) -> Vec<Invocation> {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for record in &self.commands {
            let invocation = Invocation::new(record.name.clone(), record.args.iter());
            if !seen.insert(invocation.clone()) && !duplicates.contains(&invocation) {
                duplicates.push(invocation);
            }
        }
        duplicates
    }

    pub fn into_expectations(self) -> Vec<CommandExpectation> {
        self.commands.into_iter().map(CommandExpectation::from).collect()
    }
}

impl From<ExpectationRecord> for CommandExpectation {
    fn from(record: ExpectationRecord) -> Self {
        CommandExpectation {
            name: record.name,
            args: record.args,
            stdout: record.stdout.into_bytes(),
            stderr: record.stderr.into_bytes(),
            error: record.error.map(CommandError::Simulated),
        }
    }
}
