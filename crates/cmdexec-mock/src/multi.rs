use async_trait::async_trait;
use cmdexec_core::{
    CancellationToken, CannedResult, CapturedInput, CommandConstructor, CommandError,
    CommandExpectation, CommandRunner, Commander, ExpectationSet, Invocation, OutputError,
    PipeReader, PipeWriter, ProcessId, command_constructor,
};
use std::collections::HashMap;
use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use tracing::{debug, warn};

/// Emulates several distinct commands inside one test.
///
/// Expectations are checked in order and the first one whose name and
/// argument list are exactly equal to the invocation wins. A later entry
/// with the same pattern is never reached. An invocation nothing matches
/// fails with [`CommandError::NoMatchingCommand`].
#[derive(Debug, Clone)]
pub struct MultiCommandMock {
    expectations: Arc<[CommandExpectation]>,
}

impl MultiCommandMock {
    pub fn new(expectations: impl IntoIterator<Item = CommandExpectation>) -> Self {
        Self {
            expectations: expectations.into_iter().collect(),
        }
    }

    /// Build a matcher from a deserialized fixture
    pub fn from_set(set: ExpectationSet) -> Self {
        for duplicate in set.duplicate_patterns() {
            warn!("Expectation for `{}` is configured more than once; only the first is used", duplicate);
        }
        Self::new(set.into_expectations())
    }

    /// Load a JSON fixture file and build a matcher from it
    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        Ok(Self::from_set(ExpectationSet::from_path(path)?))
    }

    pub fn expectations(&self) -> &[CommandExpectation] {
        &self.expectations
    }

    /// Create the handle for one invocation; matching happens when a result is requested
    pub fn command<S: AsRef<str>>(
        &self,
        token: CancellationToken,
        name: &str,
        args: &[S],
    ) -> MultiMockCommand {
        MultiMockCommand {
            token,
            invocation: Invocation::new(name, args.iter().map(AsRef::<str>::as_ref)),
            dir: None,
            env: None,
            expectations: self.expectations.clone(),
            state: MatchState::Unmatched,
            stdin: CapturedInput::new(),
            start_called: false,
            wait_called: false,
        }
    }

    pub fn constructor(&self) -> CommandConstructor {
        let mock = self.clone();
        command_constructor(move |token, name, args| -> Box<dyn Commander> {
            Box::new(mock.command(token, name, args))
        })
    }
}

/// Constructor backed by a [`MultiCommandMock`] holding `expectations`
pub fn multi_command_mock(
    expectations: impl IntoIterator<Item = CommandExpectation>,
) -> CommandConstructor {
    MultiCommandMock::new(expectations).constructor()
}

/// Outcome of the most recent matching attempt
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum MatchState {
    #[default]
    Unmatched,
    /// Index of the expectation that matched
    Matched(usize),
}

/// Handle for one invocation against a [`MultiCommandMock`]
///
/// Every result-producing call re-runs the match; the `Display` output
/// describes the most recent attempt.
pub struct MultiMockCommand {
    token: CancellationToken,
    invocation: Invocation,
    dir: Option<PathBuf>,
    env: Option<HashMap<String, String>>,
    expectations: Arc<[CommandExpectation]>,
    state: MatchState,
    stdin: CapturedInput,
    start_called: bool,
    wait_called: bool,
}

impl MultiMockCommand {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    pub fn state(&self) -> MatchState {
        self.state
    }

    /// The expectation matched by the most recent call
    pub fn matched(&self) -> Option<&CommandExpectation> {
        match self.state {
            MatchState::Matched(index) => self.expectations.get(index),
            MatchState::Unmatched => None,
        }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn env(&self) -> Option<&HashMap<String, String>> {
        self.env.as_ref()
    }

    pub fn start_called(&self) -> bool {
        self.start_called
    }

    pub fn wait_called(&self) -> bool {
        self.wait_called
    }

    pub fn stdin_written(&self) -> Vec<u8> {
        self.stdin.contents()
    }

    fn match_command(&mut self) -> CannedResult {
        self.state = MatchState::Unmatched;

        let found = self
            .expectations
            .iter()
            .position(|expectation| self.invocation.matches(&expectation.name, &expectation.args));

        match found {
            Some(index) => {
                debug!("Matched command: {}", self.invocation);
                self.state = MatchState::Matched(index);
                self.expectations[index].canned()
            }
            None => {
                warn!("No matching command found for: {}", self.invocation);
                CannedResult::failure(CommandError::NoMatchingCommand)
            }
        }
    }
}

impl fmt::Display for MultiMockCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.matched() {
            Some(expectation) => write!(f, "matched command: {}", expectation.invocation()),
            None => write!(f, "no matching command found for: {}", self.invocation),
        }
    }
}

impl fmt::Debug for MultiMockCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiMockCommand")
            .field("invocation", &self.invocation)
            .field("state", &self.state)
            .field("expectations", &self.expectations.len())
            .finish()
    }
}

#[async_trait]
impl CommandRunner for MultiMockCommand {
    async fn run(&mut self) -> Result<(), CommandError> {
        self.match_command().result()
    }

    async fn output(&mut self) -> Result<Vec<u8>, OutputError> {
        self.match_command().output()
    }

    async fn combined_output(&mut self) -> Result<Vec<u8>, OutputError> {
        self.match_command().combined_output()
    }

    async fn start(&mut self) -> Result<(), CommandError> {
        self.start_called = true;
        self.match_command().result()
    }

    async fn wait(&mut self) -> Result<(), CommandError> {
        self.wait_called = true;
        self.match_command().result()
    }

    fn stdin_pipe(&mut self) -> Result<PipeWriter, CommandError> {
        Ok(self.stdin.writer())
    }

    fn stdout_pipe(&mut self) -> Result<PipeReader, CommandError> {
        let canned = self.match_command();
        if self.state == MatchState::Unmatched {
            return Err(CommandError::NoMatchingCommand);
        }
        Ok(Box::new(Cursor::new(canned.stdout)))
    }

    fn stderr_pipe(&mut self) -> Result<PipeReader, CommandError> {
        let canned = self.match_command();
        if self.state == MatchState::Unmatched {
            return Err(CommandError::NoMatchingCommand);
        }
        Ok(Box::new(Cursor::new(canned.stderr)))
    }
}

impl Commander for MultiMockCommand {
    fn name(&self) -> &str {
        &self.invocation.name
    }

    fn args(&self) -> &[String] {
        &self.invocation.args
    }

    fn set_dir(&mut self, dir: &Path) {
        self.dir = Some(dir.to_path_buf());
    }

    fn set_env(&mut self, env: HashMap<String, String>) {
        self.env = Some(env);
    }

    fn set_stdin(&mut self, _stdin: Stdio) {}

    fn set_stdout(&mut self, _stdout: Stdio) {}

    fn set_stderr(&mut self, _stderr: Stdio) {}

    fn process_id(&self) -> Option<ProcessId> {
        None
    }

    fn exit_status(&self) -> Option<ExitStatus> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn expectation(name: &str, args: &[&str], stdout: &str) -> CommandExpectation {
        CommandExpectation::builder()
            .name(name)
            .args(args)
            .stdout(stdout)
            .build()
            .unwrap()
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn mock() -> MultiCommandMock {
        MultiCommandMock::new([
            expectation("ls", &["-l"], "file1\nfile2\n"),
            expectation("cat", &["file1"], "contents of file1"),
            CommandExpectation::builder()
                .name("rm")
                .args(["file2"])
                .error(CommandError::simulated("permission denied"))
                .build()
                .unwrap(),
        ])
    }

    #[tokio::test]
    async fn test_state_follows_each_call() {
        let mock = mock();
        let mut cmd = mock.command(CancellationToken::new(), "cat", &["file1"]);
        assert_eq!(cmd.state(), MatchState::Unmatched);
        assert!(cmd.matched().is_none());

        cmd.run().await.unwrap();
        assert_eq!(cmd.state(), MatchState::Matched(1));
        assert_eq!(cmd.matched().unwrap().name, "cat");
    }

    #[tokio::test]
    async fn test_describe_before_any_call() {
        let cmd = mock().command(CancellationToken::new(), "ls", &["-l"]);
        assert_eq!(cmd.to_string(), "no matching command found for: ls -l");
    }

    #[tokio::test]
    async fn test_describe_after_match() {
        let mut cmd = mock().command(CancellationToken::new(), "ls", &["-l"]);
        cmd.output().await.unwrap();
        assert_eq!(cmd.to_string(), "matched command: ls -l");
    }

    #[tokio::test]
    async fn test_first_match_wins() {
        init_tracing();
        let mock = MultiCommandMock::new([
            expectation("git", &["status"], "first"),
            expectation("git", &["status"], "second"),
        ]);
        let mut cmd = mock.command(CancellationToken::new(), "git", &["status"]);

        assert_eq!(cmd.output().await.unwrap(), b"first");
        assert_eq!(cmd.state(), MatchState::Matched(0));
    }

    #[tokio::test]
    async fn test_simulated_error_is_returned_verbatim() {
        let mut cmd = mock().command(CancellationToken::new(), "rm", &["file2"]);

        let error = cmd.run().await.unwrap_err();
        assert!(!error.is_no_matching_command());
        assert_eq!(error.to_string(), "permission denied");
        // a configured failure still counts as a match
        assert_eq!(cmd.state(), MatchState::Matched(2));
    }

    #[tokio::test]
    async fn test_lifecycle_flags_and_matching() {
        let mut matched = mock().command(CancellationToken::new(), "ls", &["-l"]);
        matched.start().await.unwrap();
        matched.wait().await.unwrap();
        assert!(matched.start_called());
        assert!(matched.wait_called());

        let mut unmatched = mock().command(CancellationToken::new(), "ls", &["-R"]);
        assert!(unmatched.start().await.unwrap_err().is_no_matching_command());
        assert!(unmatched.wait().await.unwrap_err().is_no_matching_command());
        assert!(unmatched.start_called());
    }

    #[tokio::test]
    async fn test_pipes() {
        let mock = MultiCommandMock::new([CommandExpectation::builder()
            .name("make")
            .stdout("building")
            .stderr("warning: unused")
            .build()
            .unwrap()]);

        let mut cmd = mock.command(CancellationToken::new(), "make", &[] as &[&str]);
        let mut stdout = String::new();
        cmd.stdout_pipe().unwrap().read_to_string(&mut stdout).await.unwrap();
        let mut stderr = String::new();
        cmd.stderr_pipe().unwrap().read_to_string(&mut stderr).await.unwrap();
        assert_eq!(stdout, "building");
        assert_eq!(stderr, "warning: unused");

        let mut other = mock.command(CancellationToken::new(), "make", &["install"]);
        assert!(matches!(other.stdout_pipe(), Err(CommandError::NoMatchingCommand)));
        assert!(other.stdin_pipe().is_ok());
    }

    #[tokio::test]
    async fn test_records_configuration() {
        let mut cmd = mock().command(CancellationToken::new(), "ls", &["-l"]);
        cmd.set_dir(Path::new("/tmp"));
        cmd.set_env(HashMap::from([("LANG".to_string(), "C".to_string())]));

        assert_eq!(cmd.dir(), Some(Path::new("/tmp")));
        assert_eq!(cmd.env().unwrap()["LANG"], "C");
        assert!(cmd.process_id().is_none());
        assert!(cmd.exit_status().is_none());
    }

    #[test]
    fn test_from_set_keeps_order() {
        init_tracing();
        let set = ExpectationSet::from_json(
            r#"{ "commands": [
                { "name": "ls", "args": ["-l"], "stdout": "first" },
                { "name": "ls", "args": ["-l"], "stdout": "second" }
            ] }"#,
        )
        .unwrap();

        let mock = MultiCommandMock::from_set(set);
        assert_eq!(mock.expectations().len(), 2);
        assert_eq!(mock.expectations()[0].stdout, b"first");
    }
}
