use async_trait::async_trait;
use cmdexec_core::{
    CancellationToken, CannedResult, CapturedInput, CommandConstructor, CommandError,
    CommandRunner, Commander, Invocation, OutputError, PipeReader, PipeWriter, ProcessId,
    command_constructor,
};
use std::collections::HashMap;
use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Validates how a [`MockCommand`] was constructed and configured.
///
/// Runs before any result is produced; an error short-circuits the call and
/// is returned in place of the canned result.
pub type CheckFn = Arc<dyn Fn(&MockCommand) -> Result<(), CommandError> + Send + Sync>;

/// Wrap a closure as a [`CheckFn`]
pub fn check_fn<F>(f: F) -> CheckFn
where
    F: Fn(&MockCommand) -> Result<(), CommandError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Command double that answers every call with the same canned result
#[derive(Clone)]
pub struct MockCommand {
    token: CancellationToken,
    invocation: Invocation,
    dir: Option<PathBuf>,
    env: Option<HashMap<String, String>>,
    canned: CannedResult,
    check: Option<CheckFn>,
    stdin: CapturedInput,
    start_called: bool,
    wait_called: bool,
}

impl MockCommand {
    pub fn new<S: AsRef<str>>(token: CancellationToken, name: &str, args: &[S]) -> Self {
        Self {
            token,
            invocation: Invocation::new(name, args.iter().map(AsRef::<str>::as_ref)),
            dir: None,
            env: None,
            canned: CannedResult::default(),
            check: None,
            stdin: CapturedInput::new(),
            start_called: false,
            wait_called: false,
        }
    }

    pub fn with_result(mut self, canned: CannedResult) -> Self {
        self.canned = canned;
        self
    }

    pub fn with_check(mut self, check: CheckFn) -> Self {
        self.check = Some(check);
        self
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    /// Working directory recorded by `set_dir`
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Environment recorded by `set_env`
    pub fn env(&self) -> Option<&HashMap<String, String>> {
        self.env.as_ref()
    }

    pub fn canned(&self) -> &CannedResult {
        &self.canned
    }

    pub fn start_called(&self) -> bool {
        self.start_called
    }

    pub fn wait_called(&self) -> bool {
        self.wait_called
    }

    /// Bytes written to the pipe returned by `stdin_pipe`
    pub fn stdin_written(&self) -> Vec<u8> {
        self.stdin.contents()
    }

    fn check(&self) -> Result<(), CommandError> {
        match &self.check {
            Some(check) => check(self),
            None => Ok(()),
        }
    }

    fn respond_run(&mut self) -> Result<(), CommandError> {
        self.check()?;
        self.canned.result()
    }

    fn respond_output(&mut self) -> Result<Vec<u8>, OutputError> {
        self.check()?;
        self.canned.output()
    }

    fn respond_combined_output(&mut self) -> Result<Vec<u8>, OutputError> {
        self.check()?;
        self.canned.combined_output()
    }

    fn respond_start(&mut self) -> Result<(), CommandError> {
        self.start_called = true;
        self.check()?;
        self.canned.result()
    }

    fn respond_wait(&mut self) -> Result<(), CommandError> {
        self.wait_called = true;
        self.canned.result()
    }

    fn stdout_reader(&self) -> PipeReader {
        Box::new(Cursor::new(self.canned.stdout.clone()))
    }

    fn stderr_reader(&self) -> PipeReader {
        Box::new(Cursor::new(self.canned.stderr.clone()))
    }
}

impl fmt::Debug for MockCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockCommand")
            .field("invocation", &self.invocation)
            .field("dir", &self.dir)
            .field("env", &self.env)
            .field("canned", &self.canned)
            .field("check", &self.check.is_some())
            .field("start_called", &self.start_called)
            .field("wait_called", &self.wait_called)
            .finish()
    }
}

#[async_trait]
impl CommandRunner for MockCommand {
    async fn run(&mut self) -> Result<(), CommandError> {
        self.respond_run()
    }

    async fn output(&mut self) -> Result<Vec<u8>, OutputError> {
        self.respond_output()
    }

    async fn combined_output(&mut self) -> Result<Vec<u8>, OutputError> {
        self.respond_combined_output()
    }

    async fn start(&mut self) -> Result<(), CommandError> {
        self.respond_start()
    }

    async fn wait(&mut self) -> Result<(), CommandError> {
        self.respond_wait()
    }

    fn stdin_pipe(&mut self) -> Result<PipeWriter, CommandError> {
        Ok(self.stdin.writer())
    }

    fn stdout_pipe(&mut self) -> Result<PipeReader, CommandError> {
        Ok(self.stdout_reader())
    }

    fn stderr_pipe(&mut self) -> Result<PipeReader, CommandError> {
        Ok(self.stderr_reader())
    }
}

impl Commander for MockCommand {
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

    // Stream redirection has nothing to act on in a mock.

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

/// A [`MockCommand`] shared between the code under test and the test itself.
///
/// Every handle built by [`mock_shared`] points at the same mock, so flags
/// and recorded configuration can be inspected after the code under test has
/// dropped its handle.
#[derive(Clone, Debug)]
pub struct SharedMockCommand {
    inner: Arc<Mutex<MockCommand>>,
    name: String,
    args: Vec<String>,
}

impl SharedMockCommand {
    pub fn new(command: MockCommand) -> Self {
        Self {
            name: command.invocation.name.clone(),
            args: command.invocation.args.clone(),
            inner: Arc::new(Mutex::new(command)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, MockCommand> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn start_called(&self) -> bool {
        self.lock().start_called()
    }

    pub fn wait_called(&self) -> bool {
        self.lock().wait_called()
    }
}

#[async_trait]
impl CommandRunner for SharedMockCommand {
    async fn run(&mut self) -> Result<(), CommandError> {
        self.lock().respond_run()
    }

    async fn output(&mut self) -> Result<Vec<u8>, OutputError> {
        self.lock().respond_output()
    }

    async fn combined_output(&mut self) -> Result<Vec<u8>, OutputError> {
        self.lock().respond_combined_output()
    }

    async fn start(&mut self) -> Result<(), CommandError> {
        self.lock().respond_start()
    }

    async fn wait(&mut self) -> Result<(), CommandError> {
        self.lock().respond_wait()
    }

    fn stdin_pipe(&mut self) -> Result<PipeWriter, CommandError> {
        Ok(self.lock().stdin.writer())
    }

    fn stdout_pipe(&mut self) -> Result<PipeReader, CommandError> {
        Ok(self.lock().stdout_reader())
    }

    fn stderr_pipe(&mut self) -> Result<PipeReader, CommandError> {
        Ok(self.lock().stderr_reader())
    }
}

impl Commander for SharedMockCommand {
    fn name(&self) -> &str {
        &self.name
    }

    fn args(&self) -> &[String] {
        &self.args
    }

    fn set_dir(&mut self, dir: &Path) {
        self.lock().set_dir(dir)
    }

    fn set_env(&mut self, env: HashMap<String, String>) {
        self.lock().set_env(env)
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

/// Constructor whose commands all write `fixed_output` and succeed
pub fn mock_with_output(fixed_output: impl Into<Vec<u8>>, check: Option<CheckFn>) -> CommandConstructor {
    mock_with_result(CannedResult::stdout(fixed_output), check)
}

/// Constructor whose commands all fail as if the executable could not be found
pub fn mock_with_generic_error(check: Option<CheckFn>) -> CommandConstructor {
    command_constructor(move |token, name, args| -> Box<dyn Commander> {
        let canned = CannedResult::failure(CommandError::ExecutableNotFound(name.to_string()));
        Box::new(build(token, name, args, canned, check.clone()))
    })
}

/// Constructor whose commands all write `fixed_output` and then fail with `error`
pub fn mock_with_specific_error(
    fixed_output: impl Into<Vec<u8>>,
    error: CommandError,
    check: Option<CheckFn>,
) -> CommandConstructor {
    mock_with_result(CannedResult::stdout(fixed_output).with_error(error), check)
}

/// Constructor handing out the given result for every invocation
pub fn mock_with_result(canned: CannedResult, check: Option<CheckFn>) -> CommandConstructor {
    command_constructor(move |token, name, args| -> Box<dyn Commander> {
        Box::new(build(token, name, args, canned.clone(), check.clone()))
    })
}

/// Constructor that ignores the invocation and always hands out `command`
pub fn mock_shared(command: SharedMockCommand) -> CommandConstructor {
    command_constructor(move |_token, name, args| -> Box<dyn Commander> {
        debug!("Handing out shared mock for {} {:?}", name, args);
        Box::new(command.clone())
    })
}

fn build(
    token: CancellationToken,
    name: &str,
    args: &[&str],
    canned: CannedResult,
    check: Option<CheckFn>,
) -> MockCommand {
    let mut command = MockCommand::new(token, name, args).with_result(canned);
    command.check = check;
    command
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn token() -> CancellationToken {
        CancellationToken::new()
    }

    #[tokio::test]
    async fn test_fixed_output() {
        let constructor = mock_with_output("fixed", None);
        let mut cmd = constructor(token(), "anything", &["at", "all"]);

        assert_eq!(cmd.name(), "anything");
        assert_eq!(cmd.args(), ["at", "all"]);
        assert_eq!(cmd.output().await.unwrap(), b"fixed");
        assert_eq!(cmd.combined_output().await.unwrap(), b"fixed");
        assert!(cmd.run().await.is_ok());
        assert!(cmd.process_id().is_none());
        assert!(cmd.exit_status().is_none());
    }

    #[tokio::test]
    async fn test_generic_error_names_the_command() {
        let constructor = mock_with_generic_error(None);
        let mut cmd = constructor(token(), "kubectl", &["get", "pods"]);

        let error = cmd.run().await.unwrap_err();
        assert!(matches!(&error, CommandError::ExecutableNotFound(name) if name == "kubectl"));

        let error = cmd.output().await.unwrap_err();
        assert!(error.output.is_empty());
    }

    #[tokio::test]
    async fn test_specific_error_keeps_output() {
        let constructor =
            mock_with_specific_error("half done", CommandError::simulated("disk full"), None);
        let mut cmd = constructor(token(), "dd", &[]);

        let error = cmd.output().await.unwrap_err();
        assert_eq!(error.output, b"half done");
        assert_eq!(error.error.to_string(), "disk full");
    }

    #[tokio::test]
    async fn test_check_short_circuits() {
        let check = check_fn(|cmd| {
            if cmd.args() == ["--force"] {
                Ok(())
            } else {
                Err(CommandError::simulated(format!(
                    "unexpected invocation: {}",
                    cmd.invocation()
                )))
            }
        });
        let constructor = mock_with_output("ok", Some(check));

        let mut good = constructor(token(), "deploy", &["--force"]);
        assert_eq!(good.output().await.unwrap(), b"ok");

        let mut bad = constructor(token(), "deploy", &["--dry-run"]);
        let error = bad.output().await.unwrap_err();
        assert!(error.output.is_empty());
        assert_eq!(error.error.to_string(), "unexpected invocation: deploy --dry-run");
        assert!(bad.run().await.is_err());
        assert!(bad.start().await.is_err());
        // wait does not consult the check
        assert!(bad.wait().await.is_ok());
    }

    #[tokio::test]
    async fn test_check_sees_recorded_configuration() {
        let check = check_fn(|cmd| match cmd.dir() {
            Some(dir) if dir == Path::new("/srv") => Ok(()),
            other => Err(CommandError::simulated(format!("wrong dir: {other:?}"))),
        });
        let mut cmd = MockCommand::new(token(), "make", &["all"]).with_check(check);

        assert!(cmd.run().await.is_err());
        cmd.set_dir(Path::new("/srv"));
        cmd.set_env(HashMap::from([("CC".to_string(), "clang".to_string())]));
        assert!(cmd.run().await.is_ok());
        assert_eq!(cmd.env().unwrap()["CC"], "clang");
    }

    #[tokio::test]
    async fn test_start_and_wait_flags() {
        let mut cmd = MockCommand::new(token(), "sleep", &["1"]);
        assert!(!cmd.start_called());
        assert!(!cmd.wait_called());

        cmd.start().await.unwrap();
        cmd.wait().await.unwrap();
        assert!(cmd.start_called());
        assert!(cmd.wait_called());
    }

    #[tokio::test]
    async fn test_pipes() {
        let canned = CannedResult::stdout("out").with_stderr("err");
        let mut cmd = MockCommand::new(token(), "tool", &[] as &[&str]).with_result(canned);

        let mut stdin = cmd.stdin_pipe().unwrap();
        stdin.write_all(b"input").await.unwrap();
        assert_eq!(cmd.stdin_written(), b"input");

        let mut stdout = String::new();
        cmd.stdout_pipe().unwrap().read_to_string(&mut stdout).await.unwrap();
        assert_eq!(stdout, "out");

        let mut stderr = String::new();
        cmd.stderr_pipe().unwrap().read_to_string(&mut stderr).await.unwrap();
        assert_eq!(stderr, "err");
    }

    #[tokio::test]
    async fn test_shared_mock_is_inspectable() {
        let shared = SharedMockCommand::new(
            MockCommand::new(token(), "systemctl", &["restart", "nginx"])
                .with_result(CannedResult::stdout("restarted")),
        );
        let constructor = mock_shared(shared.clone());

        {
            let mut cmd = constructor(token(), "ignored", &["ignored"]);
            assert_eq!(cmd.name(), "systemctl");
            cmd.set_dir(Path::new("/etc"));
            cmd.start().await.unwrap();
            cmd.wait().await.unwrap();
        }

        assert!(shared.start_called());
        assert!(shared.wait_called());
        assert_eq!(shared.lock().dir(), Some(Path::new("/etc")));

        let mut again = constructor(token(), "ignored", &[]);
        assert_eq!(again.output().await.unwrap(), b"restarted");
    }
}
