use crate::pipe::DeferredPipe;
use async_trait::async_trait;
use cmdexec_core::{
    CommandError, CommandRunner, Commander, OutputError, PipeReader, PipeWriter, ProcessId,
};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Which standard streams the caller has taken over, through a setter or a pipe
#[derive(Debug, Default, Clone, Copy)]
struct Redirects {
    stdin: bool,
    stdout: bool,
    stderr: bool,
}

/// Pipes handed out before start, waiting for the spawned child
#[derive(Default)]
struct PendingPipes {
    stdin: Option<oneshot::Sender<ChildStdin>>,
    stdout: Option<oneshot::Sender<ChildStdout>>,
    stderr: Option<oneshot::Sender<ChildStderr>>,
}

impl PendingPipes {
    /// Hand the child's streams to the pipes requested before start.
    ///
    /// Streams nobody asked for stay on the child, where `output` picks them up.
    fn deliver(&mut self, child: &mut Child) {
        // a failed send means the caller dropped the pipe; the child end is dropped with it
        if let Some(tx) = self.stdin.take() {
            if let Some(pipe) = child.stdin.take() {
                let _ = tx.send(pipe);
            }
        }
        if let Some(tx) = self.stdout.take() {
            if let Some(pipe) = child.stdout.take() {
                let _ = tx.send(pipe);
            }
        }
        if let Some(tx) = self.stderr.take() {
            if let Some(pipe) = child.stderr.take() {
                let _ = tx.send(pipe);
            }
        }
    }
}

/// Command handle backed by a real child process
///
/// Calls are forwarded to [`tokio::process::Command`]. Streams that are not
/// configured are connected to the null device. The cancellation token given
/// at construction kills the child if it fires while the command is running.
pub struct ProcessCommand {
    token: CancellationToken,
    name: String,
    args: Vec<String>,
    /// Taken when the command is started
    command: Option<Command>,
    child: Option<Child>,
    pid: Option<ProcessId>,
    redirects: Redirects,
    pending: PendingPipes,
    waited: bool,
    exit_status: Option<ExitStatus>,
}

impl ProcessCommand {
    pub fn new<S: AsRef<str>>(token: CancellationToken, name: &str, args: &[S]) -> Self {
        let args: Vec<String> = args
            .iter()
            .map(AsRef::<str>::as_ref)
            .map(str::to_string)
            .collect();

        let mut command = Command::new(name);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        Self {
            token,
            name: name.to_string(),
            args,
            command: Some(command),
            child: None,
            pid: None,
            redirects: Redirects::default(),
            pending: PendingPipes::default(),
            waited: false,
            exit_status: None,
        }
    }

    /// Cancellation token this command was constructed with
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    fn command_mut(&mut self) -> Option<&mut Command> {
        if self.command.is_none() {
            warn!("Ignoring configuration of {}: command already started", self.name);
        }
        self.command.as_mut()
    }

    fn spawn_error(&self, error: std::io::Error) -> CommandError {
        if error.kind() == std::io::ErrorKind::NotFound {
            CommandError::ExecutableNotFound(self.name.clone())
        } else {
            CommandError::Spawn {
                name: self.name.clone(),
                source: Arc::new(error),
            }
        }
    }
}

/// Read a captured stream to the end; a stream that was not captured reads as empty
async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

fn exit_result(status: ExitStatus) -> Result<(), CommandError> {
    if status.success() {
        Ok(())
    } else {
        Err(CommandError::Exit {
            status,
            stderr: Vec::new(),
        })
    }
}

#[async_trait]
impl CommandRunner for ProcessCommand {
    async fn run(&mut self) -> Result<(), CommandError> {
        self.start().await?;
        self.wait().await
    }

    async fn output(&mut self) -> Result<Vec<u8>, OutputError> {
        if self.redirects.stdout {
            return Err(CommandError::StdoutAlreadySet.into());
        }
        let capture_stderr = !self.redirects.stderr;
        if let Some(command) = self.command.as_mut() {
            command.stdout(Stdio::piped());
            if capture_stderr {
                command.stderr(Stdio::piped());
            }
        }

        self.start().await?;
        let (stdout, stderr) = match self.child.as_mut() {
            Some(child) => (child.stdout.take(), child.stderr.take()),
            None => (None, None),
        };

        let (waited, stdout, stderr) =
            tokio::join!(self.wait(), read_pipe(stdout), read_pipe(stderr));
        let stdout = stdout?;

        match waited {
            Ok(()) => Ok(stdout),
            Err(CommandError::Exit { status, .. }) => Err(OutputError::new(
                stdout,
                CommandError::Exit {
                    status,
                    stderr: stderr.unwrap_or_default(),
                },
            )),
            Err(error) => Err(OutputError::new(stdout, error)),
        }
    }

    async fn combined_output(&mut self) -> Result<Vec<u8>, OutputError> {
        if self.redirects.stdout {
            return Err(CommandError::StdoutAlreadySet.into());
        }
        if self.redirects.stderr {
            return Err(CommandError::StderrAlreadySet.into());
        }

        // one OS pipe behind both streams keeps their writes interleaved as the child made them
        let (mut reader, writer) = std::io::pipe()?;
        let error_writer = writer.try_clone()?;
        if let Some(command) = self.command.as_mut() {
            command.stdout(writer).stderr(error_writer);
        }

        // starting drops the command and with it the parent's copies of the write end
        self.start().await?;
        let collect = tokio::task::spawn_blocking(move || {
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf).map(|_| buf)
        });

        let (waited, collected) = tokio::join!(self.wait(), collect);
        let output = collected.map_err(std::io::Error::other)??;

        match waited {
            Ok(()) => Ok(output),
            Err(error) => Err(OutputError::new(output, error)),
        }
    }

    async fn start(&mut self) -> Result<(), CommandError> {
        if self.command.is_some() && self.token.is_cancelled() {
            // dropping the senders lets pipes handed out earlier see EOF
            self.pending = PendingPipes::default();
            return Err(CommandError::Cancelled);
        }
        let mut command = self.command.take().ok_or(CommandError::AlreadyStarted)?;

        let spawned = command.spawn();
        drop(command);
        let mut child = match spawned {
            Ok(child) => child,
            Err(error) => {
                self.pending = PendingPipes::default();
                return Err(self.spawn_error(error));
            }
        };

        self.pid = child.id();
        info!(
            "Spawned process: {} (PID: {:?}) with args: {:?}",
            self.name, self.pid, self.args
        );

        self.pending.deliver(&mut child);
        self.child = Some(child);
        Ok(())
    }

    async fn wait(&mut self) -> Result<(), CommandError> {
        let Some(child) = self.child.as_mut() else {
            return Err(CommandError::NotStarted);
        };
        if self.waited {
            return Err(CommandError::AlreadyWaited);
        }
        self.waited = true;

        let token = self.token.clone();
        let exited = tokio::select! {
            status = child.wait() => Some(status),
            () = token.cancelled() => None,
        };

        let status = match exited {
            Some(status) => status?,
            None => {
                warn!(
                    "Command {} (PID: {:?}) cancelled, killing it",
                    self.name, self.pid
                );
                child.kill().await?;
                self.exit_status = child.try_wait()?;
                return Err(CommandError::Cancelled);
            }
        };

        debug!("Process {} (PID: {:?}) exited with {}", self.name, self.pid, status);
        self.exit_status = Some(status);
        exit_result(status)
    }

    fn stdin_pipe(&mut self) -> Result<PipeWriter, CommandError> {
        if self.redirects.stdin {
            return Err(CommandError::StdinAlreadySet);
        }
        let command = self.command.as_mut().ok_or(CommandError::AlreadyStarted)?;
        command.stdin(Stdio::piped());
        self.redirects.stdin = true;

        let (tx, pipe) = DeferredPipe::channel();
        self.pending.stdin = Some(tx);
        Ok(Box::new(pipe))
    }

    fn stdout_pipe(&mut self) -> Result<PipeReader, CommandError> {
        if self.redirects.stdout {
            return Err(CommandError::StdoutAlreadySet);
        }
        let command = self.command.as_mut().ok_or(CommandError::AlreadyStarted)?;
        command.stdout(Stdio::piped());
        self.redirects.stdout = true;

        let (tx, pipe) = DeferredPipe::channel();
        self.pending.stdout = Some(tx);
        Ok(Box::new(pipe))
    }

    fn stderr_pipe(&mut self) -> Result<PipeReader, CommandError> {
        if self.redirects.stderr {
            return Err(CommandError::StderrAlreadySet);
        }
        let command = self.command.as_mut().ok_or(CommandError::AlreadyStarted)?;
        command.stderr(Stdio::piped());
        self.redirects.stderr = true;

        let (tx, pipe) = DeferredPipe::channel();
        self.pending.stderr = Some(tx);
        Ok(Box::new(pipe))
    }
}

impl Commander for ProcessCommand {
    fn name(&self) -> &str {
        &self.name
    }

    fn args(&self) -> &[String] {
        &self.args
    }

    fn set_dir(&mut self, dir: &Path) {
        if let Some(command) = self.command_mut() {
            command.current_dir(dir);
        }
    }

    fn set_env(&mut self, env: HashMap<String, String>) {
        if let Some(command) = self.command_mut() {
            command.env_clear().envs(env);
        }
    }

    fn set_stdin(&mut self, stdin: Stdio) {
        if let Some(command) = self.command_mut() {
            command.stdin(stdin);
            self.redirects.stdin = true;
        }
    }

    fn set_stdout(&mut self, stdout: Stdio) {
        if let Some(command) = self.command_mut() {
            command.stdout(stdout);
            self.redirects.stdout = true;
        }
    }

    fn set_stderr(&mut self, stderr: Stdio) {
        if let Some(command) = self.command_mut() {
            command.stderr(stderr);
            self.redirects.stderr = true;
        }
    }

    fn process_id(&self) -> Option<ProcessId> {
        self.pid
    }

    fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }
}
