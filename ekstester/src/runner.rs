use std::{
  fmt, io,
  os::fd::OwnedFd,
  path::{Path, PathBuf},
  process::{ExitStatus, Stdio},
};

use nix::{
  errno::Errno,
  fcntl::OFlag,
  sys::signal::{kill, Signal},
  unistd::{self, Pid},
};
use tokio::{
  fs::File,
  io::AsyncReadExt,
  process::{Child, Command},
  sync::mpsc,
  task::JoinHandle,
  time::sleep_until,
};
use tracing::{debug, error, info, warn};

use crate::{control::Control, error::Error};

/// A single external command: program path plus ordered arguments
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
  program: PathBuf,
  args: Vec<String>,
  name: String,
}

impl Invocation {
  pub fn new<P, I, S>(program: P, args: I) -> Self
  where
    P: Into<PathBuf>,
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let args: Vec<String> = args.into_iter().map(Into::into).collect();
    let name = args.join(" ");
    Self {
      program: program.into(),
      args,
      name,
    }
  }

  /// Short name used in logs and error messages, e.g. `create cluster`
  pub fn named(mut self, name: impl Into<String>) -> Self {
    self.name = name.into();
    self
  }

  pub fn program(&self) -> &Path {
    &self.program
  }

  pub fn args(&self) -> &[String] {
    &self.args
  }

  pub fn name(&self) -> &str {
    &self.name
  }
}

impl fmt::Display for Invocation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.program.display())?;
    for arg in &self.args {
      write!(f, " {arg}")?;
    }
    Ok(())
  }
}

/// How an invocation ended; exactly one per run
#[derive(Debug)]
pub enum Outcome {
  /// The process exited on its own before the deadline or a stop request
  Completed(ExitStatus),
  /// The deadline passed first
  TimedOut,
  /// A stop was requested first; holds the result of delivering SIGINT,
  /// or `None` when the stop came before the process was started
  Interrupted(Option<Result<(), Errno>>),
  /// The process could not be started or supervised
  LaunchFailed(io::Error),
}

/// Combined stdout/stderr of one invocation and its outcome
#[derive(Debug)]
pub struct RunResult {
  pub command: String,
  pub output: Vec<u8>,
  pub outcome: Outcome,
  timeout: tokio::time::Duration,
}

impl RunResult {
  pub fn output_lossy(&self) -> String {
    String::from_utf8_lossy(&self.output).to_string()
  }

  pub fn success(&self) -> bool {
    matches!(self.outcome, Outcome::Completed(status) if status.success())
  }

  /// Map the outcome onto the error taxonomy, returning the output on success
  pub fn into_result(self) -> Result<String, Error> {
    let output = self.output_lossy();
    match self.outcome {
      Outcome::Completed(status) if status.success() => Ok(output),
      Outcome::Completed(status) => Err(Error::NonZeroExit {
        command: self.command,
        status,
        output,
      }),
      Outcome::TimedOut => Err(Error::TimedOut {
        command: self.command,
        timeout: self.timeout,
        output,
      }),
      Outcome::Interrupted(interrupt) => Err(Error::Interrupted {
        command: self.command,
        interrupt,
      }),
      Outcome::LaunchFailed(source) => Err(Error::LaunchFailed {
        command: self.command,
        source,
      }),
    }
  }
}

/// Pipe shared by stdout and stderr so the output keeps the order it was written in
///
/// Both ends are close-on-exec from creation so no concurrently spawned process
/// inherits the write end and holds the pipe open.
fn output_pipe() -> io::Result<(OwnedFd, OwnedFd)> {
  Ok(unistd::pipe2(OFlag::O_CLOEXEC)?)
}

/// Start the process with both output streams on `write`
///
/// The `Command` is dropped on return so the parent's copy of the write end
/// is closed and the reader sees EOF when the child exits.
fn spawn(invocation: &Invocation, write: OwnedFd) -> io::Result<Child> {
  let stderr = write.try_clone()?;
  Command::new(invocation.program())
    .args(invocation.args())
    .stdin(Stdio::null())
    .stdout(Stdio::from(write))
    .stderr(Stdio::from(stderr))
    .spawn()
}

/// Forward everything read from the pipe until EOF
///
/// Once the run has returned nobody is listening, but the read end stays open and
/// is drained until EOF. Closing it early would kill a child that is still writing
/// (SIGPIPE) after it was interrupted or left running past the deadline.
fn read_output(read: OwnedFd, tx: mpsc::UnboundedSender<Vec<u8>>) -> JoinHandle<io::Result<()>> {
  tokio::spawn(async move {
    let mut file = File::from_std(std::fs::File::from(read));
    let mut buf = vec![0u8; 8 * 1024];
    loop {
      let n = file.read(&mut buf).await?;
      if n == 0 {
        return Ok(());
      }
      if tx.send(buf[..n].to_vec()).is_err() {
        tokio::io::copy(&mut file, &mut tokio::io::sink()).await?;
        return Ok(());
      }
    }
  })
}

fn drain(rx: &mut mpsc::UnboundedReceiver<Vec<u8>>) -> Vec<u8> {
  let mut output = Vec::new();
  while let Ok(chunk) = rx.try_recv() {
    output.extend_from_slice(&chunk);
  }
  output
}

/// Send SIGINT to the child, if it has not been reaped yet
fn interrupt(child: &Child) -> Result<(), Errno> {
  match child.id() {
    Some(pid) => kill(Pid::from_raw(pid as i32), Signal::SIGINT),
    None => Err(Errno::ESRCH),
  }
}

/// Run `invocation` until it exits, the control's deadline passes, or a stop is requested
///
/// A stop request sends SIGINT and returns without waiting for the process to exit.
/// On timeout the process is left running unless the control interrupts on timeout.
pub async fn run(invocation: &Invocation, control: &Control) -> RunResult {
  let command = invocation.name().to_owned();
  let finish = |output: Vec<u8>, outcome: Outcome| {
    let result = RunResult {
      command: command.clone(),
      output,
      outcome,
      timeout: control.timeout(),
    };
    log_result(&result);
    result
  };

  let stop = control.stop_signal();
  if stop.is_stopped() {
    warn!("Stop already requested, not launching '{command}'");
    return finish(Vec::new(), Outcome::Interrupted(None));
  }
  if control.is_expired() {
    warn!("Deadline already passed, not launching '{command}'");
    return finish(Vec::new(), Outcome::TimedOut);
  }

  info!("Running {invocation}");
  let (read, write) = match output_pipe() {
    Ok(pipe) => pipe,
    Err(err) => return finish(Vec::new(), Outcome::LaunchFailed(err)),
  };
  let mut child = match spawn(invocation, write) {
    Ok(child) => child,
    Err(err) => return finish(Vec::new(), Outcome::LaunchFailed(err)),
  };

  let (tx, mut rx) = mpsc::unbounded_channel();
  let reader = read_output(read, tx);
  let collect = async {
    let status = child.wait().await?;
    match reader.await {
      Ok(read) => read.map(|_| status),
      Err(err) => Err(io::Error::new(io::ErrorKind::Other, err)),
    }
  };

  let outcome = tokio::select! {
    status = collect => match status {
      Ok(status) => Outcome::Completed(status),
      Err(err) => Outcome::LaunchFailed(err),
    },
    _ = sleep_until(control.deadline()) => {
      if control.interrupts_on_timeout() {
        if let Err(err) = interrupt(&child) {
          warn!("Failed to interrupt timed out '{command}': {err}");
        }
      } else if let Some(pid) = child.id() {
        warn!("'{command}' timed out and is still running (pid {pid})");
      }
      Outcome::TimedOut
    },
    _ = stop.stopped() => {
      warn!("Received stop signal, interrupting '{command}' command...");
      Outcome::Interrupted(Some(interrupt(&child)))
    },
  };

  finish(drain(&mut rx), outcome)
}

fn log_result(result: &RunResult) {
  match &result.outcome {
    Outcome::Completed(status) if status.success() => {
      debug!("'{}' succeeded:\n{}", result.command, result.output_lossy())
    }
    Outcome::Completed(status) => error!("'{}' failed ({status}):\n{}", result.command, result.output_lossy()),
    Outcome::TimedOut => error!("'{}' timed out:\n{}", result.command, result.output_lossy()),
    Outcome::Interrupted(_) => error!("'{}' interrupted:\n{}", result.command, result.output_lossy()),
    Outcome::LaunchFailed(err) => error!("'{}' failed to launch: {err}", result.command),
  }
}
