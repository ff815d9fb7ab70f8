use std::{io, path::PathBuf, process::ExitStatus};

use nix::errno::Errno;
use thiserror::Error;
use tokio::time::Duration;

/// Failures surfaced by the command runner and the cluster tester
#[derive(Debug, Error)]
pub enum Error {
  #[error("cannot find '{name}' executable ({source})")]
  ExecutableNotFound {
    name: String,
    #[source]
    source: which::Error,
  },

  #[error("'{command}' command failed to launch: {source}")]
  LaunchFailed {
    command: String,
    #[source]
    source: io::Error,
  },

  #[error("'{command}' command timed out after {timeout:?}")]
  TimedOut {
    command: String,
    timeout: Duration,
    output: String,
  },

  /// Raised for an intentional stop so callers can tell it apart from a failure
  ///
  /// `interrupt` is the result of delivering SIGINT, `None` if the command was never started.
  #[error("'{command}' command interrupted ({})", interrupt_detail(.interrupt))]
  Interrupted {
    command: String,
    interrupt: Option<Result<(), Errno>>,
  },

  #[error("'{command}' command failed ({status})")]
  NonZeroExit {
    command: String,
    status: ExitStatus,
    output: String,
  },

  #[error("cluster {cluster:?} status is {status:?}")]
  StateMismatch { cluster: String, status: String },

  #[error("failed to load cluster config {}: {source:#}", .path.display())]
  ReloadFailed {
    path: PathBuf,
    #[source]
    source: anyhow::Error,
  },
}

fn interrupt_detail(interrupt: &Option<Result<(), Errno>>) -> String {
  match interrupt {
    Some(Ok(())) => "interrupt error <nil>".to_owned(),
    Some(Err(errno)) => format!("interrupt error {errno}"),
    None => "not started".to_owned(),
  }
}

impl Error {
  /// Combined output captured before the failure, when there is any
  pub fn output(&self) -> Option<&str> {
    match self {
      Error::TimedOut { output, .. } | Error::NonZeroExit { output, .. } => Some(output),
      _ => None,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
