use std::sync::Arc;

use tokio::{
  sync::watch,
  time::{Duration, Instant},
};
use tracing::{debug, info};

/// Default total timeout applied to every command issued through a `Control`
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3 * 60 * 60);

/// One-shot stop latch shared by the tester and every in-flight command
///
/// Clones observe the same latch. Once set it stays set.
#[derive(Clone, Debug)]
pub struct StopSignal {
  tx: Arc<watch::Sender<bool>>,
}

impl Default for StopSignal {
  fn default() -> Self {
    Self::new()
  }
}

impl StopSignal {
  pub fn new() -> Self {
    let (tx, _) = watch::channel(false);
    Self { tx: Arc::new(tx) }
  }

  /// Raise the signal; repeated calls are no-ops
  pub fn request_stop(&self) {
    let changed = self.tx.send_if_modified(|stopped| {
      if *stopped {
        return false;
      }
      *stopped = true;
      true
    });

    match changed {
      true => info!("Stop requested"),
      false => debug!("Stop already requested"),
    }
  }

  pub fn is_stopped(&self) -> bool {
    *self.tx.borrow()
  }

  /// Resolves once the signal is raised, immediately if it already was
  pub async fn stopped(&self) {
    let mut rx = self.tx.subscribe();
    // The sender lives in `self`, so the channel cannot close while we wait
    let _ = rx.wait_for(|stopped| *stopped).await;
  }
}

/// Deadline and stop signal owned by a single tester for its whole lifetime
#[derive(Clone, Debug)]
pub struct Control {
  timeout: Duration,
  deadline: Instant,
  stop: StopSignal,
  interrupt_on_timeout: bool,
}

impl Control {
  /// Arm the deadline `timeout` from now with a fresh stop signal
  pub fn new(timeout: Duration) -> Self {
    Self {
      timeout,
      deadline: Instant::now() + timeout,
      stop: StopSignal::new(),
      interrupt_on_timeout: false,
    }
  }

  /// Also send an interrupt to commands still running when the deadline passes
  ///
  /// Off by default: a timed out command is otherwise left running.
  pub fn interrupt_on_timeout(mut self, enabled: bool) -> Self {
    self.interrupt_on_timeout = enabled;
    self
  }

  pub fn timeout(&self) -> Duration {
    self.timeout
  }

  pub fn deadline(&self) -> Instant {
    self.deadline
  }

  pub fn stop_signal(&self) -> &StopSignal {
    &self.stop
  }

  pub fn interrupts_on_timeout(&self) -> bool {
    self.interrupt_on_timeout
  }

  pub fn is_expired(&self) -> bool {
    Instant::now() >= self.deadline
  }
}

impl Default for Control {
  fn default() -> Self {
    Self::new(DEFAULT_TIMEOUT)
  }
}
