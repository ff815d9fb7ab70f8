use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};
use tokio::time::Duration;
use tracing::{info, warn};

use crate::{
  config::Config,
  control::Control,
  deployer::{AlbTest, Deployer, Publisher, Tester},
};

#[derive(Args, Debug)]
pub struct Eks {
  /// Path to the cluster configuration shared with `awstester`
  #[arg(long, env = "EKSTESTER_CONFIG")]
  pub path: PathBuf,

  /// Total time in seconds allowed for every `awstester` command issued by this run
  #[arg(long, default_value_t = 3 * 60 * 60)]
  pub timeout: u64,

  /// Interrupt a command that is still running when the timeout elapses
  ///
  /// By default a timed out command is left running
  #[arg(long)]
  pub interrupt_on_timeout: bool,

  /// Use this `awstester` executable instead of looking up the tools on PATH
  #[arg(long)]
  pub awstester_path: Option<PathBuf>,

  #[command(subcommand)]
  pub command: EksCommand,
}

#[derive(Debug, Subcommand)]
pub enum EksCommand {
  /// Create the cluster
  Up,

  /// Delete the cluster
  Down,

  /// Check the cluster is up and ACTIVE
  Check,

  /// Print when the cluster was created
  Created,

  /// Upload a local file or directory to S3
  DumpLogs {
    /// Local path to upload
    #[arg(long)]
    local: PathBuf,

    /// Destination S3 key
    #[arg(long)]
    remote: String,
  },

  /// Upload the test log output under `<cluster-name>/`
  Publish,

  /// Run an ALB ingress controller test against the cluster
  TestAlb {
    #[arg(value_enum)]
    test: AlbTest,
  },
}

impl Eks {
  fn tester(&self) -> Result<Tester> {
    let config = Config::load(&self.path)?;
    let control =
      Control::new(Duration::from_secs(self.timeout)).interrupt_on_timeout(self.interrupt_on_timeout);

    let tester = match &self.awstester_path {
      Some(path) => Tester::with_executable(config, control, path),
      None => Tester::new(config, control)?,
    };

    Ok(tester)
  }

  pub async fn run(&self) -> Result<()> {
    let mut tester = self.tester()?;

    // Ctrl-C interrupts the running command rather than killing this process
    let stop = tester.control().stop_signal().clone();
    tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        warn!("Received interrupt");
        stop.request_stop();
      }
    });

    match &self.command {
      EksCommand::Up => tester.up().await?,
      EksCommand::Down => tester.down().await?,
      EksCommand::Check => {
        tester.is_up().await?;
        info!("Cluster {} is ACTIVE", tester.config().cluster_name);
      }
      EksCommand::Created => match tester.get_cluster_created().await? {
        Some(created) => println!("{}", created.to_rfc3339()),
        None => println!("unknown"),
      },
      EksCommand::DumpLogs { local, remote } => tester.dump_cluster_logs(local, remote).await?,
      EksCommand::Publish => tester.publish().await?,
      EksCommand::TestAlb { test } => tester.test_alb(*test).await?,
    }

    Ok(())
  }
}
