use std::process;

use anyhow::Result;
use clap::Parser;
use ekstester::{Cli, Commands};
use tracing_log::AsTrace;
use tracing_subscriber::FmtSubscriber;

#[cfg(not(tarpaulin_include))]
#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();
  let subscriber = FmtSubscriber::builder()
    .with_max_level(cli.verbose.log_level_filter().as_trace())
    .without_time()
    .with_ansi(!cli.no_color)
    .with_writer(std::io::stderr)
    .finish();
  tracing::subscriber::set_global_default(subscriber).expect("Setting default subscriber failed");

  let result = match &cli.command {
    Commands::Eks(eks) => eks.run().await,
    Commands::Ami(ami) => ami.fetch().await,
    Commands::KubeadmInit(init) => init.render(),
  };

  match result {
    Ok(_) => Ok(()),
    Err(err) => {
      eprintln!("{err:#}");
      process::exit(2);
    }
  }
}
