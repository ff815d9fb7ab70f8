use clap::{Parser, Subcommand};
use clap_verbosity_flag::Verbosity;

use crate::commands;

/// Styles for CLI
fn get_styles() -> clap::builder::Styles {
  clap::builder::Styles::styled()
    .header(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))),
    )
    .literal(
      anstyle::Style::new()
        .bold()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::BrightCyan))),
    )
    .usage(
      anstyle::Style::new()
        .bold()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))),
    )
    .placeholder(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow))),
    )
}

#[derive(Debug, Parser)]
#[command(author, about, version)]
#[command(propagate_version = true)]
#[command(styles=get_styles())]
pub struct Cli {
  #[command(subcommand)]
  pub command: Commands,

  #[clap(flatten)]
  pub verbose: Verbosity,

  /// Disable colored log output
  #[arg(long, global = true)]
  pub no_color: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
  /// Create, check, test, and tear down an EKS cluster with `awstester`
  Eks(commands::eks::Eks),

  /// Look up the AMI published under an SSM parameter
  ///
  /// For example `/aws/service/eks/optimized-ami/1.11/amazon-linux-2/recommended`
  Ami(commands::ami::AmiInput),

  /// Render the `kubeadm init` script for the master node
  KubeadmInit(commands::kubeadm::KubeadmInitInput),
}

#[cfg(test)]
mod tests {
  use clap::CommandFactory;

  use super::*;
  use crate::commands::eks::EksCommand;

  #[test]
  fn it_verifies_cli() {
    Cli::command().debug_assert();
  }

  #[test]
  fn it_parses_eks_defaults() {
    let cli = Cli::try_parse_from(["ekstester", "eks", "--path", "/tmp/c.yaml", "up"]).unwrap();
    match cli.command {
      Commands::Eks(eks) => {
        assert_eq!(eks.timeout, 3 * 60 * 60);
        assert!(!eks.interrupt_on_timeout);
        assert!(matches!(eks.command, EksCommand::Up));
      }
      other => panic!("unexpected command {other:?}"),
    }
  }

  #[test]
  fn it_requires_alb_test_name() {
    assert!(Cli::try_parse_from(["ekstester", "eks", "--path", "/tmp/c.yaml", "test-alb"]).is_err());
    assert!(Cli::try_parse_from(["ekstester", "eks", "--path", "/tmp/c.yaml", "test-alb", "qps"]).is_ok());
  }
}
