use std::{fs, os::unix::fs::PermissionsExt, path::PathBuf};

use anyhow::Result;
use clap::Args;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::kubeadm::KubeadmInit;

#[derive(Args, Debug, Serialize, Deserialize)]
pub struct KubeadmInitInput {
  /// Private DNS name of the master node
  #[arg(long)]
  pub master_node_private_dns: String,

  /// Write the script to this file instead of stdout
  #[arg(short, long)]
  pub output: Option<PathBuf>,
}

impl KubeadmInitInput {
  pub fn render(&self) -> Result<()> {
    let init = KubeadmInit {
      master_node_private_dns: self.master_node_private_dns.to_owned(),
    };
    let script = init.script()?;

    match &self.output {
      Some(path) => {
        fs::write(path, script)?;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
        info!("Wrote {}", path.display());
      }
      None => print!("{script}"),
    }

    Ok(())
  }
}
