use std::{
  fs::{File, OpenOptions},
  io::{BufReader, BufWriter},
  os::unix::fs::OpenOptionsExt,
  path::{Path, PathBuf},
};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status reported by `check cluster` once the control plane is ready
pub const STATUS_ACTIVE: &str = "ACTIVE";

/// Cluster configuration shared with `awstester`
///
/// `awstester` owns this file and rewrites it as the cluster changes, so it must be
/// reloaded before any of the observed state is consulted.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
  /// Path this configuration was loaded from and is passed to `awstester --path`
  #[serde(default)]
  pub config_path: PathBuf,

  /// Whether `awstester` runs in-process; always false when driven by this tool
  #[serde(default)]
  pub embedded: bool,

  /// Name of the EKS cluster
  pub cluster_name: String,

  /// Local file holding the test log output that is uploaded on publish
  #[serde(default)]
  pub log_output_to_upload_path: PathBuf,

  /// Observed state, written by `awstester`
  #[serde(default)]
  pub cluster_state: ClusterState,

  /// Preserve any additional values so a rewrite does not drop them
  #[serde(flatten, skip_serializing_if = "serde_yaml::Mapping::is_empty")]
  pub other: serde_yaml::Mapping,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClusterState {
  /// EKS cluster status (CREATING | ACTIVE | DELETING | FAILED | UPDATING)
  #[serde(default)]
  pub status: String,

  /// When the cluster was created
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub created: Option<DateTime<Utc>>,
}

impl Config {
  /// Load the configuration, recording `path` as its `config_path`
  pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
    let file = File::open(&path)?;
    let reader = BufReader::new(file);
    let mut config: Config = serde_yaml::from_reader(reader)?;
    config.config_path = path.as_ref().to_path_buf();

    Ok(config)
  }

  pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
    let file = OpenOptions::new()
      .write(true)
      .create(true)
      .truncate(true)
      .mode(0o644)
      .open(&path)?;
    let writer = BufWriter::new(file);

    serde_yaml::to_writer(writer, self).map_err(anyhow::Error::from)
  }

  pub fn is_active(&self) -> bool {
    self.cluster_state.status == STATUS_ACTIVE
  }
}
