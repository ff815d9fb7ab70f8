pub mod ami;
pub mod cli;
pub mod commands;
pub mod config;
pub mod control;
pub mod deployer;
pub mod error;
pub mod kubeadm;
pub mod runner;

use std::env;

use anyhow::Result;
use aws_config::{meta::region::RegionProviderChain, BehaviorVersion, SdkConfig};
use aws_types::region::Region;
pub use cli::{Cli, Commands};
pub use error::Error;
use rust_embed::RustEmbed;

/// Embeds the contents of the `files/` directory into the binary
///
/// This struct contains the static templates used within `ekstester`
#[derive(RustEmbed)]
#[folder = "files/"]
pub struct Assets;

/// Get the configuration to authn/authz with AWS that will be used across AWS clients
pub async fn get_sdk_config(region: Option<String>) -> Result<SdkConfig> {
  let aws_region = match region {
    Some(region) => Some(Region::new(region)),
    None => env::var("AWS_DEFAULT_REGION").ok().map(Region::new),
  };

  let region_provider = RegionProviderChain::first_try(aws_region).or_default_provider();

  Ok(
    aws_config::defaults(BehaviorVersion::latest())
      .region(region_provider)
      .load()
      .await,
  )
}
