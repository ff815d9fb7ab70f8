use anyhow::Result;
use clap::Args;
use serde::{Deserialize, Serialize};

use crate::ami;

#[derive(Args, Debug, Serialize, Deserialize)]
pub struct AmiInput {
  /// The SSM parameter the AMI is published under
  #[arg(short, long)]
  pub key: String,

  /// The AWS region to query; defaults to AWS_DEFAULT_REGION or the configured profile
  #[arg(short, long)]
  pub region: Option<String>,
}

impl AmiInput {
  pub async fn fetch(&self) -> Result<()> {
    let sdk_config = crate::get_sdk_config(self.region.to_owned()).await?;
    let client = ami::get_client(&sdk_config);
    let ami = ami::fetch_ami(&client, &self.key).await?;

    print!("{}", serde_yaml::to_string(&ami)?);

    Ok(())
  }
}
