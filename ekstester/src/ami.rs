use anyhow::{bail, Result};
use aws_config::SdkConfig;
use aws_sdk_ssm::{
  config::{self, retry::RetryConfig},
  types::Parameter,
  Client,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Get the SSM client
pub fn get_client(config: &SdkConfig) -> Client {
  Client::from_conf(
    // Start with the shared environment configuration
    config::Builder::from(config)
      // Set max attempts
      .retry_config(RetryConfig::standard().with_max_attempts(3))
      .build(),
  )
}

/// AMI details published under an SSM parameter
///
/// https://docs.aws.amazon.com/eks/latest/userguide/retrieve-ami-id.html
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ami {
  #[serde(default)]
  pub arn: String,

  #[serde(default)]
  pub name: String,

  #[serde(default)]
  pub version: i64,

  #[serde(rename = "last-modified-date", default, skip_serializing_if = "Option::is_none")]
  pub last_modified_date: Option<DateTime<Utc>>,

  /// Present when the parameter value is a document rather than a bare image ID
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub schema_version: String,

  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub image_id: String,

  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub image_name: String,
}

/// Map the `GetParameters` response for a single key onto an `Ami`
///
/// The value is either a bare `ami-` image ID or a document carrying `schema_version`.
pub fn parse_parameters(parameters: &[Parameter]) -> Result<Ami> {
  let parameter = match parameters {
    [parameter] => parameter,
    _ => bail!("unexpected parameters received {parameters:?}"),
  };

  let value = parameter.value().unwrap_or_default();
  let mut ami = if value.starts_with("ami-") {
    Ami {
      image_id: value.to_owned(),
      ..Default::default()
    }
  } else if value.contains("schema_version") {
    serde_yaml::from_str::<Ami>(value)?
  } else {
    bail!("cannot parse {value}");
  };

  ami.arn = parameter.arn().unwrap_or_default().to_owned();
  ami.name = parameter.name().unwrap_or_default().to_owned();
  ami.version = parameter.version();
  ami.last_modified_date = parameter
    .last_modified_date()
    .and_then(|date| DateTime::from_timestamp(date.secs(), date.subsec_nanos()));

  Ok(ami)
}

/// Get the AMI published under the SSM parameter `key`
pub async fn fetch_ami(client: &Client, key: &str) -> Result<Ami> {
  let output = client.get_parameters().names(key).send().await?;
  debug!("SSM parameters for {key}: {:?}", output.parameters());

  parse_parameters(output.parameters())
}
