use anyhow::{anyhow, Result};
use handlebars::{no_escape, Handlebars};
use serde::{Deserialize, Serialize};

use crate::Assets;

const TEMPLATE: &str = "kubeadm-init.sh.tpl";

/// `kubeadm init` configuration for the control plane node
///
/// https://kubernetes.io/docs/reference/setup-tools/kubeadm/kubeadm-init/
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct KubeadmInit {
  /// Private DNS name of the master node, used as its node name
  pub master_node_private_dns: String,
}

impl KubeadmInit {
  /// Render the setup script run on the master node
  ///
  /// The script has to run as root, otherwise kubeadm fails with `[ERROR IsPrivilegedUser]`.
  pub fn script(&self) -> Result<String> {
    let file = Assets::get(TEMPLATE).ok_or_else(|| anyhow!("{TEMPLATE} is not embedded"))?;
    let template = std::str::from_utf8(file.data.as_ref())?;

    let mut handlebars = Handlebars::new();
    handlebars.register_escape_fn(no_escape);
    handlebars.set_strict_mode(true);
    handlebars.register_template_string("tpl", template)?;

    let data = ScriptInit {
      master_node_private_dns: &self.master_node_private_dns,
    };
    Ok(handlebars.render("tpl", &data)?)
  }
}

#[derive(Serialize)]
struct ScriptInit<'a> {
  master_node_private_dns: &'a str,
}
