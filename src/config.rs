use anyhow::bail;
use serde::Deserialize;

use crate::dns::DomainFilter;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL of the UniFi controller, e.g. https://192.168.1.1
    pub unifi_host: String,

    /// Local API key (X-Api-Key header). Preferred auth mode.
    #[serde(default)]
    pub unifi_api_key: Option<String>,

    /// Username/password session auth (deprecated, kept for older setups).
    #[serde(default)]
    pub unifi_user: Option<String>,
    #[serde(default)]
    pub unifi_pass: Option<String>,

    /// Site identifier on the controller.
    #[serde(default = "default_site")]
    pub unifi_site: String,

    /// Accept self-signed controller certificates.
    #[serde(default = "default_skip_tls_verify")]
    pub unifi_skip_tls_verify: bool,

    /// True when the controller is reached directly instead of through an
    /// onboard gateway proxy; selects the second URL-path family.
    #[serde(default)]
    pub unifi_external_controller: bool,

    /// Webhook listen address.
    #[serde(default = "default_server_host")]
    pub server_host: String,
    #[serde(default = "default_server_port")]
    pub server_port: u16,

    /// Comma-separated domain suffixes to manage; empty = manage all.
    #[serde(default)]
    pub domain_filter: String,
    #[serde(default)]
    pub exclude_domain_filter: String,
}

impl Config {
    /// Parse from environment variables (UNIFI_HOST, UNIFI_API_KEY, …)
    /// and validate that exactly one usable auth mode is configured.
    pub fn from_env() -> anyhow::Result<Self> {
        let cfg = envy::from_env::<Config>()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.unifi_host.is_empty() {
            bail!("UNIFI_HOST must not be empty");
        }
        if self.api_key().is_none() && (self.unifi_user.is_none() || self.unifi_pass.is_none()) {
            bail!("either UNIFI_API_KEY or both UNIFI_USER and UNIFI_PASS must be set");
        }
        Ok(())
    }

    /// The API key, treating an empty string as unset.
    pub fn api_key(&self) -> Option<&str> {
        self.unifi_api_key.as_deref().filter(|k| !k.is_empty())
    }

    pub fn domain_filter(&self) -> DomainFilter {
        DomainFilter::new(
            split_list(&self.domain_filter),
            split_list(&self.exclude_domain_filter),
        )
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn default_site() -> String {
    "default".into()
}

fn default_skip_tls_verify() -> bool {
    true
}

fn default_server_host() -> String {
    "localhost".into()
}

fn default_server_port() -> u16 {
    8888
}
