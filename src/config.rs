use std::path::PathBuf;

use rocket::figment::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PortalConfig {
    pub data_dir: PathBuf,
    pub session_ttl_minutes: i64,
    pub remote_url: Option<String>,
    pub remote_key: Option<String>,
    pub remote_table: String,
    pub remote_timeout_secs: u64,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            session_ttl_minutes: 8 * 60,
            remote_url: None,
            remote_key: None,
            remote_table: "requests".to_string(),
            remote_timeout_secs: 30,
        }
    }
}

impl PortalConfig {
    /// Rocket's own configuration sources, topped with `PORTAL_*` variables.
    pub fn figment() -> Figment {
        rocket::Config::figment()
            .join(Serialized::defaults(PortalConfig::default()))
            .merge(Env::prefixed("PORTAL_").global())
    }

    pub fn from_figment(figment: &Figment) -> Result<Self, rocket::figment::Error> {
        figment.extract()
    }

    /// Both URL and key must be present for the remote mirror to be used.
    pub fn remote_credentials(&self) -> Option<(&str, &str)> {
        match (self.remote_url.as_deref(), self.remote_key.as_deref()) {
            (Some(url), Some(key)) if !url.is_empty() && !key.is_empty() => Some((url, key)),
            _ => None,
        }
    }
}
