//! Service configuration.
//!
//! Defaults, optionally overlaid by a JSON file named in `DASHBOARD_CONFIG`,
//! then by individual `DASHBOARD_*` environment variables.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cache::DEFAULT_TTL_MS;
use crate::discovery::DEFAULT_MAX_DEPTH;
use crate::provider::ProviderSettings;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// JSON file holding the persisted dashboard.
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
    #[serde(default)]
    pub provider: ProviderSettings,
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Nesting depth explored when discovering fields of generic responses.
    #[serde(default = "default_discovery_max_depth")]
    pub discovery_max_depth: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_state_path() -> PathBuf {
    PathBuf::from("dashboard_state.json")
}

fn default_cache_ttl_ms() -> u64 {
    DEFAULT_TTL_MS
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_discovery_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            state_path: default_state_path(),
            provider: ProviderSettings::default(),
            cache_ttl_ms: default_cache_ttl_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            discovery_max_depth: default_discovery_max_depth(),
        }
    }
}

impl DashboardConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` in place of the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = match lookup("DASHBOARD_CONFIG") {
            Some(path) => Self::load_file(Path::new(&path))?,
            None => Self::default(),
        };

        if let Some(bind) = lookup("DASHBOARD_BIND") {
            config.bind_addr = bind;
        }
        if let Some(path) = lookup("DASHBOARD_STATE_PATH") {
            config.state_path = PathBuf::from(path);
        }
        if let Some(host) = lookup("DASHBOARD_PROVIDER_HOST") {
            config.provider.host = host;
        }
        if let Some(symbol) = lookup("DASHBOARD_DEFAULT_SYMBOL") {
            config.provider.default_symbol = symbol;
        }
        override_parsed(&lookup, "DASHBOARD_CACHE_TTL_MS", &mut config.cache_ttl_ms)?;
        override_parsed(&lookup, "DASHBOARD_REQUEST_TIMEOUT_SECS", &mut config.request_timeout_secs)?;
        override_parsed(&lookup, "DASHBOARD_DISCOVERY_DEPTH", &mut config.discovery_max_depth)?;

        Ok(config)
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {:?}", path))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config: {:?}", path))?;
        info!("Loaded config from {:?}", path);
        Ok(config)
    }
}

fn override_parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if let Some(raw) = lookup(key) {
        *slot = raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw))?;
    }
    Ok(())
}
