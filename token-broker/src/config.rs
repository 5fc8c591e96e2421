//! Broker configuration.
//!
//! Loaded from the process environment (optionally seeded from a `.env`
//! file). Empty variables are treated as unset.

use std::str::FromStr;
use std::time::Duration;

use douyin_openapi::UpstreamConfig;
use douyin_openapi::config::DEFAULT_BASE_URL;
use serde::{Deserialize, Serialize};

use crate::error::BrokerError;

pub const ENV_APP_ID: &str = "DOUYIN_APP_ID";
pub const ENV_APP_SECRET: &str = "DOUYIN_APP_SECRET";
pub const ENV_API_BASE_URL: &str = "DOUYIN_API_BASE_URL";
pub const ENV_HTTP_TIMEOUT_SECS: &str = "DOUYIN_HTTP_TIMEOUT_SECS";
pub const ENV_SESSION_TTL_SECS: &str = "BROKER_SESSION_TTL_SECS";
pub const ENV_FALLBACK_ENABLED: &str = "BROKER_FALLBACK_ENABLED";
pub const ENV_CACHE_SWEEP_SECS: &str = "BROKER_CACHE_SWEEP_SECS";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub app_id: Option<String>,
    #[serde(skip_serializing)]
    pub app_secret: Option<String>,
    pub api_base_url: String,
    pub http_timeout_secs: u64,
    /// Lifetime of a session record.
    pub session_ttl_secs: u64,
    /// Substitute synthetic data on transport/configuration failures.
    pub fallback_enabled: bool,
    /// Interval of the background expiry sweep. `0` disables it.
    pub cache_sweep_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            app_id: None,
            app_secret: None,
            api_base_url: DEFAULT_BASE_URL.to_string(),
            http_timeout_secs: 30,
            session_ttl_secs: 7200,
            fallback_enabled: true,
            cache_sweep_secs: 600,
        }
    }
}

impl BrokerConfig {
    /// Read the configuration from the environment, loading `.env` first if present.
    pub fn from_env() -> Result<Self, BrokerError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, BrokerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        Ok(Self {
            app_id: var(ENV_APP_ID),
            app_secret: var(ENV_APP_SECRET),
            api_base_url: var(ENV_API_BASE_URL).unwrap_or(defaults.api_base_url),
            http_timeout_secs: parse_var(ENV_HTTP_TIMEOUT_SECS, var(ENV_HTTP_TIMEOUT_SECS))?
                .unwrap_or(defaults.http_timeout_secs),
            session_ttl_secs: parse_var(ENV_SESSION_TTL_SECS, var(ENV_SESSION_TTL_SECS))?
                .unwrap_or(defaults.session_ttl_secs),
            fallback_enabled: parse_flag(ENV_FALLBACK_ENABLED, var(ENV_FALLBACK_ENABLED))?
                .unwrap_or(defaults.fallback_enabled),
            cache_sweep_secs: parse_var(ENV_CACHE_SWEEP_SECS, var(ENV_CACHE_SWEEP_SECS))?
                .unwrap_or(defaults.cache_sweep_secs),
        })
    }

    pub fn with_credentials(
        mut self,
        app_id: impl Into<String>,
        app_secret: impl Into<String>,
    ) -> Self {
        self.app_id = Some(app_id.into());
        self.app_secret = Some(app_secret.into());
        self
    }

    pub fn has_credentials(&self) -> bool {
        self.upstream().has_credentials()
    }

    /// Settings for the upstream client.
    pub fn upstream(&self) -> UpstreamConfig {
        let mut upstream = UpstreamConfig::new(self.api_base_url.clone())
            .with_timeout(Duration::from_secs(self.http_timeout_secs));
        upstream.app_id = self.app_id.clone();
        upstream.app_secret = self.app_secret.clone();
        upstream
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn cache_sweep_interval(&self) -> Option<Duration> {
        (self.cache_sweep_secs > 0).then(|| Duration::from_secs(self.cache_sweep_secs))
    }
}

fn parse_var<T: FromStr>(key: &str, raw: Option<String>) -> Result<Option<T>, BrokerError> {
    raw.map(|value| {
        value
            .parse()
            .map_err(|_| BrokerError::Configuration(format!("{key} must be a number, got {value:?}")))
    })
    .transpose()
}

fn parse_flag(key: &str, raw: Option<String>) -> Result<Option<bool>, BrokerError> {
    raw.map(|value| match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(BrokerError::Configuration(format!(
            "{key} must be a boolean, got {value:?}"
        ))),
    })
    .transpose()
}
