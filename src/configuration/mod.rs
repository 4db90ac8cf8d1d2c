use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

mod error;

pub use error::Error;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub observability: Option<ObservabilityConfig>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "ServerConfig::default_listen")]
    pub listen: String,
    #[serde(default = "ServerConfig::default_query_timeout")]
    pub query_timeout: u64,
    #[serde(default = "ServerConfig::default_query_timeout_grace_period")]
    pub query_timeout_grace_period: u64,
    #[serde(default = "ServerConfig::default_shutdown_grace_period")]
    pub shutdown_grace_period: u64,
}

impl ServerConfig {
    fn default_listen() -> String {
        String::from("localhost:8080")
    }

    fn default_query_timeout() -> u64 {
        3600
    }

    fn default_query_timeout_grace_period() -> u64 {
        60
    }

    fn default_shutdown_grace_period() -> u64 {
        5
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: Self::default_listen(),
            query_timeout: Self::default_query_timeout(),
            query_timeout_grace_period: Self::default_query_timeout_grace_period(),
            shutdown_grace_period: Self::default_shutdown_grace_period(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "DiscoveryConfig::default_refresh_interval")]
    pub refresh_interval: u64,
    #[serde(default = "DiscoveryConfig::default_jwks_path")]
    pub jwks_path: String,
    #[serde(default = "DiscoveryConfig::default_max_document_size")]
    pub max_document_size: usize,
}

impl DiscoveryConfig {
    fn default_refresh_interval() -> u64 {
        300
    }

    fn default_jwks_path() -> String {
        String::from("/jwks")
    }

    fn default_max_document_size() -> usize {
        1024 * 1024
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval)
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Self::default_refresh_interval(),
            jwks_path: Self::default_jwks_path(),
            max_document_size: Self::default_max_document_size(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default)]
    pub kubeconfig: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub tracing: Option<TracingConfig>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TracingConfig {
    pub endpoint: String,
    pub sampling_rate: f64,
}

impl Configuration {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let config_str = fs::read_to_string(path)?;
        Self::load_from_str(&config_str)
    }

    pub fn load_from_str(slice: &str) -> Result<Self, Error> {
        let config: Configuration = toml::from_str(slice)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.server.listen.trim().is_empty() {
            return Err(Error::InvalidValue(
                "server.listen must not be empty".to_string(),
            ));
        }

        if self.discovery.refresh_interval == 0 {
            return Err(Error::InvalidValue(
                "discovery.refresh_interval must be greater than zero".to_string(),
            ));
        }

        if !self.discovery.jwks_path.starts_with('/') || self.discovery.jwks_path.len() < 2 {
            return Err(Error::InvalidValue(format!(
                "discovery.jwks_path must be an absolute path, got '{}'",
                self.discovery.jwks_path
            )));
        }

        if self.discovery.max_document_size == 0 {
            return Err(Error::InvalidValue(
                "discovery.max_document_size must be greater than zero".to_string(),
            ));
        }

        if let Some(ObservabilityConfig {
            tracing: Some(tracing),
        }) = &self.observability
        {
            if !(0.0..=1.0).contains(&tracing.sampling_rate) {
                return Err(Error::InvalidValue(
                    "observability.tracing.sampling_rate must be between 0 and 1".to_string(),
                ));
            }
        }

        Ok(())
    }
}
