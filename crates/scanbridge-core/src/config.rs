//! Application configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Run the WS-Discovery backend.
    #[serde(default = "default_true")]
    pub wsd: bool,

    /// Run the DNS-SD backend.
    #[serde(default = "default_true")]
    pub dnssd: bool,

    /// How long a discovery run waits for answers, milliseconds.
    #[serde(default = "default_discover_wait_ms")]
    pub wait_ms: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            wsd: true,
            dnssd: true,
            wait_ms: default_discover_wait_ms(),
        }
    }
}

/// eSCL server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EsclConfig {
    /// Bind address for the scan server.
    #[serde(default = "default_escl_bind")]
    pub bind_addr: String,

    /// Base path the endpoints live under.
    #[serde(default = "default_escl_base_path")]
    pub base_path: String,

    /// Server certificate path (PEM). TLS is offered on the same port
    /// when both the certificate and the key are configured.
    #[serde(default)]
    pub tls_cert: Option<String>,

    /// Server private key path (PEM).
    #[serde(default)]
    pub tls_key: Option<String>,
}

impl Default for EsclConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_escl_bind(),
            base_path: default_escl_base_path(),
            tls_cert: None,
            tls_key: None,
        }
    }
}

/// The application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    #[serde(default)]
    pub escl: EsclConfig,
}

impl AppConfig {
    /// Loads the configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|err| CoreError::read(path.display().to_string(), err))?;

        let config: AppConfig =
            serde_yaml::from_str(&content).map_err(|err| CoreError::ConfigParse(err.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.escl.bind_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(CoreError::value(
                "escl.bind_addr",
                format!("not a socket address: {:?}", self.escl.bind_addr),
            ));
        }

        if !self.escl.base_path.starts_with('/') {
            return Err(CoreError::value(
                "escl.base_path",
                "must start with '/'",
            ));
        }

        if self.escl.tls_cert.is_some() != self.escl.tls_key.is_some() {
            return Err(CoreError::value(
                "escl.tls_cert",
                "certificate and key must be configured together",
            ));
        }

        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_discover_wait_ms() -> u64 {
    2500
}

fn default_escl_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_escl_base_path() -> String {
    "/eSCL".to_string()
}
