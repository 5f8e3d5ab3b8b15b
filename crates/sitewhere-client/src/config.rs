//! Client configuration.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/sitewhere/config.toml` by default:
//!
//! ```toml
//! debug = false
//!
//! [connection]
//! broker_hostname = "mqtt.example.com"
//! broker_port = 1883
//!
//! [device]
//! specification_token = "7dfd6d63-5e8d-4380-be04-fc5c73801dfb"
//! site_token = "bb105f8d-3150-41f5-b9d1-db04965668d3"
//!
//! [reporting]
//! location_interval_secs = 60
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sitewhere_core::IdentityProvider;

use crate::error::{ClientError, ClientResult};

/// Parameters handed to a backend when binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub broker_hostname: String,
    pub broker_port: u16,
    pub device_hardware_id: String,
    pub connect_timeout: Duration,
}

impl ConnectionConfig {
    pub fn new(
        broker_hostname: impl Into<String>,
        broker_port: u16,
        device_hardware_id: impl Into<String>,
    ) -> Self {
        Self {
            broker_hostname: broker_hostname.into(),
            broker_port,
            device_hardware_id: device_hardware_id.into(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }

    /// Builder: set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// `host:port` of the delivery service.
    pub fn address(&self) -> String {
        format!("{}:{}", self.broker_hostname, self.broker_port)
    }
}

const DEFAULT_BROKER_PORT: u16 = 1883;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Configuration for the SiteWhere client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Debug mode.
    pub debug: bool,

    /// Broker connection settings.
    pub connection: ConnectionSettings,

    /// Device registration settings.
    pub device: DeviceSettings,

    /// Periodic reporting settings.
    pub reporting: ReportingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    pub broker_hostname: String,
    pub broker_port: u16,
    /// Connection timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            broker_hostname: "localhost".to_string(),
            broker_port: DEFAULT_BROKER_PORT,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// Device specification the platform registers this device under.
    pub specification_token: String,

    /// Site to register the device in.
    pub site_token: Option<String>,

    /// Overrides the identity provider's hardware id.
    pub hardware_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingSettings {
    /// Interval between location reports, in seconds.
    pub location_interval_secs: u64,
}

impl Default for ReportingSettings {
    fn default() -> Self {
        Self {
            location_interval_secs: 60,
        }
    }
}

impl ReportingSettings {
    pub fn location_interval(&self) -> Duration {
        Duration::from_secs(self.location_interval_secs.max(1))
    }
}

impl ClientConfig {
    /// Loads configuration from the default path, or defaults if missing.
    pub fn load() -> ClientResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content).map_err(|e| {
            ClientError::config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sitewhere")
    }

    /// Hardware id from the override, or from `identity` when none is set.
    pub fn hardware_id(&self, identity: &dyn IdentityProvider) -> ClientResult<String> {
        match self.device.hardware_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => Ok(id.to_string()),
            _ => Ok(identity.unique_device_id()?),
        }
    }

    /// Builds the backend connection parameters.
    pub fn connection_config(
        &self,
        identity: &dyn IdentityProvider,
    ) -> ClientResult<ConnectionConfig> {
        Ok(ConnectionConfig::new(
            self.connection.broker_hostname.clone(),
            self.connection.broker_port,
            self.hardware_id(identity)?,
        )
        .with_connect_timeout(Duration::from_secs(
            self.connection.connect_timeout_secs,
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use sitewhere_core::{IdentityError, StaticIdentity};

    use super::*;

    struct NoIdentity;

    impl IdentityProvider for NoIdentity {
        fn unique_device_id(&self) -> Result<String, IdentityError> {
            Err(IdentityError::Unavailable {
                reason: "no machine id".into(),
            })
        }
    }

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert!(!config.debug);
        assert_eq!(config.connection.broker_hostname, "localhost");
        assert_eq!(config.connection.broker_port, 1883);
        assert_eq!(config.reporting.location_interval(), Duration::from_secs(60));
        assert!(config.device.site_token.is_none());
    }

    #[test]
    fn load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
debug = true

[connection]
broker_hostname = "broker.local"

[device]
specification_token = "spec-1"
hardware_id = "override-id"
"#
        )
        .unwrap();

        let config = ClientConfig::load_from(file.path()).unwrap();
        assert!(config.debug);
        assert_eq!(config.connection.broker_hostname, "broker.local");
        assert_eq!(config.connection.broker_port, 1883);
        assert_eq!(config.device.specification_token, "spec-1");
        assert_eq!(config.reporting.location_interval_secs, 60);

        let connection = config.connection_config(&NoIdentity).unwrap();
        assert_eq!(connection.device_hardware_id, "override-id");
        assert_eq!(connection.address(), "broker.local:1883");
        assert_eq!(connection.connect_timeout, Duration::from_secs(5));
    }

    #[test]
    fn invalid_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[connection]\nbroker_port = \"not a number\"").unwrap();

        let err = ClientConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ClientError::Config { .. }));
    }

    #[test]
    fn missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ClientConfig::load_from(&dir.path().join("absent.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }

    #[test]
    fn identity_used_without_override() {
        let config = ClientConfig::default();
        let connection = config
            .connection_config(&StaticIdentity::new("machine-1"))
            .unwrap();
        assert_eq!(connection.device_hardware_id, "machine-1");

        let err = config.connection_config(&NoIdentity).unwrap_err();
        assert!(matches!(err, ClientError::Identity(_)));
    }

    #[test]
    fn default_path_under_sitewhere() {
        let path = ClientConfig::default_path();
        assert!(path.ends_with("sitewhere/config.toml"));
    }
}
