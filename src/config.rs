//! Configuration management for the equipment inventory

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Which remote store implementation to run against
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RemoteBackend {
    Firebase,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    pub backend: RemoteBackend,
    /// Database root, e.g. `https://<project>-default-rtdb.<region>.firebasedatabase.app`
    pub url: String,
    /// Database secret or ID token appended as `?auth=`
    pub auth_token: Option<String>,
    pub reconnect_delay_ms: u64,
    pub read_timeout_ms: u64,
    /// An event stream silent for this long is treated as dropped.
    /// Firebase sends a keep-alive about every 30 seconds.
    #[serde(default = "default_stream_idle_timeout_ms")]
    pub stream_idle_timeout_ms: u64,
}

fn default_stream_idle_timeout_ms() -> u64 {
    70_000
}

/// Paths of the collections in the remote tree
#[derive(Debug, Deserialize, Clone)]
pub struct CollectionsConfig {
    pub equipment: String,
    pub types: String,
    pub statuses: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// Shared access key checked at login
    pub access_key: String,
    pub jwt_secret: String,
    /// Lifetime of a login session
    pub session_days: i64,
}

/// Id generators carry a 10-bit instance number
pub const MAX_INSTANCE_ID: u16 = 0x3ff;

#[derive(Debug, Deserialize, Clone)]
pub struct IdentityConfig {
    /// Host encoded in equipment QR URLs
    pub public_host: String,
    /// Distinguishes id generators of concurrently running instances
    pub instance_id: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub collections: CollectionsConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let config = Config::builder()
            // Start with default configuration
            .add_source(File::with_name("config/default").required(false))
            // Layer on the environment-specific file
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add environment variables (with prefix INVENTORY_)
            .add_source(
                Environment::with_prefix("INVENTORY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("remote.url", env::var("REMOTE_URL").ok())?
            .set_override_option("auth.access_key", env::var("ACCESS_KEY").ok())?
            .set_override_option("auth.jwt_secret", env::var("JWT_SECRET").ok())?
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.check()?;
        Ok(config)
    }

    /// Reject values that deserialize but cannot be used
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.identity.instance_id > MAX_INSTANCE_ID {
            return Err(ConfigError::Message(format!(
                "identity.instance_id must be at most {}, got {}",
                MAX_INSTANCE_ID, self.identity.instance_id
            )));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            backend: RemoteBackend::Memory,
            url: String::new(),
            auth_token: None,
            reconnect_delay_ms: 3000,
            read_timeout_ms: 10_000,
            stream_idle_timeout_ms: default_stream_idle_timeout_ms(),
        }
    }
}

impl Default for CollectionsConfig {
    fn default() -> Self {
        Self {
            equipment: "equipment".to_string(),
            types: "equipmentTypes".to_string(),
            statuses: "equipmentStatuses".to_string(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_key: String::new(),
            jwt_secret: "change-this-secret-in-production".to_string(),
            session_days: 7,
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            public_host: "localhost:8080".to_string(),
            instance_id: 0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_point_at_standard_collections() {
        let config = AppConfig::default();
        assert_eq!(config.collections.equipment, "equipment");
        assert_eq!(config.collections.types, "equipmentTypes");
        assert_eq!(config.collections.statuses, "equipmentStatuses");
        assert_eq!(config.auth.session_days, 7);
        assert_eq!(config.remote.backend, RemoteBackend::Memory);
    }

    #[test]
    fn test_instance_id_out_of_range_is_rejected() {
        let mut config = AppConfig::default();
        config.identity.instance_id = MAX_INSTANCE_ID;
        assert!(config.check().is_ok());

        config.identity.instance_id = MAX_INSTANCE_ID + 1;
        assert!(matches!(config.check(), Err(ConfigError::Message(_))));
    }

    #[test]
    fn test_backend_names_deserialize_lowercase() {
        let backend: RemoteBackend = serde_json::from_str("\"firebase\"").unwrap();
        assert_eq!(backend, RemoteBackend::Firebase);
    }
}
