//! Server configuration for the API service

use std::path::PathBuf;

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

/// Where bills and users are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Local,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub bind_address: String,
    pub storage: StorageBackend,
    /// JSON file for the local backend; in-memory only when unset
    pub local_store_path: Option<PathBuf>,
    /// JSON array of users loaded into the local backend's directory at startup
    pub local_users_path: Option<PathBuf>,
}

impl ServerConfig {
    /// Load from `SPLITBILL_*` environment variables
    ///
    /// # Environment Variables
    /// - `SPLITBILL_BIND_ADDRESS`: listen address (default: "0.0.0.0:5000")
    /// - `SPLITBILL_STORAGE`: `postgres` or `local` (default: "postgres")
    /// - `SPLITBILL_LOCAL_STORE_PATH`: snapshot file for the local backend
    /// - `SPLITBILL_LOCAL_USERS_PATH`: users seed file for the local backend
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("bind_address", "0.0.0.0:5000")?
            .set_default("storage", "postgres")?
            .add_source(Environment::with_prefix("SPLITBILL"))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        unsafe {
            std::env::remove_var("SPLITBILL_BIND_ADDRESS");
            std::env::remove_var("SPLITBILL_STORAGE");
            std::env::remove_var("SPLITBILL_LOCAL_STORE_PATH");
            std::env::remove_var("SPLITBILL_LOCAL_USERS_PATH");
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:5000");
        assert_eq!(config.storage, StorageBackend::Postgres);
        assert!(config.local_store_path.is_none());
        assert!(config.local_users_path.is_none());
    }

    #[test]
    #[serial]
    fn test_local_backend_from_env() {
        clear_env();
        unsafe {
            std::env::set_var("SPLITBILL_STORAGE", "local");
            std::env::set_var("SPLITBILL_LOCAL_STORE_PATH", "/tmp/splitbill.json");
            std::env::set_var("SPLITBILL_BIND_ADDRESS", "127.0.0.1:8080");
            std::env::set_var("SPLITBILL_LOCAL_USERS_PATH", "/etc/splitbill/users.json");
        }

        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.storage, StorageBackend::Local);
        assert_eq!(config.bind_address, "127.0.0.1:8080");
        assert_eq!(
            config.local_store_path,
            Some(PathBuf::from("/tmp/splitbill.json"))
        );
        assert_eq!(
            config.local_users_path,
            Some(PathBuf::from("/etc/splitbill/users.json"))
        );

        clear_env();
    }

    #[test]
    #[serial]
    fn test_unknown_backend_is_rejected() {
        clear_env();
        unsafe {
            std::env::set_var("SPLITBILL_STORAGE", "mongodb");
        }
        assert!(ServerConfig::from_env().is_err());
        clear_env();
    }
}
