//! TOML configuration file support.
//!
//! Entirely optional: everything here can also be set in code through
//! [`AppBuilder`](crate::AppBuilder) and [`Server`](crate::Server). The
//! file exists so deployments can change the bind address or toggle the
//! watcher without a rebuild.
//!
//! ```toml
//! bind = "0.0.0.0:8080"
//! debounce_ms = 250
//! watch = ["content/pages", "content/assets"]
//! security_headers = true
//! ```

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Deployment settings, loaded from a TOML file. Unknown keys are
/// rejected so typos fail at boot instead of being silently ignored.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Address to bind, `host:port`.
    pub bind: String,
    /// Debounce window for file-change rebuilds, in milliseconds.
    pub debounce_ms: u64,
    /// Paths to watch for changes. Empty disables the watcher.
    pub watch: Vec<PathBuf>,
    /// Stamp the standard security headers onto every response.
    pub security_headers: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
            debounce_ms: 500,
            watch: Vec::new(),
            security_headers: false,
        }
    }
}

impl Config {
    /// Reads and validates a config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the values make sense together. Called by
    /// [`from_file`](Config::from_file); call it yourself when building a
    /// `Config` in code.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind
            .parse::<SocketAddr>()
            .map_err(|source| ConfigError::BindAddr {
                addr: self.bind.clone(),
                source,
            })?;
        if self.debounce_ms == 0 {
            return Err(ConfigError::ZeroDebounce);
        }
        Ok(())
    }

    /// The debounce window as a [`Duration`], for
    /// [`AppBuilder::debounce`](crate::AppBuilder::debounce).
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().expect("tempfile");
        fs::write(file.path(), content).expect("write");
        file
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let file = write_config(r#"bind = "0.0.0.0:8080""#);
        let config = Config::from_file(file.path()).expect("should load");
        assert_eq!(config.bind, "0.0.0.0:8080");
        assert_eq!(config.debounce_ms, 500);
        assert!(config.watch.is_empty());
        assert!(!config.security_headers);
    }

    #[test]
    fn full_config_round_trips() {
        let file = write_config(
            r#"
            bind = "127.0.0.1:4000"
            debounce_ms = 250
            watch = ["content/pages", "content/assets"]
            security_headers = true
            "#,
        );
        let config = Config::from_file(file.path()).expect("should load");
        assert_eq!(config.debounce(), Duration::from_millis(250));
        assert_eq!(config.watch.len(), 2);
        assert!(config.security_headers);
    }

    #[test]
    fn invalid_bind_address_is_rejected() {
        let file = write_config(r#"bind = "not-an-address""#);
        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::BindAddr { .. }));
    }

    #[test]
    fn zero_debounce_is_rejected() {
        let file = write_config("debounce_ms = 0");
        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroDebounce));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let file = write_config(r#"bindd = "127.0.0.1:3000""#);
        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
