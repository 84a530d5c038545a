//! Configuration management for tether.
//!
//! Loads configuration from ${TETHER_HOME}/config.toml with sensible defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Returns the default config template with comments.
///
/// This is embedded from default_config.toml at compile time.
fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

pub mod paths {
    //! Path resolution for tether configuration.
    //!
    //! TETHER_HOME resolution order:
    //! 1. TETHER_HOME environment variable (if set)
    //! 2. ~/.config/tether (default)

    use std::path::PathBuf;

    /// Returns the tether home directory.
    ///
    /// Checks TETHER_HOME env var first, falls back to ~/.config/tether,
    /// and to a relative `.tether` when no home directory can be found.
    pub fn tether_home() -> PathBuf {
        if let Ok(home) = std::env::var("TETHER_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".tether"),
            |h| h.join(".config").join("tether"),
        )
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        tether_home().join("config.toml")
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Peer host name or address
    pub host: String,

    /// Peer TCP port (1-65535)
    pub port: u16,

    /// Seconds without outbound traffic before a heartbeat is sent (0 disables)
    pub heartbeat_interval_secs: f64,

    /// Payload reserved for heartbeat probes
    pub heartbeat_sentinel: String,

    /// Upper bound for a single read from the peer
    pub receive_buffer_size: usize,

    /// Operator command that ends the session (case-insensitive)
    pub quit_keyword: String,

    /// Timeout for establishing the connection in seconds (0 disables)
    pub connect_timeout_secs: u64,

    /// Optional log file; logs go to stderr when unset
    pub log_file: Option<String>,
}

impl Config {
    pub const DEFAULT_HOST: &'static str = "127.0.0.1";
    pub const DEFAULT_PORT: u16 = 8080;
    pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: f64 = 5.0;
    pub const DEFAULT_HEARTBEAT_SENTINEL: &'static str = "__ping__";
    pub const DEFAULT_RECEIVE_BUFFER_SIZE: usize = 4096;
    pub const DEFAULT_QUIT_KEYWORD: &'static str = "exit";
    pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
    /// Shortest accepted heartbeat interval.
    pub const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1);

    /// Loads configuration from the default config path.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))?
        } else {
            Config::default()
        };

        config
            .validate()
            .with_context(|| format!("Invalid config at {}", path.display()))?;
        Ok(config)
    }

    /// Checks value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            anyhow::bail!("host must not be empty");
        }
        if self.port == 0 {
            anyhow::bail!("port must be between 1 and 65535");
        }
        let secs = self.heartbeat_interval_secs;
        if !secs.is_finite() || secs < 0.0 {
            anyhow::bail!("heartbeat_interval_secs must be a non-negative number, got {secs}");
        }
        if secs > 0.0 {
            match Duration::try_from_secs_f64(secs) {
                Ok(interval) if interval >= Self::MIN_HEARTBEAT_INTERVAL => {}
                Ok(_) => anyhow::bail!(
                    "heartbeat_interval_secs must be 0 or at least {}, got {secs}",
                    Self::MIN_HEARTBEAT_INTERVAL.as_secs_f64()
                ),
                Err(err) => anyhow::bail!("heartbeat_interval_secs {secs} is out of range: {err}"),
            }
        }
        if self.heartbeat_sentinel.is_empty() {
            anyhow::bail!("heartbeat_sentinel must not be empty");
        }
        if self.receive_buffer_size == 0 {
            anyhow::bail!("receive_buffer_size must be greater than zero");
        }
        if self.quit_keyword.trim().is_empty() {
            anyhow::bail!("quit_keyword must not be empty");
        }
        Ok(())
    }

    /// Returns the heartbeat interval, or `None` when heartbeats are disabled.
    ///
    /// Values `validate` would reject never panic here: out-of-range intervals
    /// disable heartbeats and sub-millisecond ones are raised to the minimum.
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        if self.heartbeat_interval_secs <= 0.0 {
            return None;
        }
        Duration::try_from_secs_f64(self.heartbeat_interval_secs)
            .ok()
            .map(|interval| interval.max(Self::MIN_HEARTBEAT_INTERVAL))
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        if self.connect_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.connect_timeout_secs))
        }
    }

    pub fn log_file_path(&self) -> Option<PathBuf> {
        self.log_file
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
    }

    /// Creates a default config file at the given path.
    /// Returns an error if the file already exists.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }

        Self::write_config(path, default_config_template())
    }

    /// Generates a fresh config TOML from Rust defaults.
    ///
    /// Uses the embedded template for structure/comments and merges
    /// generated values from `Config::default()` into it.
    pub fn generate() -> Result<String> {
        use toml_edit::{DocumentMut, Item};

        let config = Config::default();
        let generated_toml =
            toml::to_string(&config).context("Failed to serialize default config to TOML")?;

        // Parse template as base (preserves comments)
        let mut doc: DocumentMut = default_config_template()
            .parse()
            .context("Failed to parse default config template")?;

        let generated_doc: DocumentMut = generated_toml
            .parse()
            .context("Failed to parse generated config")?;

        for (key, value) in generated_doc.as_table() {
            if let Item::Value(v) = value {
                doc[key] = Item::Value(v.clone());
            }
        }

        Ok(doc.to_string())
    }

    /// Writes config content to a file, creating parent directories as needed.
    /// Uses atomic write (temp file + rename) to prevent corruption.
    fn write_config(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let tmp_path = path.with_extension("toml.tmp");
        fs::write(&tmp_path, content)
            .with_context(|| format!("Failed to write config to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: Self::DEFAULT_HOST.to_string(),
            port: Self::DEFAULT_PORT,
            heartbeat_interval_secs: Self::DEFAULT_HEARTBEAT_INTERVAL_SECS,
            heartbeat_sentinel: Self::DEFAULT_HEARTBEAT_SENTINEL.to_string(),
            receive_buffer_size: Self::DEFAULT_RECEIVE_BUFFER_SIZE,
            quit_keyword: Self::DEFAULT_QUIT_KEYWORD.to_string(),
            connect_timeout_secs: Self::DEFAULT_CONNECT_TIMEOUT_SECS,
            log_file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("nonexistent.toml");

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.port, 8080);
        assert_eq!(config.heartbeat_sentinel, "__ping__");
    }

    #[test]
    fn test_load_partial_config_merges_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");

        fs::write(&config_path, "port = 9000\nquit_keyword = \"quit\"\n").unwrap();

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.quit_keyword, "quit");
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.receive_buffer_size, 4096);
    }

    #[test]
    fn test_load_rejects_port_zero() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "port = 0\n").unwrap();

        let err = Config::load_from(&config_path).unwrap_err();
        assert!(format!("{err:#}").contains("port must be between 1 and 65535"));
    }

    #[test]
    fn test_load_rejects_out_of_range_port() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "port = 70000\n").unwrap();

        assert!(Config::load_from(&config_path).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let negative = Config {
            heartbeat_interval_secs: -1.0,
            ..Config::default()
        };
        assert!(negative.validate().is_err());

        let empty_sentinel = Config {
            heartbeat_sentinel: String::new(),
            ..Config::default()
        };
        assert!(empty_sentinel.validate().is_err());

        let no_buffer = Config {
            receive_buffer_size: 0,
            ..Config::default()
        };
        assert!(no_buffer.validate().is_err());
    }

    #[test]
    fn test_heartbeat_interval_zero_disables() {
        let config = Config {
            heartbeat_interval_secs: 0.0,
            ..Config::default()
        };
        assert_eq!(config.heartbeat_interval(), None);
        assert_eq!(
            Config::default().heartbeat_interval(),
            Some(Duration::from_secs(5))
        );
    }

    #[test]
    fn test_fractional_heartbeat_interval() {
        let config = Config {
            heartbeat_interval_secs: 0.25,
            ..Config::default()
        };
        assert_eq!(config.heartbeat_interval(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_validate_rejects_interval_too_large_for_duration() {
        let config = Config {
            heartbeat_interval_secs: 1e20,
            ..Config::default()
        };

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("out of range"));
        assert_eq!(config.heartbeat_interval(), None);
    }

    #[test]
    fn test_validate_rejects_interval_below_minimum() {
        let config = Config {
            heartbeat_interval_secs: 1e-12,
            ..Config::default()
        };

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("at least 0.001"));
        assert_eq!(
            config.heartbeat_interval(),
            Some(Config::MIN_HEARTBEAT_INTERVAL)
        );

        let smallest = Config {
            heartbeat_interval_secs: 0.001,
            ..Config::default()
        };
        assert!(smallest.validate().is_ok());
        assert_eq!(
            smallest.heartbeat_interval(),
            Some(Duration::from_millis(1))
        );
    }

    #[test]
    fn test_connect_timeout_zero_disables() {
        let config = Config {
            connect_timeout_secs: 0,
            ..Config::default()
        };
        assert_eq!(config.connect_timeout(), None);
        assert_eq!(
            Config::default().connect_timeout(),
            Some(Duration::from_secs(10))
        );
    }

    #[test]
    fn test_init_creates_config_with_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("subdir").join("config.toml");

        Config::init(&config_path).unwrap();

        assert!(config_path.exists());
        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_init_fails_if_exists() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "# existing").unwrap();

        let err = Config::init(&config_path).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_generate_matches_defaults_and_keeps_comments() {
        let generated = Config::generate().unwrap();
        assert!(generated.contains("# Seconds without outbound traffic"));

        let parsed: Config = toml::from_str(&generated).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_log_file_path_ignores_blank() {
        let config = Config {
            log_file: Some("  ".to_string()),
            ..Config::default()
        };
        assert_eq!(config.log_file_path(), None);
    }
}
