//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/shoplist/config.toml)
//! 3. Environment variables (SHOPLIST_* prefix)
//!
//! Environment variables take precedence over config file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::sync::ReconnectPolicy;

/// Environment variable prefix
const ENV_PREFIX: &str = "SHOPLIST";

/// Name of the persisted list file inside `data_dir`
const DATA_FILE_NAME: &str = "shopping-list-data.json";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the persisted list
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Address the server listens on
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Websocket URL clients connect to
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Client reconnection behaviour
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

/// Reconnection settings as they appear in the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Delay before the first retry, in milliseconds
    pub delay_ms: u64,
    /// Upper bound for the retry delay, in milliseconds
    pub max_delay_ms: u64,
    /// Factor applied to the delay after each failed attempt (1 = fixed delay)
    pub multiplier: u32,
    /// Retries before giving up for good
    pub max_attempts: u32,
    /// How long a single connection attempt may take, in milliseconds
    pub connect_timeout_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay_ms: 1_000,
            max_delay_ms: 30_000,
            multiplier: 2,
            max_attempts: 5,
            connect_timeout_ms: 20_000,
        }
    }
}

impl ReconnectConfig {
    /// Build the runtime reconnect policy
    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            initial_delay: Duration::from_millis(self.delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            multiplier: self.multiplier.max(1),
            max_attempts: self.max_attempts,
        }
    }

    /// Connect timeout as a `Duration`
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            bind_addr: default_bind_addr(),
            server_url: default_server_url(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (SHOPLIST_DATA_DIR, SHOPLIST_BIND_ADDR, ...)
    /// 2. Config file (~/.config/shoplist/config.toml or SHOPLIST_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration, preferring an explicit path from the command line
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(p) => Self::load_from_path(p),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var(format!("{}_BIND_ADDR", ENV_PREFIX)) {
            if !val.is_empty() {
                self.bind_addr = val;
            }
        }

        if let Ok(val) = std::env::var(format!("{}_SERVER_URL", ENV_PREFIX)) {
            if !val.is_empty() {
                self.server_url = val;
            }
        }

        // Unparseable numbers are ignored rather than failing startup
        if let Ok(val) = std::env::var(format!("{}_RECONNECT_ATTEMPTS", ENV_PREFIX)) {
            if let Ok(n) = val.parse() {
                self.reconnect.max_attempts = n;
            }
        }

        if let Ok(val) = std::env::var(format!("{}_RECONNECT_DELAY_MS", ENV_PREFIX)) {
            if let Ok(ms) = val.parse() {
                self.reconnect.delay_ms = ms;
            }
        }
    }

    /// Ensure data directory exists
    pub fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Save configuration to the default config file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific file
    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with SHOPLIST_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("shoplist")
            .join("config.toml")
    }

    /// Get the path to the persisted list
    pub fn data_file_path(&self) -> PathBuf {
        self.data_dir.join(DATA_FILE_NAME)
    }
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("shoplist")
}

fn default_bind_addr() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_server_url() -> String {
    "ws://127.0.0.1:3000".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "SHOPLIST_DATA_DIR",
        "SHOPLIST_BIND_ADDR",
        "SHOPLIST_SERVER_URL",
        "SHOPLIST_RECONNECT_ATTEMPTS",
        "SHOPLIST_RECONNECT_DELAY_MS",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.bind_addr, "127.0.0.1:3000");
        assert_eq!(config.server_url, "ws://127.0.0.1:3000");
        assert!(config.data_dir.ends_with("shoplist"));
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.reconnect.delay_ms, 1_000);
    }

    #[test]
    fn test_data_file_path() {
        let config = Config::default();
        assert!(config
            .data_file_path()
            .ends_with("shopping-list-data.json"));
    }

    #[test]
    fn test_reconnect_policy_conversion() {
        let reconnect = ReconnectConfig {
            delay_ms: 250,
            max_delay_ms: 4_000,
            multiplier: 0,
            max_attempts: 3,
            connect_timeout_ms: 500,
        };

        let policy = reconnect.policy();
        assert_eq!(policy.initial_delay, Duration::from_millis(250));
        assert_eq!(policy.max_delay, Duration::from_secs(4));
        // A zero multiplier would collapse the delay, so it is clamped
        assert_eq!(policy.multiplier, 1);
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(reconnect.connect_timeout(), Duration::from_millis(500));
    }

    #[test]
    fn test_env_override_data_dir() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("SHOPLIST_DATA_DIR", "/tmp/shoplist-test");
        config.apply_env_overrides();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/shoplist-test"));
    }

    #[test]
    fn test_env_override_addresses() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("SHOPLIST_BIND_ADDR", "0.0.0.0:4000");
        env::set_var("SHOPLIST_SERVER_URL", "ws://lists.example.com");
        config.apply_env_overrides();
        assert_eq!(config.bind_addr, "0.0.0.0:4000");
        assert_eq!(config.server_url, "ws://lists.example.com");

        // Empty values leave the current setting alone
        env::set_var("SHOPLIST_SERVER_URL", "");
        config.apply_env_overrides();
        assert_eq!(config.server_url, "ws://lists.example.com");
    }

    #[test]
    fn test_env_override_reconnect() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("SHOPLIST_RECONNECT_ATTEMPTS", "9");
        env::set_var("SHOPLIST_RECONNECT_DELAY_MS", "50");
        config.apply_env_overrides();
        assert_eq!(config.reconnect.max_attempts, 9);
        assert_eq!(config.reconnect.delay_ms, 50);

        env::set_var("SHOPLIST_RECONNECT_ATTEMPTS", "lots");
        config.apply_env_overrides();
        assert_eq!(config.reconnect.max_attempts, 9);
    }

    #[test]
    fn test_serialization() {
        let _guard = EnvGuard::new(ENV_VARS);

        let config = Config {
            data_dir: PathBuf::from("/data/shoplist"),
            bind_addr: "0.0.0.0:3000".to_string(),
            server_url: "ws://lists.example.com".to_string(),
            reconnect: ReconnectConfig::default(),
        };

        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("data_dir"));
        assert!(toml_str.contains("bind_addr"));
        assert!(toml_str.contains("[reconnect]"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.data_dir, config.data_dir);
        assert_eq!(parsed.bind_addr, config.bind_addr);
        assert_eq!(parsed.server_url, config.server_url);
        assert_eq!(parsed.reconnect, config.reconnect);
    }

    #[test]
    fn test_load_from_str() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            data_dir = "/custom/data"
            server_url = "ws://example.com:3000"

            [reconnect]
            max_attempts = 2
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(config.server_url, "ws://example.com:3000");
        assert_eq!(config.bind_addr, "127.0.0.1:3000");
        assert_eq!(config.reconnect.max_attempts, 2);
        assert_eq!(config.reconnect.delay_ms, 1_000);
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);

        let path = PathBuf::from("/nonexistent/config.toml");
        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:3000");
    }

    #[test]
    fn test_save_and_reload() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let config = Config {
            bind_addr: "127.0.0.1:4555".to_string(),
            ..Config::default()
        };
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.bind_addr, "127.0.0.1:4555");
    }
}
