//! Config command handlers

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use shoplist_core::Config;

use crate::output::{Output, OutputFormat};

/// Keys accepted by `config set`
const VALID_KEYS: &str = "data_dir, bind_addr, server_url, reconnect.delay_ms, \
                          reconnect.max_delay_ms, reconnect.multiplier, \
                          reconnect.max_attempts, reconnect.connect_timeout_ms";

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "data_dir": config.data_dir,
                    "bind_addr": config.bind_addr,
                    "server_url": config.server_url,
                    "reconnect": {
                        "delay_ms": config.reconnect.delay_ms,
                        "max_delay_ms": config.reconnect.max_delay_ms,
                        "multiplier": config.reconnect.multiplier,
                        "max_attempts": config.reconnect.max_attempts,
                        "connect_timeout_ms": config.reconnect.connect_timeout_ms
                    }
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.data_dir.display());
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            println!("Configuration:");
            println!("  data_dir:    {}", config.data_dir.display());
            println!("  bind_addr:   {}", config.bind_addr);
            println!("  server_url:  {}", config.server_url);
            println!("  reconnect:");
            println!("    delay_ms:           {}", config.reconnect.delay_ms);
            println!("    max_delay_ms:       {}", config.reconnect.max_delay_ms);
            println!("    multiplier:         {}", config.reconnect.multiplier);
            println!("    max_attempts:       {}", config.reconnect.max_attempts);
            println!(
                "    connect_timeout_ms: {}",
                config.reconnect.connect_timeout_ms
            );
            println!();
            println!("Config file: {}", effective_path.display());
            println!("Data file:   {}", config.data_file_path().display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    apply(&mut config, &key, &value)?;

    // Save to the CLI-specified path or default
    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, value));

    Ok(())
}

/// Update one key in `config`
fn apply(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "data_dir" => config.data_dir = value.into(),
        "bind_addr" => config.bind_addr = value.to_string(),
        "server_url" => {
            if !value.starts_with("ws://") && !value.starts_with("wss://") {
                bail!("server_url must start with ws:// or wss://");
            }
            config.server_url = value.to_string();
        }
        "reconnect.delay_ms" => config.reconnect.delay_ms = parse_number(key, value)?,
        "reconnect.max_delay_ms" => config.reconnect.max_delay_ms = parse_number(key, value)?,
        "reconnect.multiplier" => config.reconnect.multiplier = parse_number(key, value)?,
        "reconnect.max_attempts" => config.reconnect.max_attempts = parse_number(key, value)?,
        "reconnect.connect_timeout_ms" => {
            config.reconnect.connect_timeout_ms = parse_number(key, value)?
        }
        _ => {
            bail!(
                "Unknown configuration key: '{}'\nValid keys: {}",
                key,
                VALID_KEYS
            );
        }
    }
    Ok(())
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .ok()
        .with_context(|| format!("Invalid value for {}: expected a non-negative number", key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_apply_known_keys() {
        let mut config = Config::default();

        apply(&mut config, "bind_addr", "0.0.0.0:4000").unwrap();
        apply(&mut config, "server_url", "wss://shop.example").unwrap();
        apply(&mut config, "reconnect.max_attempts", "9").unwrap();
        apply(&mut config, "reconnect.delay_ms", "250").unwrap();

        assert_eq!(config.bind_addr, "0.0.0.0:4000");
        assert_eq!(config.server_url, "wss://shop.example");
        assert_eq!(config.reconnect.max_attempts, 9);
        assert_eq!(config.reconnect.delay_ms, 250);
    }

    #[test]
    fn test_apply_rejects_bad_values() {
        let mut config = Config::default();

        assert!(apply(&mut config, "colour", "blue").is_err());
        assert!(apply(&mut config, "server_url", "http://nope").is_err());
        assert!(apply(&mut config, "reconnect.max_attempts", "-1").is_err());
        assert!(apply(&mut config, "reconnect.delay_ms", "soon").is_err());
    }

    #[test]
    fn test_set_writes_config_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        let output = Output::new(OutputFormat::Quiet);

        set(
            "server_url".to_string(),
            "ws://10.0.0.2:3000".to_string(),
            Some(&path),
            &output,
        )
        .unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.server_url, "ws://10.0.0.2:3000");
    }
}
