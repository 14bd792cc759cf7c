//! Shoplist CLI
//!
//! Command-line interface for shoplist - runs the sync server and talks to it.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use shoplist_core::Config;

mod commands;
mod output;

use commands::serve::ServeOptions;
use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "shoplist")]
#[command(about = "Shoplist - a shared shopping list synced in real time")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Use this config file instead of the default
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sync server
    Serve {
        /// Address to listen on (defaults to bind_addr from config)
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
        /// List file (defaults to the data directory)
        #[arg(long, value_name = "PATH", conflicts_with = "ephemeral")]
        data_file: Option<PathBuf>,
        /// Keep the list in memory only
        #[arg(long)]
        ephemeral: bool,
    },
    /// Show the shopping list
    #[command(alias = "ls")]
    List {
        #[command(flatten)]
        remote: Remote,
    },
    /// Add an item
    Add {
        /// Item name
        name: String,
        #[command(flatten)]
        remote: Remote,
    },
    /// Mark an item done, or pending again
    Toggle {
        /// Item ID (full or prefix)
        id: String,
        #[command(flatten)]
        remote: Remote,
    },
    /// Delete an item
    #[command(alias = "rm")]
    Delete {
        /// Item ID (full or prefix)
        id: String,
        #[command(flatten)]
        remote: Remote,
    },
    /// Print the list whenever it changes
    Watch {
        #[command(flatten)]
        remote: Remote,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

/// Which server a client command talks to
#[derive(clap::Args, Debug, Clone, Default)]
struct Remote {
    /// Server URL (defaults to server_url from config)
    #[arg(long, value_name = "URL")]
    server: Option<String>,
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, bind_addr, server_url, reconnect.*)
        key: String,
        /// Configuration value
        value: String,
    },
}

impl Commands {
    /// Log level used when RUST_LOG is not set
    fn default_log_level(&self) -> &'static str {
        match self {
            Commands::Serve { .. } | Commands::Watch { .. } => "info",
            _ => "warn",
        }
    }
}

/// Initialize logging to stderr
///
/// RUST_LOG takes precedence over the per-command default.
fn init_logging(level: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("shoplist_core={},shoplist_cli={}", level, level))
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    let level = if cli.quiet {
        "error"
    } else {
        cli.command.default_log_level()
    };
    init_logging(level);

    let config_path = cli.config.as_ref();

    // Config commands work on the file itself, not the effective settings
    if let Commands::Config { command } = &cli.command {
        return handle_config_command(command.clone(), config_path, &output);
    }

    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match cli.command {
        Commands::Serve {
            bind,
            data_file,
            ephemeral,
        } => {
            let options = ServeOptions {
                bind,
                data_file,
                ephemeral,
            };
            commands::serve::serve(&config, options, &output).await
        }
        Commands::List { remote } => {
            commands::items::list(&config, remote.server.as_deref(), &output).await
        }
        Commands::Add { name, remote } => {
            commands::items::add(&config, remote.server.as_deref(), name, &output).await
        }
        Commands::Toggle { id, remote } => {
            commands::items::toggle(&config, remote.server.as_deref(), id, &output).await
        }
        Commands::Delete { id, remote } => {
            commands::items::delete(&config, remote.server.as_deref(), id, &output).await
        }
        Commands::Watch { remote } => {
            commands::items::watch(&config, remote.server.as_deref(), &output).await
        }
        Commands::Config { .. } => unreachable!(), // Handled above
    }
}

fn handle_config_command(
    command: Option<ConfigCommands>,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(config_path, output),
        Some(ConfigCommands::Set { key, value }) => {
            commands::config::set(key, value, config_path, output)
        }
    }
}
