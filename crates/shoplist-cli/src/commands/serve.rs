//! Serve command handler

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

use shoplist_core::sync::{Gateway, SyncServer};
use shoplist_core::{Config, JsonFileStore, ListStore, MemoryStore};

use crate::output::Output;

/// Options for `shoplist serve`
#[derive(Debug, Default)]
pub struct ServeOptions {
    /// Address to listen on instead of the configured one
    pub bind: Option<String>,
    /// List file to use instead of the one in the data directory
    pub data_file: Option<PathBuf>,
    /// Keep the list in memory only
    pub ephemeral: bool,
}

/// Run the sync server until Ctrl-C
pub async fn serve(config: &Config, options: ServeOptions, output: &Output) -> Result<()> {
    let store = open_store(config, &options)?;
    let location = store.location();
    let item_count = store.len();

    let bind_addr = options.bind.as_deref().unwrap_or(&config.bind_addr);
    let server = SyncServer::bind(bind_addr, Gateway::new(store)).await?;
    let addr = server.local_addr()?;

    output.message(&format!(
        "Serving {} item(s) from {} on ws://{}",
        item_count, location, addr
    ));
    output.message("Press Ctrl-C to stop.");

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    info!("Server stopped");
    output.success("Server stopped");
    Ok(())
}

/// Build the list store the server will own
fn open_store(config: &Config, options: &ServeOptions) -> Result<ListStore> {
    if options.ephemeral {
        return Ok(ListStore::open(MemoryStore::new()));
    }

    let path = match &options.data_file {
        Some(path) => path.clone(),
        None => {
            config
                .ensure_data_dir()
                .context("Failed to prepare data directory")?;
            config.data_file_path()
        }
    };

    let file = JsonFileStore::new(path);
    if !file.exists() {
        info!("No list at {}, starting a new one", file.path().display());
    }
    Ok(ListStore::open(file))
}
