//! Item command handlers
//!
//! Each command connects to the server, waits for the current list, does its
//! work and disconnects. `watch` stays connected and prints every change.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::sync::watch;
use tokio::time::timeout;

use shoplist_core::sync::{AgentConfig, ConnectionState, ReconnectPolicy, SyncAgent};
use shoplist_core::{Config, Item};

use crate::output::{short_id, Output};

/// How long a one-shot command waits for the server to answer
const REPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// Connect once, without retrying, and wait for the first list
async fn connect(config: &Config, server: Option<&str>) -> Result<SyncAgent> {
    let mut agent_config =
        AgentConfig::from_config(config).with_policy(ReconnectPolicy::never());
    if let Some(url) = server {
        agent_config.url = url.to_string();
    }
    let url = agent_config.url.clone();
    let wait = agent_config.connect_timeout + REPLY_TIMEOUT;

    let agent = SyncAgent::spawn(agent_config);
    let mut snapshot = agent.subscribe_snapshot();
    let mut state = agent.subscribe_state();

    state
        .wait_for(|s| matches!(s, ConnectionState::Connected | ConnectionState::Failed))
        .await
        .context("Sync agent stopped unexpectedly")?;
    if agent.state() == ConnectionState::Failed {
        agent.shutdown().await;
        bail!(
            "Cannot reach the server at {}. Is `shoplist serve` running?",
            url
        );
    }

    timeout(wait, snapshot.changed())
        .await
        .context("Timed out waiting for the shopping list")?
        .context("Sync agent stopped unexpectedly")?;

    Ok(agent)
}

/// Wait until the list satisfies `predicate`, returning it
async fn wait_for_list(
    agent: &SyncAgent,
    predicate: impl FnMut(&Vec<Item>) -> bool,
) -> Result<Vec<Item>> {
    let mut snapshot = agent.subscribe_snapshot();
    let items = timeout(REPLY_TIMEOUT, snapshot.wait_for(predicate))
        .await
        .context("Timed out waiting for the server to apply the change")?
        .context("Connection to the server was lost")?
        .clone();
    Ok(items)
}

/// Find an item by full ID or unique ID prefix
pub fn resolve<'a>(items: &'a [Item], id: &str) -> Result<&'a Item> {
    if let Some(item) = items.iter().find(|i| i.id() == id) {
        return Ok(item);
    }

    let matches: Vec<_> = items.iter().filter(|i| i.id().starts_with(id)).collect();
    match matches.as_slice() {
        [item] => Ok(item),
        [] => bail!("No item found with ID '{}'", id),
        _ => bail!(
            "ID prefix '{}' matches {} items; use more characters",
            id,
            matches.len()
        ),
    }
}

/// Print the current list
pub async fn list(config: &Config, server: Option<&str>, output: &Output) -> Result<()> {
    let agent = connect(config, server).await?;
    output.print_items(&agent.snapshot());
    agent.shutdown().await;
    Ok(())
}

/// Add an item
pub async fn add(
    config: &Config,
    server: Option<&str>,
    name: String,
    output: &Output,
) -> Result<()> {
    let agent = connect(config, server).await?;
    let known: HashSet<String> = agent
        .snapshot()
        .iter()
        .map(|i| i.id().to_string())
        .collect();

    agent.add_item(&name).await?;

    let name = name.trim().to_string();
    let items = wait_for_list(&agent, |items| {
        items
            .iter()
            .any(|i| !known.contains(i.id()) && i.name() == name)
    })
    .await;
    agent.shutdown().await;
    let items = items?;

    if let Some(item) = items
        .iter()
        .find(|i| !known.contains(i.id()) && i.name() == name)
    {
        if output.is_quiet() || output.is_json() {
            output.print_item(item);
        } else {
            output.success(&format!("Added {} ({})", item.name(), short_id(item.id())));
        }
    }
    Ok(())
}

/// Flip an item's completed flag
pub async fn toggle(
    config: &Config,
    server: Option<&str>,
    id: String,
    output: &Output,
) -> Result<()> {
    let agent = connect(config, server).await?;
    let target = match resolve(&agent.snapshot(), &id) {
        Ok(item) => item.clone(),
        Err(e) => {
            agent.shutdown().await;
            return Err(e);
        }
    };

    agent.toggle_item(target.id()).await?;

    let items = wait_for_list(&agent, |items| {
        items
            .iter()
            .find(|i| i.id() == target.id())
            .map_or(true, |i| i.completed() != target.completed())
    })
    .await;
    agent.shutdown().await;
    let items = items?;

    match items.iter().find(|i| i.id() == target.id()) {
        Some(item) if output.is_quiet() || output.is_json() => output.print_item(item),
        Some(item) => output.success(&format!(
            "{} is now {}",
            item.name(),
            if item.completed() { "done" } else { "pending" }
        )),
        None => bail!("Item '{}' was deleted by someone else", target.name()),
    }
    Ok(())
}

/// Remove an item
pub async fn delete(
    config: &Config,
    server: Option<&str>,
    id: String,
    output: &Output,
) -> Result<()> {
    let agent = connect(config, server).await?;
    let target = match resolve(&agent.snapshot(), &id) {
        Ok(item) => item.clone(),
        Err(e) => {
            agent.shutdown().await;
            return Err(e);
        }
    };

    agent.delete_item(target.id()).await?;

    let result =
        wait_for_list(&agent, |items| items.iter().all(|i| i.id() != target.id())).await;
    agent.shutdown().await;
    result?;

    output.success(&format!("Deleted {}", target.name()));
    Ok(())
}

/// Print the list every time it changes, until Ctrl-C
pub async fn watch(config: &Config, server: Option<&str>, output: &Output) -> Result<()> {
    let mut agent_config = AgentConfig::from_config(config);
    if let Some(url) = server {
        agent_config.url = url.to_string();
    }
    output.message(&format!("Watching {} (Ctrl-C to stop)", agent_config.url));

    let agent = SyncAgent::spawn(agent_config);
    let mut snapshot = agent.subscribe_snapshot();
    let mut state = agent.subscribe_state();

    let result = watch_loop(&mut snapshot, &mut state, output).await;
    agent.shutdown().await;
    result
}

async fn watch_loop(
    snapshot: &mut watch::Receiver<Vec<Item>>,
    state: &mut watch::Receiver<ConnectionState>,
    output: &Output,
) -> Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            biased;

            changed = state.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let current = *state.borrow_and_update();
                output.print_state(current);
                if current == ConnectionState::Failed {
                    bail!("Gave up reconnecting to the server");
                }
            }
            changed = snapshot.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let items = snapshot.borrow_and_update().clone();
                output.print_items(&items);
            }
            _ = &mut ctrl_c => return Ok(()),
        }
    }
}
