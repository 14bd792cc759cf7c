//! WebSocket sync server
//!
//! Accepts client connections and feeds everything they send into a single
//! gateway task. Connection tasks only move frames between their socket and
//! the gateway; they never touch the list.

use std::future::Future;
use std::net::SocketAddr;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::gateway::{outbox, Gateway, GatewayEvent, SessionId};
use super::message::ClientMessage;

/// Listening server bound to an address
pub struct SyncServer {
    listener: TcpListener,
    gateway: Gateway,
}

impl SyncServer {
    /// Bind the listener
    ///
    /// Binding to port 0 picks a free port; see [`SyncServer::local_addr`].
    pub async fn bind(addr: &str, gateway: Gateway) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;

        Ok(Self { listener, gateway })
    }

    /// Address the server is listening on
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Failed to read listener address")
    }

    /// Serve until the process exits
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Serve until `shutdown` completes
    ///
    /// Open connections are closed once the gateway task has stopped.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let addr = self.local_addr()?;
        let Self { listener, gateway } = self;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let gateway_task = tokio::spawn(gateway_loop(gateway, events_rx));

        info!("Sync server listening on {}", addr);

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Sync server shutting down");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!("New TCP connection from {}", peer);
                        let events = events_tx.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, peer, events).await {
                                debug!("Connection from {} ended with error: {:#}", peer, e);
                            }
                        });
                    }
                    Err(e) => warn!("Failed to accept connection: {}", e),
                },
            }
        }

        // Dropping the gateway closes every outbox, which ends the
        // connection tasks.
        gateway_task.abort();
        let _ = gateway_task.await;
        Ok(())
    }
}

/// Apply gateway events one at a time
async fn gateway_loop(mut gateway: Gateway, mut events: mpsc::UnboundedReceiver<GatewayEvent>) {
    while let Some(event) = events.recv().await {
        gateway.apply(event);
    }
    debug!("Gateway event queue closed");
}

/// Run one client connection until either side closes it
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    events: mpsc::UnboundedSender<GatewayEvent>,
) -> Result<()> {
    let session: SessionId = Uuid::new_v4();
    debug!("Session {} connecting from {}", session, peer);

    let ws_stream = accept_async(stream)
        .await
        .context("WebSocket handshake failed")?;
    let (mut write, mut read) = ws_stream.split();

    let (outbox, mut outbox_rx) = outbox();
    let connected = GatewayEvent::Connected {
        session,
        peer: Some(peer),
        outbox,
    };
    if events.send(connected).is_err() {
        write.close().await.ok();
        return Ok(());
    }

    let result: Result<()> = async {
        loop {
            tokio::select! {
                frame = read.next() => {
                    let decoded = match frame {
                        Some(Ok(Message::Text(text))) => ClientMessage::decode(&text),
                        Some(Ok(Message::Binary(data))) => ClientMessage::decode_bytes(&data),
                        Some(Ok(Message::Close(_))) | None => return Ok(()),
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Err(e.into()),
                    };

                    match decoded {
                        Ok(message) => {
                            debug!("Session {} sent {:?}", session, message);
                            if events.send(GatewayEvent::Inbound { session, message }).is_err() {
                                return Ok(());
                            }
                        }
                        Err(e) => warn!("Dropping malformed frame from {}: {}", session, e),
                    }
                }

                outgoing = outbox_rx.recv() => match outgoing {
                    Some(message) => {
                        let text = message.encode()?;
                        write.send(Message::Text(text)).await?;
                    }
                    None => {
                        write.close().await.ok();
                        return Ok(());
                    }
                },
            }
        }
    }
    .await;

    let _ = events.send(GatewayEvent::Disconnected { session });
    result
}
