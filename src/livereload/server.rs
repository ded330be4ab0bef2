// src/livereload/server.rs

//! LiveReload websocket endpoint (`/livereload`).

use std::time::Duration;

use anyhow::Context;
use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{LiveReloadHub, ServerMessage};
use crate::errors::Result;

/// Messages a browser client may send. Only the handshake matters.
#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "lowercase")]
enum ClientMessage {
    Hello,
    #[serde(other)]
    Other,
}

pub fn router(hub: LiveReloadHub) -> Router {
    Router::new()
        .route("/livereload", get(ws_handler))
        .with_state(hub)
}

async fn ws_handler(ws: WebSocketUpgrade, State(hub): State<LiveReloadHub>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, hub.subscribe()))
}

async fn handle_socket(mut socket: WebSocket, mut rx: broadcast::Receiver<ServerMessage>) {
    debug!("livereload client connected");
    loop {
        tokio::select! {
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if let Ok(ClientMessage::Hello) = serde_json::from_str(text.as_str()) {
                        if send(&mut socket, &ServerMessage::hello()).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    debug!(error = %err, "livereload socket error");
                    break;
                }
            },
            outgoing = rx.recv() => match outgoing {
                Ok(message) => {
                    if send(&mut socket, &message).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "livereload client lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    debug!("livereload client disconnected");
}

async fn send(socket: &mut WebSocket, message: &ServerMessage) -> std::result::Result<(), ()> {
    let json = serde_json::to_string(message).map_err(|_| ())?;
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}

/// Bind `addr` and serve until the listener fails.
pub async fn serve(addr: &str, hub: LiveReloadHub) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding livereload listener on {addr}"))?;
    info!(addr = %listener.local_addr()?, "livereload listening");
    axum::serve(listener, router(hub))
        .await
        .context("livereload server stopped")?;
    Ok(())
}

/// Run [`serve`] forever, restarting after `backoff` whenever it ends.
/// Abort the returned handle to stop it.
pub fn spawn_server(addr: String, hub: LiveReloadHub, backoff: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(err) = serve(&addr, hub.clone()).await {
                warn!(addr = %addr, error = %err, "livereload server failed");
            }
            tokio::time::sleep(backoff).await;
            info!(addr = %addr, "restarting livereload server");
        }
    })
}
