// src/livereload/mod.rs

//! Browser push side-channel.
//!
//! Pipelines announce "something changed at this path" through the
//! [`ReloadNotifier`] trait. In production that is a [`LiveReloadHub`],
//! which fans the message out to every websocket client connected to the
//! [`server`].

pub mod server;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

pub use server::{router, serve, spawn_server};

/// LiveReload protocol identifier advertised in the handshake.
pub const PROTOCOL_V7: &str = "http://livereload.com/protocols/official-7";

/// Receives "reload this path" notifications from pipelines.
pub trait ReloadNotifier: Send + Sync {
    fn reload(&self, path: &str);
}

/// Notifier that drops every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl ReloadNotifier for NoopNotifier {
    fn reload(&self, path: &str) {
        debug!(path, "livereload disabled; dropping notification");
    }
}

/// Wire messages sent to browser clients.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum ServerMessage {
    Hello {
        protocols: Vec<String>,
        #[serde(rename = "serverName")]
        server_name: String,
    },
    Reload {
        path: String,
        #[serde(rename = "liveCSS")]
        live_css: bool,
    },
}

impl ServerMessage {
    pub fn hello() -> Self {
        ServerMessage::Hello {
            protocols: vec![PROTOCOL_V7.to_string()],
            server_name: env!("CARGO_PKG_NAME").to_string(),
        }
    }

    pub fn reload(path: &str) -> Self {
        ServerMessage::Reload {
            path: path.to_string(),
            live_css: true,
        }
    }
}

/// Broadcast hub shared by the server and the pipelines.
#[derive(Debug, Clone)]
pub struct LiveReloadHub {
    tx: broadcast::Sender<ServerMessage>,
}

impl Default for LiveReloadHub {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveReloadHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.tx.subscribe()
    }

    pub fn client_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl ReloadNotifier for LiveReloadHub {
    fn reload(&self, path: &str) {
        match self.tx.send(ServerMessage::reload(path)) {
            Ok(clients) => debug!(path, clients, "livereload notification sent"),
            Err(_) => debug!(path, "no livereload clients connected"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reload_message_serializes_in_protocol_shape() {
        let json = serde_json::to_value(ServerMessage::reload("/srv/app.css")).unwrap();
        assert_eq!(json["command"], "reload");
        assert_eq!(json["path"], "/srv/app.css");
        assert_eq!(json["liveCSS"], true);
    }

    #[test]
    fn hello_advertises_protocol_seven() {
        let json = serde_json::to_value(ServerMessage::hello()).unwrap();
        assert_eq!(json["command"], "hello");
        assert_eq!(json["protocols"][0], PROTOCOL_V7);
    }

    #[tokio::test]
    async fn hub_delivers_to_subscribers() {
        let hub = LiveReloadHub::new();
        let mut rx = hub.subscribe();
        hub.reload("/tmp/a.html");
        assert_eq!(rx.recv().await.unwrap(), ServerMessage::reload("/tmp/a.html"));
    }

    #[test]
    fn hub_without_clients_does_not_panic() {
        let hub = LiveReloadHub::new();
        assert_eq!(hub.client_count(), 0);
        hub.reload("/tmp/a.html");
    }
}
