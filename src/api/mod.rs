//! Push-channel server for remote HUD viewers

pub mod hub;
pub mod websocket;

use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

pub use hub::{BroadcastBridge, ClickHandler, ClientId, CONNECTED_MESSAGE};
pub use websocket::{WsIncoming, WsOutgoing, handle_message, parse_incoming};

use crate::Result;

/// WebSocket server in front of a [`BroadcastBridge`]
pub struct BridgeServer {
    bridge: BroadcastBridge,
    host: String,
    port: u16,
}

impl BridgeServer {
    #[must_use]
    pub fn new(bridge: BroadcastBridge, host: impl Into<String>, port: u16) -> Self {
        Self {
            bridge,
            host: host.into(),
            port,
        }
    }

    /// Router with request tracing
    pub fn router(&self) -> Router {
        websocket::router(self.bridge.clone()).layer(TraceLayer::new_for_http())
    }

    /// Bind the listening socket
    ///
    /// # Errors
    ///
    /// Returns error if the address is invalid or in use
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = format!("{}:{}", self.host, self.port);
        TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind bridge on {addr}: {e}")))
    }

    /// Serve viewers on an already bound listener
    ///
    /// # Errors
    ///
    /// Returns error if the server fails
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let local: Option<SocketAddr> = listener.local_addr().ok();
        tracing::info!(addr = ?local, "bridge listening");

        axum::serve(listener, self.router())
            .await
            .map_err(|e| crate::Error::Config(format!("bridge server error: {e}")))?;

        Ok(())
    }

    /// Run the server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Run the server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}
