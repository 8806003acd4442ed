//! Client registry and fan-out for the push channel
//!
//! The client set is owned by a single hub task. Every other context talks
//! to it through [`BroadcastBridge`], a cheap cloneable handle that enqueues
//! commands, so the frame loop can broadcast without touching socket state.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::{mpsc, oneshot};

use super::websocket::WsOutgoing;
use crate::{Error, Result};

/// Outbound frames queued per client before it counts as stalled
const CLIENT_QUEUE: usize = 64;

/// Greeting sent to every new client
pub const CONNECTED_MESSAGE: &str = "Connected to Jarvis HUD";

/// Identifies one registered client
pub type ClientId = u64;

/// Invoked for every inbound click
pub type ClickHandler = Arc<dyn Fn() + Send + Sync>;

enum HubCommand {
    Register {
        tx: mpsc::Sender<Arc<str>>,
        reply: oneshot::Sender<ClientId>,
    },
    Unregister {
        id: ClientId,
    },
    Broadcast {
        text: Arc<str>,
    },
    Count {
        reply: oneshot::Sender<usize>,
    },
}

/// Handle to the broadcast hub
#[derive(Clone)]
pub struct BroadcastBridge {
    commands: mpsc::UnboundedSender<HubCommand>,
    click_handler: Arc<RwLock<Option<ClickHandler>>>,
}

impl BroadcastBridge {
    /// Start the hub task on the current runtime
    ///
    /// The task ends once every handle has been dropped.
    #[must_use]
    pub fn spawn() -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_hub(rx));
        Self {
            commands,
            click_handler: Arc::new(RwLock::new(None)),
        }
    }

    /// Add a client and queue its `connected` greeting
    ///
    /// Returns the client's id and the receiver of its outbound frames. The
    /// receiver closes when the hub drops the client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Client`] if the hub has shut down
    pub async fn register_client(&self) -> Result<(ClientId, mpsc::Receiver<Arc<str>>)> {
        let (tx, rx) = mpsc::channel(CLIENT_QUEUE);
        let (reply, id) = oneshot::channel();

        self.commands
            .send(HubCommand::Register { tx, reply })
            .map_err(|_| Error::Client("broadcast hub has shut down".to_string()))?;
        let id = id
            .await
            .map_err(|_| Error::Client("broadcast hub has shut down".to_string()))?;

        Ok((id, rx))
    }

    /// Remove a client (no-op if already gone)
    pub fn unregister_client(&self, id: ClientId) {
        let _ = self.commands.send(HubCommand::Unregister { id });
    }

    /// Send `message` to every connected client
    ///
    /// Serializes once on the calling thread and returns immediately.
    /// Clients that cannot take the frame are dropped.
    pub fn broadcast(&self, message: &WsOutgoing) {
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize broadcast");
                return;
            }
        };

        if self
            .commands
            .send(HubCommand::Broadcast { text: text.into() })
            .is_err()
        {
            tracing::debug!("broadcast hub has shut down, dropping message");
        }
    }

    /// Number of connected clients
    pub async fn client_count(&self) -> usize {
        let (reply, count) = oneshot::channel();
        if self.commands.send(HubCommand::Count { reply }).is_err() {
            return 0;
        }
        count.await.unwrap_or(0)
    }

    /// Register the click handler (last registration wins)
    pub fn set_click_handler<F>(&self, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut slot = self
            .click_handler
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = Some(Arc::new(handler));
        tracing::debug!("click handler registered");
    }

    /// Run the click handler on the blocking pool
    ///
    /// Never waits for the handler, so socket reads keep flowing.
    pub fn dispatch_click(&self) {
        let handler = self
            .click_handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        match handler {
            Some(handler) => {
                tokio::task::spawn_blocking(move || handler());
            }
            None => tracing::debug!("click received with no handler registered"),
        }
    }
}

async fn run_hub(mut commands: mpsc::UnboundedReceiver<HubCommand>) {
    let mut clients: HashMap<ClientId, mpsc::Sender<Arc<str>>> = HashMap::new();
    let mut next_id: ClientId = 1;

    while let Some(command) = commands.recv().await {
        match command {
            HubCommand::Register { tx, reply } => {
                let id = next_id;
                next_id += 1;

                let greeting = WsOutgoing::Connected {
                    message: CONNECTED_MESSAGE.to_string(),
                };
                if let Ok(text) = serde_json::to_string(&greeting) {
                    let _ = tx.try_send(text.into());
                }

                clients.insert(id, tx);
                tracing::info!(client = id, total = clients.len(), "client connected");
                let _ = reply.send(id);
            }
            HubCommand::Unregister { id } => {
                if clients.remove(&id).is_some() {
                    tracing::info!(client = id, total = clients.len(), "client disconnected");
                }
            }
            HubCommand::Broadcast { text } => {
                clients.retain(|id, tx| match tx.try_send(Arc::clone(&text)) {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!(client = id, error = %e, "dropping client after failed send");
                        false
                    }
                });
            }
            HubCommand::Count { reply } => {
                let _ = reply.send(clients.len());
            }
        }
    }

    tracing::debug!("broadcast hub stopped");
}
