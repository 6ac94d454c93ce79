//! WebSocket notification bridge.
//!
//! [`NotificationBridge`] serves every bus notification to each connected
//! client as one JSON text message, and accepts capability commands on the
//! same socket:
//!
//! ```json
//! {"op": "disable", "signal": "eeg/raw", "component": "transport"}
//! {"op": "enable",  "signal": "eeg/raw"}
//! {"op": "status"}
//! ```
//!
//! Without `component`, enable/disable fan out to every component serving
//! the signal.  Each command is answered with a [`ControlReply`].

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use vigil_kernel::{CapabilityRegistry, Target};
use vigil_types::{ComponentState, VigilError};

use crate::bus::NotificationBus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ControlCommand {
    Enable {
        signal: String,
        #[serde(default)]
        component: Option<String>,
    },
    Disable {
        signal: String,
        #[serde(default)]
        component: Option<String>,
    },
    Status,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlReply {
    Ack {
        op: String,
        signal: String,
        /// Components the change was applied to.
        components: Vec<String>,
    },
    Status {
        components: Vec<ComponentState>,
    },
    Error {
        message: String,
    },
}

#[derive(Clone)]
pub struct NotificationBridge {
    bus: Arc<NotificationBus>,
    registry: Arc<CapabilityRegistry>,
}

impl NotificationBridge {
    pub fn new(bus: Arc<NotificationBus>, registry: Arc<CapabilityRegistry>) -> Self {
        Self { bus, registry }
    }

    /// Apply one command to the registry.
    pub fn execute(&self, command: ControlCommand) -> ControlReply {
        let (op, signal, component, enable) = match command {
            ControlCommand::Status => {
                return ControlReply::Status {
                    components: self.registry.component_states(),
                };
            }
            ControlCommand::Enable { signal, component } => ("enable", signal, component, true),
            ControlCommand::Disable { signal, component } => ("disable", signal, component, false),
        };
        let target = component.map_or(Target::All, Target::Component);
        let result = if enable {
            self.registry.enable_signal(&target, &signal)
        } else {
            self.registry.disable_signal(&target, &signal)
        };
        match result {
            Ok(components) => {
                info!(%op, %signal, ?components, "control command applied");
                ControlReply::Ack {
                    op: op.to_string(),
                    signal,
                    components,
                }
            }
            Err(err) => {
                warn!(%op, %signal, error = %err, "control command failed");
                ControlReply::Error {
                    message: err.to_string(),
                }
            }
        }
    }

    /// Parse and execute a client text message.
    pub fn handle_text(&self, text: &str) -> ControlReply {
        match serde_json::from_str::<ControlCommand>(text) {
            Ok(command) => self.execute(command),
            Err(err) => ControlReply::Error {
                message: format!("invalid command: {err}"),
            },
        }
    }

    /// Bind `addr` and serve clients until the task is cancelled.
    pub async fn run(self, addr: SocketAddr) -> Result<(), VigilError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| VigilError::Channel(format!("bridge bind error on {addr}: {e}")))?;
        info!(%addr, "notification bridge listening");
        self.serve(listener).await;
        Ok(())
    }

    /// Serve clients on an already bound listener.
    pub async fn serve(self, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let bridge = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = bridge.handle_client(stream, peer).await {
                            error!(%peer, error = %e, "bridge client error");
                        }
                    });
                }
                Err(e) => error!(error = %e, "bridge accept error"),
            }
        }
    }

    async fn handle_client(&self, stream: TcpStream, peer: SocketAddr) -> Result<(), VigilError> {
        let ws = accept_async(stream)
            .await
            .map_err(|e| VigilError::Channel(format!("handshake from {peer}: {e}")))?;
        debug!(%peer, "bridge client connected");

        let (mut ws_tx, mut ws_rx) = ws.split();
        let mut notifications = self.bus.subscribe();

        loop {
            tokio::select! {
                notification = notifications.recv() => {
                    let Some(notification) = notification else { break };
                    let json = serde_json::to_string(&notification)
                        .map_err(|e| VigilError::Channel(e.to_string()))?;
                    if ws_tx.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                msg = ws_rx.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = self.handle_text(text.as_str());
                        let json = serde_json::to_string(&reply)
                            .map_err(|e| VigilError::Channel(e.to_string()))?;
                        if ws_tx.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                },
            }
        }
        debug!(%peer, "bridge client disconnected");
        Ok(())
    }
}
