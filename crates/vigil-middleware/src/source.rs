//! Where frames come from.
//!
//! The subscriber never talks to a socket directly.  It drives a
//! [`FrameSource`], built fresh by a [`SourceFactory`] for every connection
//! attempt.
//!
//! - [`ZmqFrameSource`] – ZeroMQ SUB socket connected to every configured
//!   endpoint.
//! - [`MemoryFrameSource`] – in-process source fed by a [`MemoryPublisher`];
//!   bounded, drops the oldest frames past its high-water mark.
//!
//! Subscriptions are prefix filters on both sources, as on a SUB socket.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;
use zeromq::{Socket, SocketRecv, SubSocket};

use crate::error::TransportError;

/// One receive result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    /// Raw message parts, not yet checked for shape.
    Parts(Vec<Vec<u8>>),
    /// Frames lost to the high-water mark since the last receive.
    Dropped(u64),
}

/// Contract for a subscribe-side transport connection.
///
/// * `connect` – opens the connection to every endpoint; any failure fails
///   the whole attempt.
/// * `recv` – waits for the next message; an error ends the connection.
/// * `close` – releases the connection; never fails.
#[async_trait]
pub trait FrameSource: Send {
    async fn connect(&mut self, endpoints: &[String]) -> Result<(), TransportError>;

    async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError>;

    async fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError>;

    async fn recv(&mut self) -> Result<SourceEvent, TransportError>;

    async fn close(&mut self);
}

/// Builds a fresh source per connection attempt.
pub type SourceFactory = Arc<dyn Fn() -> Box<dyn FrameSource> + Send + Sync>;

// ────────────────────────────────────────────────────────────────────────────
// ZeroMQ
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct ZmqFrameSource {
    socket: Option<SubSocket>,
}

impl ZmqFrameSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn factory() -> SourceFactory {
        Arc::new(|| Box::new(ZmqFrameSource::new()) as Box<dyn FrameSource>)
    }

    fn socket(&mut self) -> Result<&mut SubSocket, TransportError> {
        self.socket
            .as_mut()
            .ok_or_else(|| TransportError::Socket("not connected".into()))
    }
}

#[async_trait]
impl FrameSource for ZmqFrameSource {
    async fn connect(&mut self, endpoints: &[String]) -> Result<(), TransportError> {
        let mut socket = SubSocket::new();
        for endpoint in endpoints {
            socket.connect(endpoint).await.map_err(|e| TransportError::Connect {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?;
            debug!(%endpoint, "SUB socket connected");
        }
        self.socket = Some(socket);
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.socket()?
            .subscribe(topic)
            .await
            .map_err(|e| TransportError::Socket(e.to_string()))
    }

    async fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.socket()?
            .unsubscribe(topic)
            .await
            .map_err(|e| TransportError::Socket(e.to_string()))
    }

    async fn recv(&mut self) -> Result<SourceEvent, TransportError> {
        let message = self
            .socket()?
            .recv()
            .await
            .map_err(|e| TransportError::Socket(e.to_string()))?;
        let parts = (0..message.len())
            .filter_map(|i| message.get(i))
            .map(|part| part.to_vec())
            .collect();
        Ok(SourceEvent::Parts(parts))
    }

    async fn close(&mut self) {
        if let Some(socket) = self.socket.take() {
            for err in socket.close().await {
                debug!(error = %err, "error while closing SUB socket");
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// In-process
// ────────────────────────────────────────────────────────────────────────────

/// Publishing side of the in-process transport.  Clones share the queue.
///
/// ```
/// use vigil_middleware::source::{FrameSource, MemoryPublisher, SourceEvent};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let publisher = MemoryPublisher::new(16);
/// let mut source = publisher.source();
/// source.connect(&[]).await.unwrap();
/// source.subscribe("cardiac/").await.unwrap();
///
/// publisher.publish("eeg/raw", vec![1]);
/// publisher.publish("cardiac/ppi", vec![2]);
///
/// let event = source.recv().await.unwrap();
/// assert_eq!(event, SourceEvent::Parts(vec![b"cardiac/ppi".to_vec(), vec![2]]));
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct MemoryPublisher {
    sender: broadcast::Sender<Vec<Vec<u8>>>,
    accepting: Arc<AtomicBool>,
}

impl MemoryPublisher {
    /// `high_water_mark` frames are queued per connected source.
    pub fn new(high_water_mark: usize) -> Self {
        let (sender, _) = broadcast::channel(high_water_mark.max(1));
        Self {
            sender,
            accepting: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Send a well-formed two-part frame.  Returns the number of connected
    /// sources; frames published while nobody is connected are lost.
    pub fn publish(&self, topic: &str, payload: Vec<u8>) -> usize {
        self.publish_parts(vec![topic.as_bytes().to_vec(), payload])
    }

    /// Send arbitrary message parts.
    pub fn publish_parts(&self, parts: Vec<Vec<u8>>) -> usize {
        self.sender.send(parts).unwrap_or(0)
    }

    /// While `false`, every `connect` is refused.
    pub fn set_accepting(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::SeqCst);
    }

    pub fn source(&self) -> MemoryFrameSource {
        MemoryFrameSource {
            publisher: self.clone(),
            receiver: None,
            prefixes: Vec::new(),
        }
    }

    pub fn factory(&self) -> SourceFactory {
        let publisher = self.clone();
        Arc::new(move || Box::new(publisher.source()) as Box<dyn FrameSource>)
    }
}

pub struct MemoryFrameSource {
    publisher: MemoryPublisher,
    receiver: Option<broadcast::Receiver<Vec<Vec<u8>>>>,
    prefixes: Vec<String>,
}

impl MemoryFrameSource {
    fn wanted(&self, parts: &[Vec<u8>]) -> bool {
        match parts.first() {
            Some(topic) => self.prefixes.iter().any(|p| topic.starts_with(p.as_bytes())),
            // No topic part: let the subscriber count it as malformed.
            None => !self.prefixes.is_empty(),
        }
    }
}

#[async_trait]
impl FrameSource for MemoryFrameSource {
    async fn connect(&mut self, _endpoints: &[String]) -> Result<(), TransportError> {
        if !self.publisher.accepting.load(Ordering::SeqCst) {
            return Err(TransportError::Connect {
                endpoint: "memory".into(),
                reason: "publisher refused the connection".into(),
            });
        }
        self.receiver = Some(self.publisher.sender.subscribe());
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        if !self.prefixes.iter().any(|p| p == topic) {
            self.prefixes.push(topic.to_string());
        }
        Ok(())
    }

    async fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.prefixes.retain(|p| p != topic);
        Ok(())
    }

    async fn recv(&mut self) -> Result<SourceEvent, TransportError> {
        loop {
            let receiver = self
                .receiver
                .as_mut()
                .ok_or_else(|| TransportError::Socket("not connected".into()))?;
            match receiver.recv().await {
                Ok(parts) => {
                    if self.wanted(&parts) {
                        return Ok(SourceEvent::Parts(parts));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => return Ok(SourceEvent::Dropped(n)),
                Err(broadcast::error::RecvError::Closed) => return Err(TransportError::Closed),
            }
        }
    }

    async fn close(&mut self) {
        self.receiver = None;
        self.prefixes.clear();
    }
}
