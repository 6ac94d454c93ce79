//! `vigil-middleware` – moves frames in and notifications out.
//!
//! Carries data between the publishers, the pipeline and downstream clients
//! without interpreting it.
//!
//! # Modules
//!
//! - [`bus`] – [`NotificationBus`]: lane-based broadcast of pipeline
//!   notifications.
//! - [`source`] – the [`FrameSource`][source::FrameSource] trait with ZeroMQ
//!   and in-memory implementations.
//! - [`frame`] – two-part `[topic, payload]` frames.
//! - [`subscriber`] – [`TransportSubscriber`]: connection state machine,
//!   per-topic health and heartbeats.
//! - [`bridge`] – [`NotificationBridge`]: WebSocket fan-out of notifications
//!   plus capability control commands.

pub mod bridge;
pub mod bus;
pub mod error;
pub mod frame;
pub mod source;
pub mod subscriber;

pub use bridge::{ControlCommand, ControlReply, NotificationBridge};
pub use bus::{Lane, NotificationBus, NotificationStream};
pub use error::TransportError;
pub use frame::Frame;
pub use source::{FrameSource, MemoryPublisher, SourceFactory, ZmqFrameSource};
pub use subscriber::{FrameHandler, FrameOutcome, TransportConfig, TransportSubscriber};
