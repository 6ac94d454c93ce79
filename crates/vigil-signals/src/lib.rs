//! `vigil-signals` – Signal history and anomaly detection.
//!
//! # Modules
//!
//! - [`buffer`] – [`CircularBuffer`][buffer::CircularBuffer]: fixed-capacity
//!   history returning points in insertion order.
//! - [`tracker`] – [`AnomalyTracker`][tracker::AnomalyTracker]: bounded,
//!   de-duplicated list of open anomalies reconciled on every pass.
//! - [`families`] – the [`Detector`][families::Detector] trait and the
//!   cardiac, EEG, motion, camera and vehicle rule sets.
//! - [`signal`] – [`Signal`][signal::Signal]: validate → store → detect for
//!   one family, plus the `[signals]` configuration.
//! - [`stats`] – window statistics shared by the detectors.
//! - [`error`] – [`ValidationError`][error::ValidationError].

pub mod buffer;
pub mod error;
pub mod families;
pub mod signal;
pub mod stats;
pub mod tracker;

pub use buffer::CircularBuffer;
pub use error::ValidationError;
pub use families::Detector;
pub use signal::{Signal, SignalsConfig};
pub use tracker::AnomalyTracker;
