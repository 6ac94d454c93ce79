//! `vigil-runtime` – wires the pipeline together.
//!
//! # Modules
//!
//! - [`orchestrator`] – [`Orchestrator`][orchestrator::Orchestrator]: routes
//!   normalized records to their family's signal, keeps processing counters,
//!   computes system health and publishes notifications.
//! - [`pipeline`] – [`IngestPipeline`][pipeline::IngestPipeline]: the
//!   transport's frame handler, decode then route.
//! - [`context`] – [`AppContext`][context::AppContext]: builds every
//!   component once and registers the controllable ones with the
//!   capability registry.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: `tracing`
//!   subscriber with optional OTLP export.
//!
//! # Data flow
//!
//! ```text
//! TransportSubscriber ─▶ IngestPipeline ─▶ TopicDecoder ─▶ Orchestrator ─▶ Signal
//!                                                              │
//!                                                              ▼
//!                                                       NotificationBus ─▶ NotificationBridge
//! ```

pub mod context;
pub mod orchestrator;
pub mod pipeline;
pub mod telemetry;

pub use context::{AppContext, PipelineConfig, SystemStatus};
pub use orchestrator::{Orchestrator, ProcessingStats, Routed};
pub use pipeline::IngestPipeline;
pub use telemetry::{TracerProviderGuard, init_tracing};
