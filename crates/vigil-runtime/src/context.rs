//! [`AppContext`] – every long-lived component, wired once at startup.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;
use vigil_kernel::CapabilityRegistry;
use vigil_middleware::{
    MemoryPublisher, NotificationBridge, NotificationBus, SourceFactory, TransportConfig, TransportSubscriber,
    ZmqFrameSource,
};
use vigil_perception::{DecoderConfig, Topic, TopicDecoder};
use vigil_signals::SignalsConfig;
use vigil_types::{HealthReport, SignalControl, TransportHeartbeat};

use crate::orchestrator::{Orchestrator, ProcessingStats};
use crate::pipeline::IngestPipeline;

/// Pipeline sections of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub transport: TransportConfig,
    pub decoder: DecoderConfig,
    pub signals: SignalsConfig,
}

/// Combined view for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub transport: TransportHeartbeat,
    pub pipeline: HealthReport,
    pub stats: ProcessingStats,
}

pub struct AppContext {
    pub bus: Arc<NotificationBus>,
    pub decoder: Arc<TopicDecoder>,
    pub orchestrator: Arc<Orchestrator>,
    pub subscriber: Arc<TransportSubscriber>,
    pub registry: Arc<CapabilityRegistry>,
}

impl AppContext {
    /// Wire the pipeline over ZeroMQ.
    pub fn new(config: PipelineConfig) -> Self {
        Self::with_source(config, ZmqFrameSource::factory())
    }

    /// Wire the pipeline over an in-process publisher queueing up to
    /// `transport.receive_hwm` frames per subscriber.
    pub fn in_memory(config: PipelineConfig) -> (Self, MemoryPublisher) {
        let publisher = MemoryPublisher::new(config.transport.receive_hwm);
        let ctx = Self::with_source(config, publisher.factory());
        (ctx, publisher)
    }

    pub fn with_source(mut config: PipelineConfig, factory: SourceFactory) -> Self {
        if config.transport.topics.is_empty() {
            config.transport.topics = Topic::names().into_iter().map(String::from).collect();
        }

        let bus = Arc::new(NotificationBus::default());
        let decoder = Arc::new(TopicDecoder::new(config.decoder));
        let orchestrator = Arc::new(Orchestrator::new(&config.signals, bus.clone()));
        let pipeline = Arc::new(IngestPipeline::new(decoder.clone(), orchestrator.clone()));
        let subscriber = Arc::new(TransportSubscriber::new(config.transport, factory, pipeline, bus.clone()));

        let mut registry = CapabilityRegistry::new();
        registry.register(subscriber.clone() as Arc<dyn SignalControl>);
        registry.register(decoder.clone() as Arc<dyn SignalControl>);
        registry.register(orchestrator.clone() as Arc<dyn SignalControl>);
        info!(components = ?registry.components(), "capability registry ready");

        Self {
            bus,
            decoder,
            orchestrator,
            subscriber,
            registry: Arc::new(registry),
        }
    }

    pub fn bridge(&self) -> NotificationBridge {
        NotificationBridge::new(self.bus.clone(), self.registry.clone())
    }

    pub fn status(&self) -> SystemStatus {
        SystemStatus {
            transport: self.subscriber.status(),
            pipeline: self.orchestrator.system_health(),
            stats: self.orchestrator.stats(),
        }
    }
}
