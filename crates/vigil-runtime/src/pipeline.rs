//! [`IngestPipeline`] – decode then route, as the subscriber's frame handler.

use std::sync::Arc;

use tracing::debug;
use vigil_middleware::{FrameHandler, FrameOutcome};
use vigil_perception::TopicDecoder;
use vigil_types::DecodeError;

use crate::orchestrator::Orchestrator;

pub struct IngestPipeline {
    decoder: Arc<TopicDecoder>,
    orchestrator: Arc<Orchestrator>,
}

impl IngestPipeline {
    pub fn new(decoder: Arc<TopicDecoder>, orchestrator: Arc<Orchestrator>) -> Self {
        Self { decoder, orchestrator }
    }
}

impl FrameHandler for IngestPipeline {
    fn handle(&self, topic: &str, payload: &[u8]) -> FrameOutcome {
        let record = match self.decoder.decode(topic, payload) {
            Ok(record) => record,
            Err(DecodeError::SignalDisabled(_)) => return FrameOutcome::Filtered,
            Err(err) => {
                debug!(%topic, error = %err, "decode failed");
                return FrameOutcome::Rejected(err.to_string());
            }
        };
        match self.orchestrator.route(&record) {
            Ok(_) => FrameOutcome::Processed,
            Err(err) => FrameOutcome::Rejected(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;
    use vigil_middleware::{MemoryPublisher, NotificationBus, TransportConfig, TransportSubscriber};
    use vigil_perception::{RawRecord, encode_record};
    use vigil_signals::SignalsConfig;
    use vigil_types::{ConnectionState, DataType, SignalControl, SignalType};

    fn ppi(ts: f64, interval: f64) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        Ok(encode_record(&RawRecord::new(ts, &["ppi"], vec![vec![json!(interval)]]))?)
    }

    fn pipeline() -> (IngestPipeline, Arc<TopicDecoder>, Arc<Orchestrator>) {
        let decoder = Arc::new(TopicDecoder::default());
        let orchestrator = Arc::new(Orchestrator::new(
            &SignalsConfig::default(),
            Arc::new(NotificationBus::default()),
        ));
        (IngestPipeline::new(decoder.clone(), orchestrator.clone()), decoder, orchestrator)
    }

    #[test]
    fn outcomes() -> Result<(), Box<dyn std::error::Error>> {
        let (pipeline, decoder, orchestrator) = pipeline();
        assert_eq!(pipeline.handle("cardiac/ppi", &ppi(1.0, 800.0)?), FrameOutcome::Processed);
        let latest = orchestrator.with_signal(SignalType::Cardiac, |s| {
            s.latest(DataType::Rate).and_then(|p| p.value.as_scalar())
        });
        assert_eq!(latest, Some(Some(75.0)));

        assert!(matches!(pipeline.handle("cardiac/ppi", b"junk"), FrameOutcome::Rejected(_)));
        assert!(matches!(pipeline.handle("lidar/scan", &ppi(1.0, 800.0)?), FrameOutcome::Rejected(_)));

        decoder.disable_signal("cardiac/ppi")?;
        assert_eq!(pipeline.handle("cardiac/ppi", &ppi(2.0, 800.0)?), FrameOutcome::Filtered);
        assert_eq!(orchestrator.stats().processed, 1);
        Ok(())
    }

    async fn eventually(mut cond: impl FnMut() -> bool) -> Result<(), Box<dyn std::error::Error>> {
        for _ in 0..200 {
            if cond() {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        Err("condition not reached in time".into())
    }

    #[tokio::test]
    async fn disabling_a_topic_at_the_subscriber_filters_the_next_frame() -> Result<(), Box<dyn std::error::Error>> {
        let (pipeline, _, orchestrator) = pipeline();
        let publisher = MemoryPublisher::new(64);
        let subscriber = TransportSubscriber::new(
            TransportConfig {
                endpoints: vec!["memory".into()],
                topics: vec!["cardiac/ppi".into()],
                ..TransportConfig::default()
            },
            publisher.factory(),
            Arc::new(pipeline),
            Arc::new(NotificationBus::default()),
        );
        subscriber.start()?;
        eventually(|| subscriber.connection_state() == ConnectionState::Connected).await?;

        publisher.publish("cardiac/ppi", ppi(1.0, 800.0)?);
        eventually(|| orchestrator.stats().processed == 1).await?;

        subscriber.disable_signal("cardiac/ppi")?;
        publisher.publish("cardiac/ppi", ppi(2.0, 400.0)?);
        eventually(|| subscriber.topic_stats("cardiac/ppi").is_some_and(|s| s.filtered == 1)).await?;
        assert_eq!(orchestrator.stats().processed, 1);

        subscriber.enable_signal("cardiac/ppi")?;
        publisher.publish("cardiac/ppi", ppi(3.0, 400.0)?);
        eventually(|| orchestrator.stats().processed == 2).await?;
        let open = orchestrator.open_anomalies();
        assert!(!open[&SignalType::Cardiac].is_empty());

        subscriber.stop().await;
        Ok(())
    }
}
