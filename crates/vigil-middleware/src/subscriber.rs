//! [`TransportSubscriber`] – the ingestion edge of the pipeline.
//!
//! Holds a subscribe connection to the publishers, feeds every
//! `[topic, payload]` frame to a [`FrameHandler`] and keeps per-topic and
//! connection health.  Two tasks run while started:
//!
//! | Task | Job |
//! |---|---|
//! | message loop | connect, subscribe, receive, reconnect, apply topic commands |
//! | heartbeat loop | publish a `Heartbeat` notification every interval |
//!
//! # State machine
//!
//! ```text
//! stopped ─start─▶ connecting ─ok─▶ connected ─socket error─▶ reconnecting
//!                      │                ▲                        │    │
//!                      └──── failed ────┼──────────▶─────────────┘    │
//!                                       └──────────── ok ─────────────┘
//! reconnecting ─attempts exhausted─▶ error   (terminal until start())
//! ```

use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::Utc;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use vigil_kernel::{GLOBAL_HEARTBEAT, Liveness, Watchdog};
use vigil_types::{
    ComponentState, ComponentStatus, ConnectionState, HealthReport, Notification, NotificationPayload,
    SignalControl, SignalState, SignalSwitchboard, TopicStats, TransportHeartbeat, VigilError,
};

use crate::bus::NotificationBus;
use crate::error::TransportError;
use crate::frame::Frame;
use crate::source::{FrameSource, SourceEvent, SourceFactory};

pub const COMPONENT_NAME: &str = "transport";
const NOTIFICATION_SOURCE: &str = "vigil-middleware::subscriber";

/// A topic is unhealthy above this share of rejected frames.
const TOPIC_REJECTION_LIMIT: f64 = 0.3;
/// Overall rejection share that degrades health to warning.
const OVERALL_REJECTION_LIMIT: f64 = 0.1;
/// Grace period for the message loop to unsubscribe on stop.
const STOP_GRACE: Duration = Duration::from_secs(2);

/// `[transport]` section of the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub endpoints: Vec<String>,
    /// Empty means the full topic catalog.
    pub topics: Vec<String>,
    pub message_timeout_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub reconnect_delay_ms: u64,
    pub max_reconnect_attempts: u32,
    pub processing_warn_ms: u64,
    /// Frames queued per connection before the oldest are dropped.
    ///
    /// Applies to the in-memory source only.  The ZeroMQ socket exposes no
    /// high-water-mark option and keeps the library default.
    pub receive_hwm: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoints: vec!["tcp://127.0.0.1:5555".to_string()],
            topics: Vec::new(),
            message_timeout_ms: 5_000,
            heartbeat_interval_ms: 5_000,
            reconnect_delay_ms: 1_000,
            max_reconnect_attempts: 5,
            processing_warn_ms: 100,
            receive_hwm: 1_000,
        }
    }
}

impl TransportConfig {
    pub fn message_timeout(&self) -> Duration {
        Duration::from_millis(self.message_timeout_ms.max(1))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms.max(1))
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn processing_warn_threshold(&self) -> Duration {
        Duration::from_millis(self.processing_warn_ms)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Frame handling contract
// ────────────────────────────────────────────────────────────────────────────

/// What became of a frame handed to a [`FrameHandler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    Processed,
    Rejected(String),
    /// Dropped by a downstream control switch.
    Filtered,
}

/// Synchronous downstream of the subscriber (decode and route).
///
/// Runs on the message loop, so it must not block for long; slow calls are
/// logged.
pub trait FrameHandler: Send + Sync {
    fn handle(&self, topic: &str, payload: &[u8]) -> FrameOutcome;
}

// ────────────────────────────────────────────────────────────────────────────
// Shared state
// ────────────────────────────────────────────────────────────────────────────

struct TransportState {
    connection: ConnectionState,
    started_at: Option<Instant>,
    /// Subscribed topics and their counters.
    topics: BTreeMap<String, TopicStats>,
    watchdog: Watchdog,
    malformed: u64,
    dropped: u64,
    reconnect_attempts: u32,
    last_error: Option<String>,
}

impl TransportState {
    fn topic_healthy(&self, topic: &str, stats: &TopicStats) -> bool {
        self.watchdog.liveness(topic) == Liveness::Alive && stats.rejection_rate() <= TOPIC_REJECTION_LIMIT
    }

    fn health(&self) -> HealthReport {
        let mut issues = Vec::new();
        let mut warnings = Vec::new();

        if self.connection == ConnectionState::Error {
            issues.push(format!(
                "transport in error state: {}",
                self.last_error.as_deref().unwrap_or("unknown")
            ));
        }

        let unhealthy: Vec<&str> = self
            .topics
            .iter()
            .filter(|(topic, stats)| !self.topic_healthy(topic, stats))
            .map(|(topic, _)| topic.as_str())
            .collect();
        if !self.topics.is_empty() && unhealthy.len() == self.topics.len() {
            issues.push("all subscribed topics are unhealthy".to_string());
        } else if !unhealthy.is_empty() {
            warnings.push(format!("unhealthy topics: {}", unhealthy.join(", ")));
        }

        if self.watchdog.liveness(GLOBAL_HEARTBEAT) == Liveness::Silent {
            warnings.push("heartbeat missed".to_string());
        }
        if matches!(self.connection, ConnectionState::Connecting | ConnectionState::Reconnecting) {
            warnings.push(format!("transport is {:?}", self.connection).to_lowercase());
        }

        let (processed, rejected) = self
            .topics
            .values()
            .fold((0, 0), |(p, r), s| (p + s.processed, r + s.rejected));
        if processed + rejected > 0 {
            let rate = rejected as f64 / (processed + rejected) as f64;
            if rate > OVERALL_REJECTION_LIMIT {
                warnings.push(format!("overall rejection rate {:.0}%", rate * 100.0));
            }
        }

        HealthReport::evaluate(issues, warnings)
    }
}

struct Shared {
    config: TransportConfig,
    state: Mutex<TransportState>,
    switches: SignalSwitchboard,
    slow_log: DefaultDirectRateLimiter,
    reject_log: DefaultDirectRateLimiter,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, TransportState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn topic_deadline(&self) -> Duration {
        self.config.message_timeout() * 2
    }

    fn set_connection(&self, connection: ConnectionState) {
        self.state().connection = connection;
    }

    fn on_connected(&self) {
        let mut state = self.state();
        state.connection = ConnectionState::Connected;
        state.reconnect_attempts = 0;
        state.last_error = None;
        state.watchdog.rearm();
        info!(topics = state.topics.len(), "transport connected");
    }

    /// Record a failed attempt or lost connection.  Returns whether another
    /// attempt is allowed.
    fn on_connection_lost(&self, err: &TransportError) -> bool {
        let mut state = self.state();
        state.reconnect_attempts += 1;
        state.last_error = Some(err.to_string());
        if state.reconnect_attempts > self.config.max_reconnect_attempts {
            state.connection = ConnectionState::Error;
            error!(error = %err, attempts = state.reconnect_attempts - 1, "giving up on transport");
            false
        } else {
            state.connection = ConnectionState::Reconnecting;
            warn!(
                error = %err,
                attempt = state.reconnect_attempts,
                max = self.config.max_reconnect_attempts,
                "transport connection lost, reconnecting"
            );
            true
        }
    }

    fn subscribed(&self) -> Vec<String> {
        self.state().topics.keys().cloned().collect()
    }

    fn process(&self, handler: &dyn FrameHandler, parts: Vec<Vec<u8>>) {
        let frame = match Frame::from_parts(parts) {
            Ok(frame) => frame,
            Err(err) => {
                self.state().malformed += 1;
                debug!(error = %err, "dropping malformed frame");
                return;
            }
        };

        {
            let mut guard = self.state();
            let state = &mut *guard;
            // Prefix subscriptions can deliver neighbouring topics.
            let Some(stats) = state.topics.get_mut(&frame.topic) else {
                return;
            };
            stats.received += 1;
            stats.last_message_at = Some(Utc::now());
            state.watchdog.heartbeat(&frame.topic);
            if !self.switches.is_active(&frame.topic) {
                stats.filtered += 1;
                return;
            }
        }

        debug!(topic = %frame.topic, bytes = frame.payload.len(), "frame received");
        let started = Instant::now();
        let outcome = handler.handle(&frame.topic, &frame.payload);
        let elapsed = started.elapsed();
        if elapsed > self.config.processing_warn_threshold() && self.slow_log.check().is_ok() {
            warn!(topic = %frame.topic, elapsed_ms = elapsed.as_millis() as u64, "slow frame processing");
        }

        let mut state = self.state();
        let Some(stats) = state.topics.get_mut(&frame.topic) else {
            return;
        };
        match outcome {
            FrameOutcome::Processed => stats.processed += 1,
            FrameOutcome::Filtered => stats.filtered += 1,
            FrameOutcome::Rejected(reason) => {
                stats.rejected += 1;
                if self.reject_log.check().is_ok() {
                    warn!(topic = %frame.topic, %reason, "frame rejected");
                }
            }
        }
    }

    fn heartbeat(&self) -> TransportHeartbeat {
        let mut state = self.state();
        state.watchdog.heartbeat(GLOBAL_HEARTBEAT);
        self.snapshot(&mut state)
    }

    fn snapshot(&self, state: &mut TransportState) -> TransportHeartbeat {
        let flags: Vec<(String, bool)> = state
            .topics
            .iter()
            .map(|(topic, stats)| (topic.clone(), state.topic_healthy(topic, stats)))
            .collect();
        for (topic, healthy) in flags {
            if let Some(stats) = state.topics.get_mut(&topic) {
                stats.healthy = healthy;
            }
        }
        TransportHeartbeat {
            state: state.connection,
            uptime_secs: state.started_at.map_or(0.0, |t| t.elapsed().as_secs_f64()),
            per_topic_stats: state.topics.clone(),
            health: state.health(),
            malformed_frames: state.malformed,
            dropped_frames: state.dropped,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// TransportSubscriber
// ────────────────────────────────────────────────────────────────────────────

enum Command {
    Add(String),
    Remove(String),
    Shutdown,
}

struct Running {
    commands: mpsc::UnboundedSender<Command>,
    message_task: JoinHandle<()>,
    heartbeat_task: JoinHandle<()>,
}

/// Subscribe-side transport endpoint.
///
/// Also a [`SignalControl`] component: a disabled topic stays subscribed but
/// its frames are counted as filtered and never reach the handler.
pub struct TransportSubscriber {
    shared: Arc<Shared>,
    factory: SourceFactory,
    handler: Arc<dyn FrameHandler>,
    bus: Arc<NotificationBus>,
    running: Mutex<Option<Running>>,
}

impl TransportSubscriber {
    pub fn new(
        config: TransportConfig,
        factory: SourceFactory,
        handler: Arc<dyn FrameHandler>,
        bus: Arc<NotificationBus>,
    ) -> Self {
        let mut watchdog = Watchdog::new();
        let mut topics = BTreeMap::new();
        for topic in &config.topics {
            watchdog.watch(topic, config.message_timeout() * 2);
            topics.insert(topic.clone(), TopicStats::default());
        }
        watchdog.watch(GLOBAL_HEARTBEAT, config.heartbeat_interval() * 2);

        let one_per_second = Quota::per_second(NonZeroU32::MIN);
        let shared = Shared {
            switches: SignalSwitchboard::new(config.topics.iter().cloned()),
            state: Mutex::new(TransportState {
                connection: ConnectionState::Stopped,
                started_at: None,
                topics,
                watchdog,
                malformed: 0,
                dropped: 0,
                reconnect_attempts: 0,
                last_error: None,
            }),
            slow_log: RateLimiter::direct(one_per_second),
            reject_log: RateLimiter::direct(one_per_second),
            config,
        };
        Self {
            shared: Arc::new(shared),
            factory,
            handler,
            bus,
            running: Mutex::new(None),
        }
    }

    fn running(&self) -> MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Spawn the message and heartbeat loops.
    ///
    /// Connection happens in the background; watch
    /// [`connection_state`][Self::connection_state] for the outcome.  A
    /// no-op while the loops are alive, a restart after the terminal error
    /// state.  Must be called inside a Tokio runtime.
    pub fn start(&self) -> Result<(), VigilError> {
        if self.shared.config.endpoints.is_empty() {
            return Err(VigilError::ConnectionFailure("no endpoints configured".into()));
        }

        let mut running = self.running();
        if let Some(current) = running.as_ref() {
            if !current.message_task.is_finished() {
                return Ok(());
            }
            current.heartbeat_task.abort();
        }

        {
            let mut state = self.shared.state();
            state.connection = ConnectionState::Connecting;
            state.started_at = Some(Instant::now());
            state.reconnect_attempts = 0;
            state.last_error = None;
            state.watchdog.rearm();
        }

        let (commands, rx) = mpsc::unbounded_channel();
        let message_task = tokio::spawn(message_loop(
            self.shared.clone(),
            self.factory.clone(),
            self.handler.clone(),
            rx,
        ));
        let heartbeat_task = tokio::spawn(heartbeat_loop(self.shared.clone(), self.bus.clone()));
        *running = Some(Running {
            commands,
            message_task,
            heartbeat_task,
        });
        info!(endpoints = ?self.shared.config.endpoints, "transport subscriber started");
        Ok(())
    }

    /// Unsubscribe, close the connection and stop both loops.
    pub async fn stop(&self) {
        let Some(running) = self.running().take() else {
            self.shared.set_connection(ConnectionState::Stopped);
            return;
        };
        running.heartbeat_task.abort();
        let _ = running.commands.send(Command::Shutdown);

        let mut message_task = running.message_task;
        if tokio::time::timeout(STOP_GRACE, &mut message_task).await.is_err() {
            warn!("message loop did not stop in time, aborting");
            message_task.abort();
        }
        self.shared.set_connection(ConnectionState::Stopped);
        info!("transport subscriber stopped");
    }

    /// Subscribe to `topic`, live if running.  Returns `false` if it was
    /// already subscribed.
    pub fn add_topic(&self, topic: &str) -> bool {
        {
            let mut state = self.shared.state();
            if state.topics.contains_key(topic) {
                return false;
            }
            state.topics.insert(topic.to_string(), TopicStats::default());
            state.watchdog.watch(topic, self.shared.topic_deadline());
        }
        self.shared.switches.register(topic);
        self.send(Command::Add(topic.to_string()));
        info!(%topic, "topic added");
        true
    }

    /// Unsubscribe from `topic`.  Returns `false` if it was not subscribed.
    pub fn remove_topic(&self, topic: &str) -> bool {
        {
            let mut state = self.shared.state();
            if state.topics.remove(topic).is_none() {
                return false;
            }
            state.watchdog.unwatch(topic);
        }
        self.shared.switches.unregister(topic);
        self.send(Command::Remove(topic.to_string()));
        info!(%topic, "topic removed");
        true
    }

    fn send(&self, command: Command) {
        if let Some(running) = self.running().as_ref() {
            // A closed channel means the loop already ended; the topic set
            // is picked up by the next start().
            let _ = running.commands.send(command);
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.state().connection
    }

    pub fn subscribed_topics(&self) -> Vec<String> {
        self.shared.subscribed()
    }

    pub fn topic_stats(&self, topic: &str) -> Option<TopicStats> {
        self.shared.state().topics.get(topic).cloned()
    }

    pub fn health(&self) -> HealthReport {
        self.shared.state().health()
    }

    /// Current heartbeat payload without feeding the watchdog.
    pub fn status(&self) -> TransportHeartbeat {
        let mut state = self.shared.state();
        self.shared.snapshot(&mut state)
    }
}

impl SignalControl for TransportSubscriber {
    fn component_name(&self) -> &str {
        COMPONENT_NAME
    }

    fn available_signals(&self) -> Vec<String> {
        self.shared.switches.available()
    }

    fn active_signals(&self) -> Vec<String> {
        self.shared.switches.active()
    }

    fn enable_signal(&self, signal: &str) -> Result<(), VigilError> {
        if self.shared.switches.enable(COMPONENT_NAME, signal)? {
            info!(%signal, "topic enabled on transport");
        }
        Ok(())
    }

    fn disable_signal(&self, signal: &str) -> Result<(), VigilError> {
        if self.shared.switches.disable(COMPONENT_NAME, signal)? {
            info!(%signal, "topic disabled on transport");
        }
        Ok(())
    }

    fn signal_state(&self, signal: &str) -> SignalState {
        if self.connection_state() == ConnectionState::Error && self.shared.switches.is_active(signal) {
            return SignalState::Error;
        }
        self.shared.switches.state(signal)
    }

    fn component_state(&self) -> ComponentState {
        let state = self.shared.state();
        let status = match state.connection {
            ConnectionState::Connected => ComponentStatus::Running,
            ConnectionState::Connecting | ConnectionState::Reconnecting => ComponentStatus::Idle,
            ConnectionState::Stopped => ComponentStatus::Stopped,
            ConnectionState::Error => ComponentStatus::Error,
        };
        ComponentState {
            component: COMPONENT_NAME.to_string(),
            status,
            available: self.shared.switches.available(),
            active: self.shared.switches.active(),
            detail: state.last_error.clone(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Loops
// ────────────────────────────────────────────────────────────────────────────

enum LoopExit {
    Shutdown,
    Lost(TransportError),
}

async fn connect(source: &mut dyn FrameSource, shared: &Shared) -> Result<(), TransportError> {
    source.connect(&shared.config.endpoints).await?;
    for topic in shared.subscribed() {
        source.subscribe(&topic).await?;
    }
    Ok(())
}

async fn message_loop(
    shared: Arc<Shared>,
    factory: SourceFactory,
    handler: Arc<dyn FrameHandler>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    loop {
        let mut source = factory();
        let exit = match connect(source.as_mut(), &shared).await {
            Ok(()) => {
                shared.on_connected();
                receive(source.as_mut(), &shared, handler.as_ref(), &mut commands).await
            }
            Err(err) => LoopExit::Lost(err),
        };

        match exit {
            LoopExit::Shutdown => {
                for topic in shared.subscribed() {
                    if let Err(err) = source.unsubscribe(&topic).await {
                        debug!(%topic, error = %err, "unsubscribe failed during shutdown");
                    }
                }
                source.close().await;
                shared.set_connection(ConnectionState::Stopped);
                return;
            }
            LoopExit::Lost(err) => {
                source.close().await;
                if !shared.on_connection_lost(&err) {
                    return;
                }
                if shutdown_during(&mut commands, shared.config.reconnect_delay()).await {
                    shared.set_connection(ConnectionState::Stopped);
                    return;
                }
            }
        }
    }
}

async fn receive(
    source: &mut dyn FrameSource,
    shared: &Shared,
    handler: &dyn FrameHandler,
    commands: &mut mpsc::UnboundedReceiver<Command>,
) -> LoopExit {
    let timeout = shared.config.message_timeout();
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Add(topic)) => {
                    if let Err(err) = source.subscribe(&topic).await {
                        return LoopExit::Lost(err);
                    }
                }
                Some(Command::Remove(topic)) => {
                    if let Err(err) = source.unsubscribe(&topic).await {
                        return LoopExit::Lost(err);
                    }
                }
                Some(Command::Shutdown) | None => return LoopExit::Shutdown,
            },
            received = tokio::time::timeout(timeout, source.recv()) => match received {
                // Silence is reported by the watchdog, not treated as a failure.
                Err(_) => debug!(timeout_ms = timeout.as_millis() as u64, "no frames within timeout"),
                Ok(Ok(SourceEvent::Parts(parts))) => shared.process(handler, parts),
                Ok(Ok(SourceEvent::Dropped(n))) => {
                    shared.state().dropped += n;
                    warn!(dropped = n, "receive queue overflowed");
                }
                Ok(Err(err)) => return LoopExit::Lost(err),
            },
        }
    }
}

/// Sleep for `delay`, returning early with `true` if shutdown is requested.
/// Topic commands received meanwhile are already reflected in the shared
/// topic set.
async fn shutdown_during(commands: &mut mpsc::UnboundedReceiver<Command>, delay: Duration) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            command = commands.recv() => match command {
                Some(Command::Shutdown) | None => return true,
                Some(_) => {}
            },
        }
    }
}

async fn heartbeat_loop(shared: Arc<Shared>, bus: Arc<NotificationBus>) {
    let mut ticker = tokio::time::interval(shared.config.heartbeat_interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let heartbeat = shared.heartbeat();
        debug!(state = ?heartbeat.state, health = ?heartbeat.health.status, "transport heartbeat");
        bus.publish(Notification::new(NOTIFICATION_SOURCE, NotificationPayload::Heartbeat(heartbeat)));
    }
}
