//! [`Watchdog`] – liveness monitor for topics and periodic loops.
//!
//! The transport subscriber calls [`Watchdog::heartbeat`] for a topic every
//! time a frame arrives on it, and once per heartbeat tick for the
//! [`GLOBAL_HEARTBEAT`] entry.  An entry is *silent* when its last heartbeat
//! is older than its deadline; health evaluation turns silent entries into
//! unhealthy topics or a missed-heartbeat warning.
//!
//! Deadlines run on Tokio's clock, so a paused test runtime controls them.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

/// Watchdog entry fed by the transport heartbeat loop.
pub const GLOBAL_HEARTBEAT: &str = "__heartbeat__";

/// Liveness verdict for a single watched entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// A heartbeat arrived within the deadline.
    Alive,
    /// The deadline passed without a heartbeat, or the entry is unknown.
    Silent,
}

struct Entry {
    last_heartbeat: Instant,
    deadline: Duration,
    beats: u64,
}

/// Tracks heartbeats of named entries against per-entry deadlines.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use vigil_kernel::watchdog::{Liveness, Watchdog};
///
/// let mut wd = Watchdog::new();
/// wd.watch("cardiac/ppi", Duration::from_secs(10));
/// wd.heartbeat("cardiac/ppi");
///
/// assert_eq!(wd.liveness("cardiac/ppi"), Liveness::Alive);
/// assert_eq!(wd.liveness("eeg/raw"), Liveness::Silent);
/// ```
#[derive(Default)]
pub struct Watchdog {
    entries: HashMap<String, Entry>,
}

impl Watchdog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start watching `id` with the given `deadline`.
    ///
    /// The clock starts now, so a fresh entry is [`Liveness::Alive`] until
    /// the deadline first expires.  Watching an existing entry only updates
    /// its deadline.
    pub fn watch(&mut self, id: &str, deadline: Duration) {
        self.entries
            .entry(id.to_string())
            .and_modify(|e| e.deadline = deadline)
            .or_insert_with(|| Entry {
                last_heartbeat: Instant::now(),
                deadline,
                beats: 0,
            });
    }

    /// Stop watching `id`.
    pub fn unwatch(&mut self, id: &str) {
        self.entries.remove(id);
    }

    /// Record a heartbeat for `id`.  No-op for entries that are not watched.
    pub fn heartbeat(&mut self, id: &str) {
        if let Some(entry) = self.entries.get_mut(id) {
            entry.last_heartbeat = Instant::now();
            entry.beats += 1;
        }
    }

    /// Reset every entry's clock to now without counting a heartbeat.
    /// Used when the transport (re)connects.
    pub fn rearm(&mut self) {
        let now = Instant::now();
        for entry in self.entries.values_mut() {
            entry.last_heartbeat = now;
        }
    }

    pub fn liveness(&self, id: &str) -> Liveness {
        match self.entries.get(id) {
            Some(entry) if entry.last_heartbeat.elapsed() <= entry.deadline => Liveness::Alive,
            _ => Liveness::Silent,
        }
    }

    /// Time since the last heartbeat of `id`, `None` if not watched.
    pub fn silence(&self, id: &str) -> Option<Duration> {
        self.entries.get(id).map(|e| e.last_heartbeat.elapsed())
    }

    /// Number of heartbeats recorded for `id` since it was first watched.
    pub fn beats(&self, id: &str) -> u64 {
        self.entries.get(id).map_or(0, |e| e.beats)
    }

    /// IDs of all silent entries, sorted.
    pub fn silent(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| e.last_heartbeat.elapsed() > e.deadline)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}
