//! Open-anomaly bookkeeping for one signal.

use std::collections::VecDeque;

use tracing::debug;
use vigil_types::{AnomalyRecord, DataType, Finding};

pub const DEFAULT_MAX_OPEN: usize = 10;

/// Bounded list of currently open anomalies.
///
/// Each detection pass is reconciled against the list: findings whose
/// message is not open yet are appended, and open anomalies owned by the
/// evaluated data type that the pass no longer reports are cleared.
///
/// When more conditions hold at once than the list can keep, the oldest
/// entries are evicted.  An evicted condition is not reopened while it keeps
/// being reported; it opens again only after a pass has cleared it.
#[derive(Debug, Clone)]
pub struct AnomalyTracker {
    open: VecDeque<AnomalyRecord>,
    /// Evicted while still active: `(owning data type, message)`.
    evicted: Vec<(DataType, String)>,
    max_open: usize,
}

impl Default for AnomalyTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_OPEN)
    }
}

impl AnomalyTracker {
    pub fn new(max_open: usize) -> Self {
        Self {
            open: VecDeque::new(),
            evicted: Vec::new(),
            max_open: max_open.max(1),
        }
    }

    /// Apply one pass for `data_type`.  Returns the anomalies it opened.
    pub fn reconcile(&mut self, data_type: DataType, findings: &[Finding], timestamp: f64) -> Vec<AnomalyRecord> {
        self.open
            .retain(|a| a.data_type != data_type || findings.iter().any(|f| f.message == a.message));
        self.evicted
            .retain(|(dt, message)| *dt != data_type || findings.iter().any(|f| &f.message == message));

        let mut opened = Vec::new();
        for finding in findings {
            if self.open.iter().any(|a| a.message == finding.message)
                || self.evicted.iter().any(|(_, message)| *message == finding.message)
                || opened.iter().any(|a: &AnomalyRecord| a.message == finding.message)
            {
                continue;
            }
            opened.push(AnomalyRecord::open(finding, data_type, timestamp));
        }

        for record in &opened {
            if self.open.len() == self.max_open
                && let Some(oldest) = self.open.pop_front()
            {
                debug!(message = %oldest.message, "open anomaly evicted at capacity");
                self.evicted.push((oldest.data_type, oldest.message));
            }
            self.open.push_back(record.clone());
        }
        opened
    }

    /// Open anomalies, oldest first.
    pub fn open(&self) -> Vec<AnomalyRecord> {
        self.open.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    pub fn clear(&mut self) {
        self.open.clear();
        self.evicted.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_types::{AnomalyKind, Severity};

    fn finding(message: &str) -> Finding {
        Finding::new(AnomalyKind::Tachycardia, Severity::Warning, message, 110.0, 100.0)
    }

    #[test]
    fn duplicates_open_once() {
        let mut tracker = AnomalyTracker::default();
        let opened = tracker.reconcile(DataType::Rate, &[finding("a"), finding("a")], 1.0);
        assert_eq!(opened.len(), 1);
        assert!(tracker.reconcile(DataType::Rate, &[finding("a")], 2.0).is_empty());
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.open()[0].opened_at, 1.0);
    }

    #[test]
    fn stale_findings_clear_on_next_pass() {
        let mut tracker = AnomalyTracker::default();
        tracker.reconcile(DataType::Rate, &[finding("a"), finding("b")], 1.0);
        tracker.reconcile(DataType::Rate, &[finding("b")], 2.0);
        let open = tracker.open();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].message, "b");
    }

    #[test]
    fn clearing_is_scoped_to_data_type() {
        let mut tracker = AnomalyTracker::default();
        tracker.reconcile(DataType::Rate, &[finding("rate")], 1.0);
        tracker.reconcile(DataType::Waveform, &[], 2.0);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn capped_at_max_dropping_oldest() {
        let mut tracker = AnomalyTracker::default();
        let findings: Vec<Finding> = (0..15).map(|i| finding(&format!("m{i}"))).collect();
        tracker.reconcile(DataType::Rate, &findings, 1.0);
        assert_eq!(tracker.len(), DEFAULT_MAX_OPEN);
        assert_eq!(tracker.open()[0].message, "m5");
    }

    #[test]
    fn evicted_conditions_do_not_reopen_while_active() {
        let mut tracker = AnomalyTracker::default();
        let findings: Vec<Finding> = (0..12).map(|i| finding(&format!("m{i}"))).collect();
        assert_eq!(tracker.reconcile(DataType::Rate, &findings, 1.0).len(), 12);
        assert!(tracker.reconcile(DataType::Rate, &findings, 2.0).is_empty());
        assert_eq!(tracker.len(), DEFAULT_MAX_OPEN);

        // m0 clears, then comes back: it opens again.
        tracker.reconcile(DataType::Rate, &findings[1..], 3.0);
        let reopened = tracker.reconcile(DataType::Rate, &findings, 4.0);
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened[0].message, "m0");
        assert_eq!(tracker.len(), DEFAULT_MAX_OPEN);
    }
}
