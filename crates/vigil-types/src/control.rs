//! Capability control contract.
//!
//! Every pipeline component that can switch individual signals on and off
//! implements [`SignalControl`].  The kernel's registry holds typed handles
//! to these components and fans enable/disable calls out to them.
//!
//! [`SignalSwitchboard`] is the shared bookkeeping most implementations
//! embed: a set of available signals and the subset currently active.

use std::collections::BTreeSet;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::error::VigilError;

/// Per-signal state as reported by a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalState {
    Active,
    Inactive,
    /// The component does not serve this signal.
    Unknown,
    Error,
}

/// Coarse lifecycle status of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentStatus {
    Running,
    Idle,
    Stopped,
    Error,
}

/// Snapshot returned by [`SignalControl::component_state`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentState {
    pub component: String,
    pub status: ComponentStatus,
    pub available: Vec<String>,
    pub active: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Contract every signal-serving component fulfils.
///
/// Implementations must apply `enable_signal`/`disable_signal` to their
/// in-memory state before returning so that a subsequent
/// `active_signals()` call observes the change.
pub trait SignalControl: Send + Sync {
    /// Stable name the registry files this component under.
    fn component_name(&self) -> &str;

    fn available_signals(&self) -> Vec<String>;

    fn active_signals(&self) -> Vec<String>;

    /// Returns [`VigilError::CapabilityNotFound`] when `signal` is not
    /// available on this component.
    fn enable_signal(&self, signal: &str) -> Result<(), VigilError>;

    /// Returns [`VigilError::CapabilityNotFound`] when `signal` is not
    /// available on this component.
    fn disable_signal(&self, signal: &str) -> Result<(), VigilError>;

    fn signal_state(&self, signal: &str) -> SignalState;

    fn component_state(&self) -> ComponentState;
}

// ────────────────────────────────────────────────────────────────────────────
// SignalSwitchboard
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct SwitchState {
    available: BTreeSet<String>,
    active: BTreeSet<String>,
}

/// Thread-safe available/active signal sets.
///
/// Invariant: `active ⊆ available`.
///
/// # Example
///
/// ```
/// use vigil_types::control::{SignalState, SignalSwitchboard};
///
/// let board = SignalSwitchboard::new(["cardiac/ppi", "eeg/raw"]);
/// board.disable("transport", "eeg/raw").unwrap();
///
/// assert_eq!(board.active(), vec!["cardiac/ppi".to_string()]);
/// assert_eq!(board.state("eeg/raw"), SignalState::Inactive);
/// assert!(board.enable("transport", "lidar").is_err());
/// ```
#[derive(Debug, Default)]
pub struct SignalSwitchboard {
    inner: RwLock<SwitchState>,
}

impl SignalSwitchboard {
    /// Create a switchboard where every listed signal is available and active.
    pub fn new<I, S>(signals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let board = Self::default();
        for signal in signals {
            board.register(signal);
        }
        board
    }

    /// Make `signal` available and active.  Re-registering keeps the
    /// current active state.
    pub fn register(&self, signal: impl Into<String>) {
        let signal = signal.into();
        let mut state = self.write();
        if state.available.insert(signal.clone()) {
            state.active.insert(signal);
        }
    }

    /// Remove `signal` from both sets.  No-op when absent.
    pub fn unregister(&self, signal: &str) {
        let mut state = self.write();
        state.available.remove(signal);
        state.active.remove(signal);
    }

    pub fn available(&self) -> Vec<String> {
        self.read().available.iter().cloned().collect()
    }

    pub fn active(&self) -> Vec<String> {
        self.read().active.iter().cloned().collect()
    }

    pub fn is_active(&self, signal: &str) -> bool {
        self.read().active.contains(signal)
    }

    /// Activate `signal`.  Returns whether the state changed.
    pub fn enable(&self, component: &str, signal: &str) -> Result<bool, VigilError> {
        let mut state = self.write();
        if !state.available.contains(signal) {
            return Err(not_found(component, signal));
        }
        Ok(state.active.insert(signal.to_string()))
    }

    /// Deactivate `signal`.  Returns whether the state changed.
    pub fn disable(&self, component: &str, signal: &str) -> Result<bool, VigilError> {
        let mut state = self.write();
        if !state.available.contains(signal) {
            return Err(not_found(component, signal));
        }
        Ok(state.active.remove(signal))
    }

    pub fn state(&self, signal: &str) -> SignalState {
        let state = self.read();
        if state.active.contains(signal) {
            SignalState::Active
        } else if state.available.contains(signal) {
            SignalState::Inactive
        } else {
            SignalState::Unknown
        }
    }

    // Poisoning is ignored: every write leaves both sets consistent.
    fn read(&self) -> RwLockReadGuard<'_, SwitchState> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, SwitchState> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn not_found(component: &str, signal: &str) -> VigilError {
    VigilError::CapabilityNotFound {
        component: component.to_string(),
        signal: Some(signal.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_signals_start_active() {
        let board = SignalSwitchboard::new(["a", "b"]);
        assert_eq!(board.active(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(board.state("a"), SignalState::Active);
    }

    #[test]
    fn disable_twice_is_idempotent() {
        let board = SignalSwitchboard::new(["a", "b"]);
        assert!(board.disable("c", "a").unwrap());
        assert!(!board.disable("c", "a").unwrap());
        assert_eq!(board.active(), vec!["b".to_string()]);
        assert_eq!(board.state("a"), SignalState::Inactive);
    }

    #[test]
    fn unknown_signal_reports_not_found_without_change() {
        let board = SignalSwitchboard::new(["a"]);
        let err = board.enable("transport", "zzz").unwrap_err();
        assert!(matches!(err, VigilError::CapabilityNotFound { .. }));
        assert_eq!(board.active(), vec!["a".to_string()]);
        assert_eq!(board.state("zzz"), SignalState::Unknown);
    }

    #[test]
    fn reregister_preserves_disabled_state() {
        let board = SignalSwitchboard::new(["a"]);
        board.disable("c", "a").unwrap();
        board.register("a");
        assert!(!board.is_active("a"));
    }

    #[test]
    fn active_is_subset_of_available_after_unregister() {
        let board = SignalSwitchboard::new(["a", "b"]);
        board.unregister("a");
        let available = board.available();
        assert!(board.active().iter().all(|s| available.contains(s)));
        assert_eq!(board.state("a"), SignalState::Unknown);
    }
}
