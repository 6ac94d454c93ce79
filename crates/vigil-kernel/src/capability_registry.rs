//! [`CapabilityRegistry`] – the control plane deciding which signals are live.
//!
//! Every pipeline stage that can switch signals on and off (transport,
//! decoder, orchestrator) implements [`SignalControl`] and is registered
//! here once at startup.  Enable/disable calls are fanned out to one,
//! several, or all components; because components update their in-memory
//! state inside the call, the change is visible through
//! [`SignalControl::active_signals`] as soon as the registry call returns.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};
use vigil_types::{ComponentState, SignalControl, SignalState, VigilError};

use crate::control_store::{ComponentSignals, ControlSnapshot};

/// Which registered components a control call applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Component(String),
    Components(Vec<String>),
    /// Every component that serves the signal.
    All,
}

impl Target {
    pub fn component(name: impl Into<String>) -> Self {
        Target::Component(name.into())
    }
}

#[derive(Clone, Copy)]
enum Switch {
    On,
    Off,
}

/// Holds typed handles to every [`SignalControl`] component.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use vigil_kernel::capability_registry::{CapabilityRegistry, Target};
/// use vigil_types::{ComponentState, ComponentStatus, SignalControl, SignalState,
///                   SignalSwitchboard, VigilError};
///
/// struct Stage { board: SignalSwitchboard }
///
/// impl SignalControl for Stage {
///     fn component_name(&self) -> &str { "stage" }
///     fn available_signals(&self) -> Vec<String> { self.board.available() }
///     fn active_signals(&self) -> Vec<String> { self.board.active() }
///     fn enable_signal(&self, s: &str) -> Result<(), VigilError> {
///         self.board.enable("stage", s).map(|_| ())
///     }
///     fn disable_signal(&self, s: &str) -> Result<(), VigilError> {
///         self.board.disable("stage", s).map(|_| ())
///     }
///     fn signal_state(&self, s: &str) -> SignalState { self.board.state(s) }
///     fn component_state(&self) -> ComponentState {
///         ComponentState {
///             component: "stage".into(),
///             status: ComponentStatus::Running,
///             available: self.board.available(),
///             active: self.board.active(),
///             detail: None,
///         }
///     }
/// }
///
/// let mut registry = CapabilityRegistry::new();
/// registry.register(Arc::new(Stage { board: SignalSwitchboard::new(["eeg/raw"]) }));
///
/// registry.disable_signal(&Target::All, "eeg/raw").unwrap();
/// assert!(registry.active_signals("stage").unwrap().is_empty());
/// ```
#[derive(Default)]
pub struct CapabilityRegistry {
    components: BTreeMap<String, Arc<dyn SignalControl>>,
}

impl CapabilityRegistry {
    /// Create an empty registry with no components.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `component` under its [`SignalControl::component_name`].
    /// A component registered under the same name is replaced.
    pub fn register(&mut self, component: Arc<dyn SignalControl>) {
        let name = component.component_name().to_string();
        info!(component = %name, signals = component.available_signals().len(), "component registered");
        self.components.insert(name, component);
    }

    /// Remove a component.  Returns `false` when it was not registered.
    pub fn unregister(&mut self, component: &str) -> bool {
        self.components.remove(component).is_some()
    }

    /// Names of all registered components, sorted.
    pub fn components(&self) -> Vec<String> {
        self.components.keys().cloned().collect()
    }

    pub fn get(&self, component: &str) -> Option<&Arc<dyn SignalControl>> {
        self.components.get(component)
    }

    /// Activate `signal` on the targeted components.
    ///
    /// Returns the names of the components the call was applied to.  Nothing
    /// changes when any targeted component is unknown or does not serve the
    /// signal.
    pub fn enable_signal(&self, target: &Target, signal: &str) -> Result<Vec<String>, VigilError> {
        self.apply(target, signal, Switch::On)
    }

    /// Deactivate `signal` on the targeted components.  Idempotent.
    pub fn disable_signal(&self, target: &Target, signal: &str) -> Result<Vec<String>, VigilError> {
        self.apply(target, signal, Switch::Off)
    }

    pub fn available_signals(&self, component: &str) -> Result<Vec<String>, VigilError> {
        Ok(self.lookup(component)?.available_signals())
    }

    pub fn active_signals(&self, component: &str) -> Result<Vec<String>, VigilError> {
        Ok(self.lookup(component)?.active_signals())
    }

    pub fn component_state(&self, component: &str) -> Result<ComponentState, VigilError> {
        Ok(self.lookup(component)?.component_state())
    }

    /// State of every registered component, sorted by name.
    pub fn component_states(&self) -> Vec<ComponentState> {
        self.components.values().map(|c| c.component_state()).collect()
    }

    /// State of `signal` on every registered component.
    pub fn signal_states(&self, signal: &str) -> BTreeMap<String, SignalState> {
        self.components
            .iter()
            .map(|(name, c)| (name.clone(), c.signal_state(signal)))
            .collect()
    }

    /// Capture the available/active sets of every component.
    pub fn snapshot(&self) -> ControlSnapshot {
        let components = self
            .components
            .iter()
            .map(|(name, c)| {
                (
                    name.clone(),
                    ComponentSignals {
                        available: c.available_signals(),
                        active: c.active_signals(),
                    },
                )
            })
            .collect();
        ControlSnapshot::new(components)
    }

    /// Re-apply the active sets recorded in `snapshot`.
    ///
    /// Only signals that both the snapshot and the live component list as
    /// available are touched; components or signals that appeared since the
    /// snapshot keep their current state.  Returns the number of signals
    /// whose state was set.
    pub fn restore(&self, snapshot: &ControlSnapshot) -> usize {
        let mut applied = 0;
        for (name, saved) in &snapshot.components {
            let Some(component) = self.components.get(name) else {
                debug!(component = %name, "snapshot component not registered; skipped");
                continue;
            };
            for signal in component.available_signals() {
                if !saved.available.contains(&signal) {
                    continue;
                }
                let result = if saved.active.contains(&signal) {
                    component.enable_signal(&signal)
                } else {
                    component.disable_signal(&signal)
                };
                if result.is_ok() {
                    applied += 1;
                }
            }
        }
        info!(applied, "control snapshot restored");
        applied
    }

    // ------------------------------------------------------------------------
    // Internal helpers
    // ------------------------------------------------------------------------

    fn lookup(&self, component: &str) -> Result<&Arc<dyn SignalControl>, VigilError> {
        self.components
            .get(component)
            .ok_or_else(|| VigilError::CapabilityNotFound {
                component: component.to_string(),
                signal: None,
            })
    }

    fn resolve(&self, target: &Target, signal: &str) -> Result<Vec<&Arc<dyn SignalControl>>, VigilError> {
        let selected: Vec<&Arc<dyn SignalControl>> = match target {
            Target::Component(name) => vec![self.lookup(name)?],
            Target::Components(names) => names
                .iter()
                .map(|n| self.lookup(n))
                .collect::<Result<_, _>>()?,
            Target::All => {
                let serving: Vec<_> = self
                    .components
                    .values()
                    .filter(|c| c.signal_state(signal) != SignalState::Unknown)
                    .collect();
                if serving.is_empty() {
                    return Err(VigilError::CapabilityNotFound {
                        component: "*".to_string(),
                        signal: Some(signal.to_string()),
                    });
                }
                return Ok(serving);
            }
        };

        // Validate every target before mutating any of them.
        if let Some(missing) = selected
            .iter()
            .find(|c| c.signal_state(signal) == SignalState::Unknown)
        {
            return Err(VigilError::CapabilityNotFound {
                component: missing.component_name().to_string(),
                signal: Some(signal.to_string()),
            });
        }
        Ok(selected)
    }

    fn apply(&self, target: &Target, signal: &str, switch: Switch) -> Result<Vec<String>, VigilError> {
        let selected = self.resolve(target, signal)?;
        let mut applied = Vec::with_capacity(selected.len());
        for component in selected {
            match switch {
                Switch::On => component.enable_signal(signal)?,
                Switch::Off => component.disable_signal(signal)?,
            }
            applied.push(component.component_name().to_string());
        }
        info!(
            signal,
            enabled = matches!(switch, Switch::On),
            components = ?applied,
            "signal control applied"
        );
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_types::{ComponentStatus, SignalSwitchboard};

    struct Stage {
        name: &'static str,
        board: SignalSwitchboard,
    }

    impl Stage {
        fn new(name: &'static str, signals: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                name,
                board: SignalSwitchboard::new(signals.iter().copied()),
            })
        }
    }

    impl SignalControl for Stage {
        fn component_name(&self) -> &str {
            self.name
        }
        fn available_signals(&self) -> Vec<String> {
            self.board.available()
        }
        fn active_signals(&self) -> Vec<String> {
            self.board.active()
        }
        fn enable_signal(&self, signal: &str) -> Result<(), VigilError> {
            self.board.enable(self.name, signal).map(|_| ())
        }
        fn disable_signal(&self, signal: &str) -> Result<(), VigilError> {
            self.board.disable(self.name, signal).map(|_| ())
        }
        fn signal_state(&self, signal: &str) -> SignalState {
            self.board.state(signal)
        }
        fn component_state(&self) -> ComponentState {
            ComponentState {
                component: self.name.to_string(),
                status: ComponentStatus::Running,
                available: self.board.available(),
                active: self.board.active(),
                detail: None,
            }
        }
    }

    fn registry() -> CapabilityRegistry {
        let mut reg = CapabilityRegistry::new();
        reg.register(Stage::new("transport", &["cardiac/ppi", "eeg/raw"]));
        reg.register(Stage::new("decoder", &["cardiac/ppi", "eeg/raw"]));
        reg.register(Stage::new("orchestrator", &["cardiac/ppi"]));
        reg
    }

    #[test]
    fn disable_on_single_component() {
        let reg = registry();
        let applied = reg
            .disable_signal(&Target::component("transport"), "eeg/raw")
            .unwrap();
        assert_eq!(applied, vec!["transport".to_string()]);
        assert_eq!(reg.active_signals("transport").unwrap(), vec!["cardiac/ppi".to_string()]);
        // Other components are untouched.
        assert_eq!(reg.active_signals("decoder").unwrap().len(), 2);
    }

    #[test]
    fn disable_all_reaches_every_serving_component() {
        let reg = registry();
        let applied = reg.disable_signal(&Target::All, "cardiac/ppi").unwrap();
        assert_eq!(applied.len(), 3);
        for state in reg.signal_states("cardiac/ppi").values() {
            assert_eq!(*state, SignalState::Inactive);
        }
    }

    #[test]
    fn disable_all_skips_components_without_signal() {
        let reg = registry();
        let applied = reg.disable_signal(&Target::All, "eeg/raw").unwrap();
        assert_eq!(applied, vec!["decoder".to_string(), "transport".to_string()]);
        assert_eq!(
            reg.signal_states("eeg/raw").get("orchestrator"),
            Some(&SignalState::Unknown)
        );
    }

    #[test]
    fn disabling_twice_matches_disabling_once() {
        let reg = registry();
        let target = Target::component("decoder");
        reg.disable_signal(&target, "eeg/raw").unwrap();
        let once = reg.active_signals("decoder").unwrap();
        reg.disable_signal(&target, "eeg/raw").unwrap();
        assert_eq!(reg.active_signals("decoder").unwrap(), once);
    }

    #[test]
    fn unknown_component_is_not_found() {
        let reg = registry();
        let result = reg.enable_signal(&Target::component("ghost"), "eeg/raw");
        assert!(matches!(
            result,
            Err(VigilError::CapabilityNotFound { ref component, signal: None }) if component == "ghost"
        ));
    }

    #[test]
    fn many_targets_are_validated_before_any_change() {
        let reg = registry();
        let target = Target::Components(vec!["transport".into(), "orchestrator".into()]);
        // orchestrator does not serve eeg/raw → nothing may change.
        assert!(reg.disable_signal(&target, "eeg/raw").is_err());
        assert_eq!(reg.signal_states("eeg/raw").get("transport"), Some(&SignalState::Active));
    }

    #[test]
    fn unknown_signal_everywhere_is_not_found() {
        let reg = registry();
        assert!(matches!(
            reg.disable_signal(&Target::All, "lidar"),
            Err(VigilError::CapabilityNotFound { .. })
        ));
    }

    #[test]
    fn active_never_exceeds_available() {
        let reg = registry();
        reg.disable_signal(&Target::All, "cardiac/ppi").unwrap();
        reg.enable_signal(&Target::All, "cardiac/ppi").unwrap();
        for state in reg.component_states() {
            assert!(state.active.iter().all(|s| state.available.contains(s)));
        }
    }

    #[test]
    fn snapshot_and_restore_roundtrip() {
        let reg = registry();
        reg.disable_signal(&Target::component("transport"), "eeg/raw").unwrap();
        let snapshot = reg.snapshot();

        let fresh = registry();
        let applied = fresh.restore(&snapshot);
        assert_eq!(applied, 5);
        assert_eq!(
            fresh.active_signals("transport").unwrap(),
            vec!["cardiac/ppi".to_string()]
        );
    }

    #[test]
    fn register_replaces_same_name() {
        let mut reg = registry();
        reg.register(Stage::new("orchestrator", &["vehicle/level"]));
        assert_eq!(reg.components().len(), 3);
        assert_eq!(
            reg.available_signals("orchestrator").unwrap(),
            vec!["vehicle/level".to_string()]
        );
        assert!(reg.unregister("orchestrator"));
        assert!(!reg.unregister("orchestrator"));
    }
}
