//! `vigil-kernel` – Control plane
//!
//! Decides which signals are live, notices when they go quiet, and
//! remembers the operator's choices across restarts.
//!
//! # Modules
//!
//! - [`capability_registry`] – [`CapabilityRegistry`][capability_registry::CapabilityRegistry]:
//!   holds a typed [`SignalControl`][vigil_types::SignalControl] handle for
//!   every pipeline component and fans enable/disable calls out to one,
//!   several or all of them.
//! - [`watchdog`] – [`Watchdog`][watchdog::Watchdog]: per-topic and global
//!   heartbeat deadlines used by transport health evaluation.
//! - [`control_store`] – [`ControlStore`][control_store::ControlStore]:
//!   versioned JSON snapshots of the registry with rotating backups and
//!   fallback on load.

pub mod capability_registry;
pub mod control_store;
pub mod watchdog;

pub use capability_registry::{CapabilityRegistry, Target};
pub use control_store::{ComponentSignals, ControlSnapshot, ControlStore, PersistenceError};
pub use watchdog::{GLOBAL_HEARTBEAT, Liveness, Watchdog};
