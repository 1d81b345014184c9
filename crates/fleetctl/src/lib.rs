//! # fleetctl
//!
//! Core of a cluster-fleet control plane for bare-metal/virtual
//! Talos-based Kubernetes clusters: the `MachineSet` reconciliation
//! engine, the audit pipeline, and the migration manager that evolves
//! the resource store across schema versions, all driven through one
//! generic [`Store`](fleetctl_store::Store) contract.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                         FleetController                         │
//! │  ┌───────────┐   ┌───────────┐   ┌──────────┐   ┌───────────┐ │
//! │  │  Reconcile │ → │  Audited  │ → │  Store   │ ← │ Migration │ │
//! │  │  (engine)  │   │  (hooks)  │   │ (contract)│  │ (manager) │ │
//! │  └───────────┘   └───────────┘   └──────────┘   └───────────┘ │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every mutation a reconciler or migration makes goes through the
//! audited store, so every create/update/destroy that a registered
//! hook cares about is logged once the underlying write has committed
//! - never before, and never if the write failed.
//!
//! # Modules
//!
//! - [`fleet`]: [`FleetController`], the process-level facade
//! - [`hooks`]: the default audit-hook wiring for fleet-model resources
//! - [`error`]: the aggregate [`Error`]/[`Result`] for this crate

pub mod error;
pub mod fleet;
pub mod hooks;

pub use error::{Error, Result};
pub use fleet::{FleetController, DEFAULT_OWNER};

pub use fleetctl_audit as audit;
pub use fleetctl_migration as migration;
pub use fleetctl_reconcile as reconcile;
pub use fleetctl_store as store;
pub use fleetctl_types as types;
