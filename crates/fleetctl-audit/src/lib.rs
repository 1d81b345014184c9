//! Audit pipeline for fleetctl.
//!
//! Every create/update/teardown/destroy that passes through
//! [`wrapper::AuditedStore`] is logged to a durable SQLite-backed event
//! store once the underlying write has committed, so an event is never
//! recorded for a mutation that didn't actually happen. Hooks are
//! resource-type specific, registered once at startup in
//! [`hook::HookRegistry`], and may opt a given write out of logging (but
//! never out of happening) by returning [`hook::HookOutcome::NoLog`].
//!
//! [`store::AuditEventStore`] also accepts direct writes for events with
//! no corresponding `Store` mutation — inbound k8s/talos API access
//! (`k8s::audit_k8s_access`, `talos::audit_talos_access`) and migration
//! parse failures.

pub mod error;
pub mod event;
pub mod hook;
pub mod k8s;
pub mod legacy;
pub mod session;
pub mod store;
pub mod talos;
pub mod wrapper;

pub use error::{AuditError, Result};
pub use event::{AuditEvent, AuditEventData, EventType, Session};
pub use hook::{HookOutcome, HookRegistry};
pub use store::{AuditEventStore, AuditStoreConfig};
pub use wrapper::AuditedStore;
