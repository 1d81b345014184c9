//! Direct audit entry point for inbound Kubernetes API-server access.
//!
//! fleetctl does not ship an HTTP/gRPC frontend (out of scope); this
//! module is the seam a k8s-facing middleware layer calls into once per
//! request, after authentication has resolved a [`crate::event::Session`]
//! and before (or regardless of) whatever the request actually does.

use crate::event::{AuditEventData, EventType, K8sAccessRecord};
use crate::session::current_or_internal_agent;
use crate::store::AuditEventStore;
use crate::Result;

/// Records one k8s-apiserver-bound request. `command` is the verb/path the
/// middleware resolved (e.g. `"get machinesets"`), not the raw HTTP line.
///
/// The acting session is read from the ambient task-local context the
/// authenticating middleware set with [`crate::session::with_session`]
/// before dispatching the request, falling back to the internal-agent
/// identity if none was set.
pub async fn audit_k8s_access(
    store: &AuditEventStore,
    cluster_name: impl Into<String>,
    command: impl Into<String>,
    timestamp_ms: i64,
) -> Result<()> {
    let data = AuditEventData {
        session: Some(current_or_internal_agent()),
        k8s_access: Some(K8sAccessRecord {
            cluster_name: cluster_name.into(),
            command: command.into(),
        }),
        ..Default::default()
    };
    let event = crate::event::AuditEvent::new(EventType::K8sAccess, "K8sAccess", timestamp_ms, data);
    store.write(&event).await
}
