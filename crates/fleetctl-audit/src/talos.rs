//! Direct audit entry point for inbound Talos API access (config pulls,
//! `talosctl` passthrough). Mirrors `k8s::audit_k8s_access`; kept as a
//! separate module since the two wire protocols resolve a request to an
//! audit record differently (`full_method` + `node_id` vs. a single verb
//! string).

use crate::event::{AuditEventData, EventType, Session, TalosAccessRecord};
use crate::store::AuditEventStore;
use crate::Result;

/// Records one inbound Talos API call. Unlike [`crate::k8s::audit_k8s_access`],
/// this always carries the internal-agent session rather than whatever
/// session (if any) is ambient: Talos config pulls and `talosctl`
/// passthrough are driven by fleetctl's own controller identity, never by
/// a per-request human session.
pub async fn audit_talos_access(
    store: &AuditEventStore,
    cluster_name: impl Into<String>,
    node_id: impl Into<String>,
    full_method: impl Into<String>,
    timestamp_ms: i64,
) -> Result<()> {
    let data = AuditEventData {
        session: Some(Session::internal_agent()),
        talos_access: Some(TalosAccessRecord {
            cluster_name: cluster_name.into(),
            node_id: node_id.into(),
            full_method: full_method.into(),
        }),
        ..Default::default()
    };
    let event = crate::event::AuditEvent::new(EventType::TalosAccess, "TalosAccess", timestamp_ms, data);
    store.write(&event).await
}
