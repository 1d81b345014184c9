//! Audit event schema: `{type, resourceType, resourceId, timestampMillis,
//! data}`, where `data` carries the acting session plus at most one
//! resource-specific subrecord.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The event `type` column. Display renders the exact wire string used by
/// `AuditEventStore` and queried by operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Create,
    Update,
    Teardown,
    Destroy,
    UpdateWithConflicts,
    K8sAccess,
    TalosAccess,
    MigrationParseError,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventType::Create => "create",
            EventType::Update => "update",
            EventType::Teardown => "teardown",
            EventType::Destroy => "destroy",
            EventType::UpdateWithConflicts => "update_with_conflicts",
            EventType::K8sAccess => "k8s_access",
            EventType::TalosAccess => "talos_access",
            EventType::MigrationParseError => "migration_parse_error",
        };
        write!(f, "{s}")
    }
}

/// The acting session at the time of the write. Populated either by the
/// caller's ambient context or synthesized as `Internal-Agent` by a hook
/// that opts in (see `session::current_or_internal_agent`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: Option<String>,
    pub role: Option<String>,
    pub email: Option<String>,
    pub fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key_expiration: Option<DateTime<Utc>>,
}

impl Session {
    pub fn internal_agent() -> Self {
        Self {
            user_id: Some("internal-agent".to_string()),
            role: Some("system".to_string()),
            email: None,
            fingerprint: None,
            public_key_expiration: None,
        }
    }
}

macro_rules! subrecord {
    ($name:ident { $($field:ident: $ty:ty),+ $(,)? }) => {
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        pub struct $name {
            $(pub $field: $ty),+
        }
    };
}

subrecord!(NewUser { user_id: String, email: String });
subrecord!(MachineRecord { id: String });
subrecord!(ClusterRecord { id: String });
subrecord!(MachineSetRecord { id: String, cluster_id: String });
subrecord!(MachineSetNodeRecord { id: String, cluster_id: String });
subrecord!(ConfigPatchRecord { id: String, cluster_id: Option<String> });
subrecord!(MachineConfigDiffRecord { id: String, cluster_id: String });
subrecord!(MachineLabelsRecord { id: String });
subrecord!(AccessPolicyRecord { id: String });
subrecord!(K8sAccessRecord { cluster_name: String, command: String });
subrecord!(TalosAccessRecord { cluster_name: String, node_id: String, full_method: String });
subrecord!(MigrationErrorRecord { migration_id: u32, message: String, raw_data: String });

/// At most one of these subrecords is set on any given event; which one
/// depends on the resource type the write touched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEventData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<Session>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_user: Option<NewUser>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine: Option<MachineRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster: Option<ClusterRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine_set: Option<MachineSetRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine_set_node: Option<MachineSetNodeRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_patch: Option<ConfigPatchRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine_config_diff: Option<MachineConfigDiffRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine_labels: Option<MachineLabelsRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_policy: Option<AccessPolicyRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub k8s_access: Option<K8sAccessRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub talos_access: Option<TalosAccessRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub migration_error: Option<MigrationErrorRecord>,
}

impl AuditEventData {
    /// `resourceId` denormalization precedence.
    pub fn resource_id(&self) -> Option<&str> {
        None.or_else(|| self.new_user.as_ref().map(|r| r.user_id.as_str()))
            .or_else(|| self.machine.as_ref().map(|r| r.id.as_str()))
            .or_else(|| self.machine_labels.as_ref().map(|r| r.id.as_str()))
            .or_else(|| self.access_policy.as_ref().map(|r| r.id.as_str()))
            .or_else(|| self.cluster.as_ref().map(|r| r.id.as_str()))
            .or_else(|| self.machine_set.as_ref().map(|r| r.id.as_str()))
            .or_else(|| self.machine_set_node.as_ref().map(|r| r.id.as_str()))
            .or_else(|| self.config_patch.as_ref().map(|r| r.id.as_str()))
            .or_else(|| self.machine_config_diff.as_ref().map(|r| r.id.as_str()))
    }

    /// `clusterId` denormalization precedence.
    pub fn cluster_id(&self) -> Option<&str> {
        None.or_else(|| self.cluster.as_ref().map(|r| r.id.as_str()))
            .or_else(|| self.k8s_access.as_ref().map(|r| r.cluster_name.as_str()))
            .or_else(|| self.talos_access.as_ref().map(|r| r.cluster_name.as_str()))
            .or_else(|| self.machine_set.as_ref().map(|r| r.cluster_id.as_str()))
            .or_else(|| self.machine_set_node.as_ref().map(|r| r.cluster_id.as_str()))
            .or_else(|| {
                self.config_patch
                    .as_ref()
                    .and_then(|r| r.cluster_id.as_deref())
            })
            .or_else(|| self.machine_config_diff.as_ref().map(|r| r.cluster_id.as_str()))
    }

    pub fn actor_email(&self) -> Option<&str> {
        self.session.as_ref().and_then(|s| s.email.as_deref())
    }
}

/// A fully formed audit event, ready to append.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_type: EventType,
    pub resource_type: String,
    /// Copy of `data.resource_id()` at construction time, used to populate
    /// the `resourceId` column directly (kept as a field so `Read`s don't
    /// need to parse `data` to render it).
    pub resource_id: Option<String>,
    pub timestamp_ms: i64,
    pub data: AuditEventData,
}

impl AuditEvent {
    pub fn new(event_type: EventType, resource_type: impl Into<String>, timestamp_ms: i64, data: AuditEventData) -> Self {
        let resource_id = data.resource_id().map(str::to_string);
        Self {
            event_type,
            resource_type: resource_type.into(),
            resource_id,
            timestamp_ms,
            data,
        }
    }
}
