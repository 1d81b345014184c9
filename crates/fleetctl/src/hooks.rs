//! Default audit-hook wiring for the resource kinds fleetctl itself
//! owns. External collaborators — identity issuance, the web UI,
//! k8s/Talos API proxies — register their own hooks (`NewUser`,
//! `AccessPolicy`, …) against the same registry; this module only covers
//! the kinds the fleet model defines.
//!
//! Every hook here is intentionally thin: populate the one subrecord that
//! identifies the resource, and let the wrapper fill in the session. None
//! of them ever return `NoLog` — a fleet-model write is always worth an
//! audit row — but the hook signature leaves that door open for a future
//! caller (e.g. a hook that suppresses logging for its own synthetic
//! housekeeping writes).

use std::sync::Arc;

use fleetctl_audit::{HookOutcome, HookRegistry};
use fleetctl_types::{
    labels, Cluster, ClusterMachine, ConfigPatch, Machine, MachineSet, MachineSetNode,
};

use crate::{Error, Result};

fn cluster_label(meta: &fleetctl_types::Metadata) -> String {
    meta.label(labels::CLUSTER).unwrap_or_default().to_string()
}

/// Registers the built-in hooks. Call once per process; a second call
/// (or a caller racing it) fails loudly via `HookAlreadyRegistered`
/// rather than silently layering a duplicate.
pub fn register_default_hooks(registry: &HookRegistry) -> Result<()> {
    registry
        .register_create::<Cluster>(Arc::new(|r, _s| {
            HookOutcome::Log(fleetctl_audit::AuditEventData {
                cluster: Some(fleetctl_audit::event::ClusterRecord { id: r.metadata.id.id.clone() }),
                ..Default::default()
            })
        }))
        .map_err(Error::Audit)?;
    registry
        .register_update::<Cluster>(Arc::new(|_old, new, _s| {
            HookOutcome::Log(fleetctl_audit::AuditEventData {
                cluster: Some(fleetctl_audit::event::ClusterRecord { id: new.metadata.id.id.clone() }),
                ..Default::default()
            })
        }))
        .map_err(Error::Audit)?;
    registry
        .register_destroy::<Cluster>(Arc::new(|id, _s| {
            HookOutcome::Log(fleetctl_audit::AuditEventData {
                cluster: Some(fleetctl_audit::event::ClusterRecord { id: id.id.clone() }),
                ..Default::default()
            })
        }))
        .map_err(Error::Audit)?;

    registry
        .register_create::<MachineSet>(Arc::new(|r, _s| {
            HookOutcome::Log(fleetctl_audit::AuditEventData {
                machine_set: Some(fleetctl_audit::event::MachineSetRecord {
                    id: r.metadata.id.id.clone(),
                    cluster_id: cluster_label(&r.metadata),
                }),
                ..Default::default()
            })
        }))
        .map_err(Error::Audit)?;
    registry
        .register_update::<MachineSet>(Arc::new(|_old, new, _s| {
            HookOutcome::Log(fleetctl_audit::AuditEventData {
                machine_set: Some(fleetctl_audit::event::MachineSetRecord {
                    id: new.metadata.id.id.clone(),
                    cluster_id: cluster_label(&new.metadata),
                }),
                ..Default::default()
            })
        }))
        .map_err(Error::Audit)?;

    registry
        .register_create::<MachineSetNode>(Arc::new(|r, _s| {
            HookOutcome::Log(fleetctl_audit::AuditEventData {
                machine_set_node: Some(fleetctl_audit::event::MachineSetNodeRecord {
                    id: r.metadata.id.id.clone(),
                    cluster_id: cluster_label(&r.metadata),
                }),
                ..Default::default()
            })
        }))
        .map_err(Error::Audit)?;
    registry
        .register_destroy::<MachineSetNode>(Arc::new(|id, _s| {
            HookOutcome::Log(fleetctl_audit::AuditEventData {
                machine_set_node: Some(fleetctl_audit::event::MachineSetNodeRecord {
                    id: id.id.clone(),
                    cluster_id: String::new(),
                }),
                ..Default::default()
            })
        }))
        .map_err(Error::Audit)?;

    registry
        .register_create::<Machine>(Arc::new(|r, _s| {
            HookOutcome::Log(fleetctl_audit::AuditEventData {
                machine: Some(fleetctl_audit::event::MachineRecord { id: r.metadata.id.id.clone() }),
                ..Default::default()
            })
        }))
        .map_err(Error::Audit)?;
    registry
        .register_update::<Machine>(Arc::new(|_old, new, _s| {
            HookOutcome::Log(fleetctl_audit::AuditEventData {
                machine: Some(fleetctl_audit::event::MachineRecord { id: new.metadata.id.id.clone() }),
                ..Default::default()
            })
        }))
        .map_err(Error::Audit)?;
    registry
        .register_destroy::<Machine>(Arc::new(|id, _s| {
            HookOutcome::Log(fleetctl_audit::AuditEventData {
                machine: Some(fleetctl_audit::event::MachineRecord { id: id.id.clone() }),
                ..Default::default()
            })
        }))
        .map_err(Error::Audit)?;

    registry
        .register_create::<ConfigPatch>(Arc::new(|r, _s| {
            HookOutcome::Log(fleetctl_audit::AuditEventData {
                config_patch: Some(fleetctl_audit::event::ConfigPatchRecord {
                    id: r.metadata.id.id.clone(),
                    cluster_id: r.metadata.label(labels::CLUSTER).map(String::from),
                }),
                ..Default::default()
            })
        }))
        .map_err(Error::Audit)?;
    registry
        .register_update::<ConfigPatch>(Arc::new(|_old, new, _s| {
            HookOutcome::Log(fleetctl_audit::AuditEventData {
                config_patch: Some(fleetctl_audit::event::ConfigPatchRecord {
                    id: new.metadata.id.id.clone(),
                    cluster_id: new.metadata.label(labels::CLUSTER).map(String::from),
                }),
                ..Default::default()
            })
        }))
        .map_err(Error::Audit)?;
    registry
        .register_destroy::<ConfigPatch>(Arc::new(|id, _s| {
            HookOutcome::Log(fleetctl_audit::AuditEventData {
                config_patch: Some(fleetctl_audit::event::ConfigPatchRecord { id: id.id.clone(), cluster_id: None }),
                ..Default::default()
            })
        }))
        .map_err(Error::Audit)?;

    // ClusterMachine is reconciler-owned, not user-written; its only
    // audited transition is an update whose `InputsVersion` annotation
    // changed, surfaced as a config-diff rather than a generic update.
    registry
        .register_update::<ClusterMachine>(Arc::new(|old, new, _s| {
            if old.spec.inputs_version == new.spec.inputs_version {
                return HookOutcome::NoLog;
            }
            HookOutcome::Log(fleetctl_audit::AuditEventData {
                machine_config_diff: Some(fleetctl_audit::event::MachineConfigDiffRecord {
                    id: new.metadata.id.id.clone(),
                    cluster_id: cluster_label(&new.metadata),
                }),
                ..Default::default()
            })
        }))
        .map_err(Error::Audit)?;

    Ok(())
}
