//! The Status Reducer: derives `MachineSetStatus` deterministically
//! from a `ReconciliationContext`. Pure — no I/O, no ordering dependence on
//! anything but the context's own snapshot.

use fleetctl_types::{labels, MachineCounts, MachineSetPhase, MachineSetStatus, MachineStage};

use crate::context::ReconciliationContext;

pub fn reduce(ctx: &ReconciliationContext) -> MachineSetStatus {
    let requested = ctx
        .machine_set
        .spec
        .allocation
        .map_or_else(|| ctx.derived.running_nodes.len() as u32, |a| a.count);

    let running_cluster_machines: Vec<_> = ctx
        .cluster_machines
        .iter()
        .filter(|cm| cm.metadata.phase == fleetctl_types::Phase::Running)
        .collect();
    let total = running_cluster_machines.len() as u32;

    let status_by_id: std::collections::BTreeMap<&str, &fleetctl_types::ClusterMachineStatus> = ctx
        .cluster_machine_statuses
        .iter()
        .map(|s| (s.metadata.id.id.as_str(), &s.spec))
        .collect();

    let healthy = running_cluster_machines
        .iter()
        .filter(|cm| {
            status_by_id
                .get(cm.metadata.id.id.as_str())
                .is_some_and(|s| s.stage == MachineStage::Running && s.ready)
        })
        .count() as u32;
    let connected = running_cluster_machines
        .iter()
        .filter(|cm| cm.metadata.has_label(labels::CONNECTED))
        .count() as u32;

    let is_control_plane = ctx.machine_set.spec.role == fleetctl_types::Role::ControlPlane;
    let running_count = ctx.derived.running_nodes.len() as u32;
    let phase = if is_control_plane && running_count == 0 {
        MachineSetPhase::Failed
    } else if running_count < requested || (ctx.cluster_machine_statuses.len() as u32) < running_count {
        MachineSetPhase::ScalingUp
    } else if running_count > requested || (ctx.cluster_machines.len() as u32) > running_count {
        MachineSetPhase::ScalingDown
    } else if !ctx.derived.to_update.is_empty() || !ctx.derived.outdated.is_empty() {
        MachineSetPhase::Reconfiguring
    } else {
        MachineSetPhase::Running
    };

    let every_running_node_healthy = ctx.derived.running_nodes.iter().all(|id| {
        ctx.cluster_machine(id).is_some()
            && status_by_id
                .get(id.as_str())
                .is_some_and(|s| s.stage == MachineStage::Running && s.ready)
    });
    let ready = phase == MachineSetPhase::Running && every_running_node_healthy && connected == total;

    let mut config_status_by_id: Vec<_> = ctx.config_statuses.iter().collect();
    config_status_by_id.sort_by(|a, b| a.metadata.id.id.cmp(&b.metadata.id.id));
    let config_hash = fleetctl_crypto::fingerprint(
        config_status_by_id
            .iter()
            .map(|s| s.spec.cluster_machine_config_sha256.as_str()),
    );

    MachineSetStatus {
        phase,
        requested,
        machines: MachineCounts { total, healthy, connected },
        ready,
        config_hash,
    }
}
