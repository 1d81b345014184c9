//! The Operation Applicator: executes `Operation`s against the state
//! store in order, under the per-reconcile quota the context derived.

use fleetctl_store::Store;
use fleetctl_types::{
    labels, ClusterMachine, ClusterMachineConfigPatches, Machine, Metadata, Resource, ResourceId,
    ResourceSpec,
};
use tracing::{info, warn};

use crate::context::ReconciliationContext;
use crate::engine::Operation;
use crate::Result;

/// Finalizer this controller places on a `Machine` while it backs a
/// `ClusterMachine`. Destroy tolerates its absence (already removed, or
/// never set).
pub const CLUSTER_MACHINE_FINALIZER: &str = "fleetctl/cluster-machine";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Skipped {
    QuotaDepleted,
    Unchanged,
    OwnershipFence,
}

#[derive(Debug, Default)]
pub struct ApplyReport {
    pub applied: Vec<Operation>,
    pub skipped: Vec<(Operation, Skipped)>,
}

/// Applies `ops` in order against `store`, mutating the context's quotas as
/// it goes. All writes use `owner`; store-level owner enforcement rejects
/// any operation that collides with a different controller.
pub async fn apply(
    store: &impl Store,
    ctx: &ReconciliationContext,
    namespace: &str,
    ops: Vec<Operation>,
    owner: &str,
) -> Result<ApplyReport> {
    let mut report = ApplyReport::default();
    let mut teardown_quota = ctx.derived.teardown_quota;
    let mut update_quota = ctx.derived.update_quota;

    for op in ops {
        match &op {
            Operation::Create(id) => {
                apply_create(store, ctx, namespace, id, owner).await?;
                report.applied.push(op);
            }
            Operation::Teardown(id) => {
                if !teardown_quota.consume() {
                    report.skipped.push((op, Skipped::QuotaDepleted));
                    continue;
                }
                store.teardown::<ClusterMachine>(&ResourceId::new(namespace, ClusterMachine::KIND, id)).await?;
                report.applied.push(op);
            }
            Operation::Update(id) => {
                match apply_update(store, ctx, namespace, id, owner, &mut update_quota).await? {
                    Some(skip) => report.skipped.push((op, skip)),
                    None => report.applied.push(op),
                }
            }
            Operation::Destroy(id) => {
                apply_destroy(store, namespace, id, owner).await?;
                report.applied.push(op);
            }
        }
    }

    Ok(report)
}

async fn apply_create(
    store: &impl Store,
    ctx: &ReconciliationContext,
    namespace: &str,
    machine_id: &str,
    owner: &str,
) -> Result<()> {
    let cluster_id = ctx.cluster_id();
    let machine_set_id = &ctx.machine_set.metadata.id.id;
    let inputs_version = ctx.aggregator.fingerprint_for(machine_id, machine_set_id, cluster_id);

    let labels_for = |meta: Metadata| -> Metadata {
        meta.with_label(labels::CLUSTER, cluster_id)
            .with_label(labels::MACHINE_SET, machine_set_id)
            .with_label(labels::ROLE, ctx.machine_set.spec.role.to_string())
    };

    let cluster_machine = Resource::new(
        labels_for(Metadata::new(ResourceId::new(namespace, ClusterMachine::KIND, machine_id))),
        ClusterMachine {
            kubernetes_version: ctx.cluster.spec.kubernetes_version.clone(),
            inputs_version,
        },
    );
    store.create(cluster_machine, Some(owner)).await?;

    let patches: Vec<String> = ctx
        .aggregator
        .patches_for(machine_id, machine_set_id, cluster_id)
        .into_iter()
        .map(|p| p.spec.data.clone())
        .collect();
    let config_patches = Resource::new(
        labels_for(Metadata::new(ResourceId::new(namespace, ClusterMachineConfigPatches::KIND, machine_id))),
        ClusterMachineConfigPatches { patches, compressed: false },
    );
    store.create(config_patches, Some(owner)).await?;

    info!(machine_id, "created cluster machine");
    Ok(())
}

async fn apply_update(
    store: &impl Store,
    ctx: &ReconciliationContext,
    namespace: &str,
    machine_id: &str,
    owner: &str,
    update_quota: &mut fleetctl_types::Quota,
) -> Result<Option<Skipped>> {
    let cluster_id = ctx.cluster_id();
    let machine_set_id = &ctx.machine_set.metadata.id.id;
    let expected = ctx.aggregator.fingerprint_for(machine_id, machine_set_id, cluster_id);

    let id = ResourceId::new(namespace, ClusterMachine::KIND, machine_id);
    let current = store.get::<ClusterMachine>(&id).await?;

    if current.spec.inputs_version == expected {
        return Ok(Some(Skipped::Unchanged));
    }
    if current.metadata.label(labels::CLUSTER) != Some(cluster_id) {
        return Ok(Some(Skipped::OwnershipFence));
    }

    let already_in_flight =
        ctx.derived.outdated.contains(machine_id) || ctx.derived.unconfigured.contains(machine_id);
    if !already_in_flight && !update_quota.consume() {
        return Ok(Some(Skipped::QuotaDepleted));
    }

    let patches: Vec<String> = ctx
        .aggregator
        .patches_for(machine_id, machine_set_id, cluster_id)
        .into_iter()
        .map(|p| p.spec.data.clone())
        .collect();
    let patches_id = ResourceId::new(namespace, ClusterMachineConfigPatches::KIND, machine_id);
    match store.get::<ClusterMachineConfigPatches>(&patches_id).await {
        Ok(mut existing) => {
            existing.spec.patches = patches;
            store.update(existing, owner, None).await?;
        }
        Err(err) if err.is_not_found() => {
            let meta = Metadata::new(patches_id)
                .with_label(labels::CLUSTER, cluster_id)
                .with_label(labels::MACHINE_SET, machine_set_id.as_str());
            store
                .create(Resource::new(meta, ClusterMachineConfigPatches { patches, compressed: false }), Some(owner))
                .await?;
        }
        Err(err) => return Err(err.into()),
    }

    let mut updated = current;
    updated.spec.inputs_version = expected;
    if updated.spec.kubernetes_version.is_empty() {
        updated.spec.kubernetes_version = ctx.cluster.spec.kubernetes_version.clone();
    }
    store.update(updated, owner, None).await?;

    Ok(None)
}

async fn apply_destroy(store: &impl Store, namespace: &str, machine_id: &str, owner: &str) -> Result<()> {
    let patches_id = ResourceId::new(namespace, ClusterMachineConfigPatches::KIND, machine_id);
    match store.destroy::<ClusterMachineConfigPatches>(&patches_id, Some(owner)).await {
        Ok(()) => {}
        Err(err) if err.is_not_found() => {}
        Err(err) => return Err(err.into()),
    }

    let cm_id = ResourceId::new(namespace, ClusterMachine::KIND, machine_id);
    store.destroy::<ClusterMachine>(&cm_id, Some(owner)).await?;

    let machine_id_res = ResourceId::new(namespace, Machine::KIND, machine_id);
    match store.remove_finalizer::<Machine>(&machine_id_res, CLUSTER_MACHINE_FINALIZER).await {
        Ok(()) => {}
        Err(err) if err.is_not_found() => {}
        Err(err) => {
            warn!(machine_id, %err, "failed to remove cluster-machine finalizer from machine");
            return Err(err.into());
        }
    }

    info!(machine_id, "destroyed cluster machine");
    Ok(())
}
