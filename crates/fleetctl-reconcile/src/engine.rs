//! The Reconciliation Engines: three dispatchers, selected by a
//! machine set's phase and role, that read a `ReconciliationContext` and
//! emit an ordered list of abstract `Operation`s. Engines never touch the
//! state store directly — see `applicator` for that.

use fleetctl_types::{Phase, Role};

use crate::context::ReconciliationContext;
use crate::error::Error;
use crate::etcd::{gather_status, TalosClientFactory};
use crate::Result;

/// A single unit of work the Applicator will execute against the state
/// store. A closed sum type, per the design notes: the engine is
/// polymorphic over `{apply(ctx) -> Operation}`, not over a trait object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Create(String),
    Teardown(String),
    Update(String),
    Destroy(String),
}

/// Worker strategy: unconstrained, multi-step. Destroys first so a
/// freed slot can be recreated in the same reconcile, then creates, then
/// tears down, then — in the legacy variant retained here — updates.
pub fn worker_strategy(ctx: &ReconciliationContext) -> Vec<Operation> {
    let mut ops = Vec::new();
    ops.extend(ctx.derived.to_destroy.iter().cloned().map(Operation::Destroy));
    ops.extend(ctx.derived.to_create.iter().cloned().map(Operation::Create));
    ops.extend(ctx.derived.to_teardown.iter().cloned().map(Operation::Teardown));
    ops.extend(ctx.derived.to_update.iter().cloned().map(Operation::Update));
    ops
}

/// Teardown strategy: the machine set itself is `TearingDown`. No
/// quota, no health checks — drain everything.
pub fn teardown_strategy(ctx: &ReconciliationContext) -> Vec<Operation> {
    let mut ops = Vec::new();
    ops.extend(ctx.derived.to_destroy.iter().cloned().map(Operation::Destroy));
    ops.extend(
        ctx.cluster_machines
            .iter()
            .map(|cm| &cm.metadata.id.id)
            .filter(|id| !ctx.derived.to_destroy.contains(*id))
            .cloned()
            .map(Operation::Teardown),
    );
    ops
}

/// Control-plane strategy: conservative and single-step. At most one
/// destructive operation is emitted per reconcile, enforcing serial
/// quorum-safe mutation without a distributed lock.
pub async fn control_plane_strategy(
    ctx: &ReconciliationContext,
    store: &impl fleetctl_store::Store,
    namespace: &str,
    talos: &dyn TalosClientFactory,
) -> Result<Vec<Operation>> {
    if !ctx.derived.to_create.is_empty() {
        return Ok(ctx.derived.to_create.iter().cloned().map(Operation::Create).collect());
    }
    if !ctx.derived.to_destroy.is_empty() {
        return Ok(ctx.derived.to_destroy.iter().cloned().map(Operation::Destroy).collect());
    }
    if !ctx.derived.tearing_down_machines.is_empty() {
        return Ok(Vec::new());
    }
    let lb_healthy = ctx.load_balancer.as_ref().is_some_and(|lb| lb.spec.healthy);
    if !lb_healthy {
        return Ok(Vec::new());
    }
    let Some(candidate) = ctx.derived.to_teardown.iter().next() else {
        return Ok(Vec::new());
    };

    let status = gather_status(store, namespace, ctx.cluster_id(), talos).await?;
    if status.can_scale_down(candidate) {
        Ok(vec![Operation::Teardown(candidate.clone())])
    } else {
        Err(Error::QuorumUnsafe {
            cluster_id: ctx.cluster_id().to_string(),
            machine_id: candidate.clone(),
        })
    }
}

/// Dispatches to the strategy matching the machine set's current phase and
/// role.
pub async fn dispatch(
    ctx: &ReconciliationContext,
    store: &impl fleetctl_store::Store,
    namespace: &str,
    talos: &dyn TalosClientFactory,
) -> Result<Vec<Operation>> {
    if ctx.machine_set.metadata.phase == Phase::TearingDown {
        return Ok(teardown_strategy(ctx));
    }
    match ctx.machine_set.spec.role {
        Role::Worker => Ok(worker_strategy(ctx)),
        Role::ControlPlane => control_plane_strategy(ctx, store, namespace, talos).await,
    }
}
