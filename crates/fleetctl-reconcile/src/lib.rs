//! The MachineSet Reconciliation Engine: converges a declarative fleet
//! model (clusters, machine sets, desired membership, config patches) to
//! actual `ClusterMachine` resources.
//!
//! One reconcile call is: build a [`context::ReconciliationContext`]
//! snapshot, [`engine::dispatch`] it to the strategy matching the machine
//! set's phase and role, [`applicator::apply`] the resulting operations,
//! then [`status::reduce`] the (now stale) context into a `MachineSetStatus`
//! a caller can write back. The status reflects the pre-apply snapshot —
//! callers that need a post-apply status rebuild the context.

pub mod applicator;
pub mod context;
pub mod engine;
pub mod error;
pub mod etcd;
pub mod patch;
pub mod status;

pub use context::ReconciliationContext;
pub use engine::Operation;
pub use error::{Error, Result};

use fleetctl_store::Store;
use fleetctl_types::MachineSetStatus;

use crate::etcd::TalosClientFactory;

/// Result of one full reconcile call for a single machine set.
pub struct ReconcileOutcome {
    pub applied: Vec<Operation>,
    pub skipped: Vec<(Operation, applicator::Skipped)>,
    pub status: MachineSetStatus,
}

/// Runs one reconcile pass for `machine_set_id`: build context, dispatch to
/// the matching engine strategy, apply the resulting operations, and reduce
/// the pre-apply context to a status. Callers are expected to call this
/// again on the next watch wakeup; convergence is iterative, not
/// single-shot.
pub async fn reconcile_once(
    store: &impl Store,
    namespace: &str,
    machine_set_id: &str,
    owner: &str,
    talos: &dyn TalosClientFactory,
) -> Result<ReconcileOutcome> {
    let ctx = ReconciliationContext::build(store, namespace, machine_set_id).await?;
    let ops = engine::dispatch(&ctx, store, namespace, talos).await?;
    let report = applicator::apply(store, &ctx, namespace, ops, owner).await?;
    let status = status::reduce(&ctx);
    Ok(ReconcileOutcome { applied: report.applied, skipped: report.skipped, status })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetctl_store::memory::MemoryStore;
    use fleetctl_types::{
        labels, Cluster, Machine, MachineSet, MachineSetNode, Metadata, Resource, ResourceId, ResourceSpec,
        Role, Strategy,
    };

    const NS: &str = "default";
    const OWNER: &str = "fleetctl-reconcile";

    struct NoTalos;

    #[async_trait::async_trait]
    impl TalosClientFactory for NoTalos {
        async fn connect(&self, _endpoint: &etcd::TalosEndpoint) -> anyhow::Result<Box<dyn etcd::TalosClient>> {
            Err(anyhow::anyhow!("no talos client configured for this test"))
        }
    }

    async fn seed_cluster(store: &MemoryStore, cluster_id: &str) {
        let cluster = Resource::new(
            Metadata::new(ResourceId::new(NS, Cluster::KIND, cluster_id)),
            Cluster {
                kubernetes_version: "1.30.0".into(),
                talos_version: "1.7.0".into(),
                backup_enabled: false,
                features: Default::default(),
            },
        );
        store.create(cluster, Some(OWNER)).await.unwrap();
    }

    async fn seed_worker_set(store: &MemoryStore, cluster_id: &str, set_id: &str, node_ids: &[&str]) {
        let machine_set = Resource::new(
            Metadata::new(ResourceId::new(NS, MachineSet::KIND, set_id)).with_label(labels::CLUSTER, cluster_id),
            MachineSet {
                role: Role::Worker,
                update_strategy: Strategy::Unset,
                delete_strategy: Strategy::Unset,
                allocation: None,
                bootstrap: None,
            },
        );
        store.create(machine_set, Some(OWNER)).await.unwrap();

        for node_id in node_ids {
            let node = Resource::new(
                Metadata::new(ResourceId::new(NS, MachineSetNode::KIND, node_id))
                    .with_label(labels::MACHINE_SET, set_id)
                    .with_label(labels::CLUSTER, cluster_id),
                MachineSetNode { machine_id: (*node_id).to_string() },
            );
            store.create(node, Some(OWNER)).await.unwrap();

            let machine = Resource::new(
                Metadata::new(ResourceId::new(NS, Machine::KIND, node_id)),
                Machine { management_address: "10.0.0.1".into(), reachable: true },
            );
            store.create(machine, Some(OWNER)).await.unwrap();
        }
    }

    /// Scenario (a): worker create — MachineSetNodes {a, b, c}, no
    /// ClusterMachines yet → Create a, Create b, Create c.
    #[tokio::test]
    async fn worker_create_emits_a_create_per_node() {
        let store = MemoryStore::new();
        seed_cluster(&store, "c1").await;
        seed_worker_set(&store, "c1", "ms1", &["a", "b", "c"]).await;

        let outcome = reconcile_once(&store, NS, "ms1", OWNER, &NoTalos).await.unwrap();
        assert_eq!(
            outcome.applied,
            vec![Operation::Create("a".into()), Operation::Create("b".into()), Operation::Create("c".into())]
        );

        for id in ["a", "b", "c"] {
            let cm = store
                .get::<fleetctl_types::ClusterMachine>(&ResourceId::new(NS, fleetctl_types::ClusterMachine::KIND, id))
                .await
                .unwrap();
            assert_eq!(cm.spec.kubernetes_version, "1.30.0");
        }
    }

    /// Scenario (b): worker scale-down with a tearing-down remnant — nodes
    /// {a, b, c}; ClusterMachines {a(Running), b(TearingDown, no
    /// finalizers)} → Destroy b, Create c.
    #[tokio::test]
    async fn worker_scale_down_destroys_remnant_then_creates_missing() {
        let store = MemoryStore::new();
        seed_cluster(&store, "c1").await;
        seed_worker_set(&store, "c1", "ms1", &["a", "b", "c"]).await;

        reconcile_once(&store, NS, "ms1", OWNER, &NoTalos).await.unwrap();
        let id_b = ResourceId::new(NS, fleetctl_types::ClusterMachine::KIND, "b");
        store.teardown::<fleetctl_types::ClusterMachine>(&id_b).await.unwrap();
        // Node b is no longer desired; next reconcile should destroy its
        // now-tearing-down, finalizer-free remnant and create the missing c.
        store
            .destroy::<MachineSetNode>(&ResourceId::new(NS, MachineSetNode::KIND, "b"), Some(OWNER))
            .await
            .unwrap();

        let outcome = reconcile_once(&store, NS, "ms1", OWNER, &NoTalos).await.unwrap();
        assert_eq!(outcome.applied, vec![Operation::Destroy("b".into()), Operation::Create("c".into())]);
    }

    #[tokio::test]
    async fn control_plane_destroy_one_requires_healthy_quorum() {
        let store = MemoryStore::new();
        seed_cluster(&store, "c1").await;

        let machine_set = Resource::new(
            Metadata::new(ResourceId::new(NS, MachineSet::KIND, "ms1")).with_label(labels::CLUSTER, "c1"),
            MachineSet {
                role: Role::ControlPlane,
                update_strategy: Strategy::Unset,
                delete_strategy: Strategy::Unset,
                allocation: None,
                bootstrap: None,
            },
        );
        store.create(machine_set, Some(OWNER)).await.unwrap();

        let lb = Resource::new(
            Metadata::new(ResourceId::new(NS, fleetctl_types::LoadBalancerStatus::KIND, "c1")),
            fleetctl_types::LoadBalancerStatus { healthy: true },
        );
        store.create(lb, Some(OWNER)).await.unwrap();

        // Only node "a" is desired; "c" and "d" are stale ClusterMachines to
        // tear down one at a time.
        let node_a = Resource::new(
            Metadata::new(ResourceId::new(NS, MachineSetNode::KIND, "a"))
                .with_label(labels::MACHINE_SET, "ms1")
                .with_label(labels::CLUSTER, "c1"),
            MachineSetNode { machine_id: "a".into() },
        );
        store.create(node_a, Some(OWNER)).await.unwrap();

        for id in ["a", "c", "d"] {
            let cm = Resource::new(
                Metadata::new(ResourceId::new(NS, fleetctl_types::ClusterMachine::KIND, id))
                    .with_label(labels::MACHINE_SET, "ms1")
                    .with_label(labels::CLUSTER, "c1"),
                fleetctl_types::ClusterMachine { kubernetes_version: "1.30.0".into(), inputs_version: String::new() },
            );
            store.create(cm, Some(OWNER)).await.unwrap();
            let machine = Resource::new(
                Metadata::new(ResourceId::new(NS, Machine::KIND, id)),
                Machine { management_address: "10.0.0.1".into(), reachable: true },
            );
            store.create(machine, Some(OWNER)).await.unwrap();
        }

        struct AllHealthy;
        #[async_trait::async_trait]
        impl etcd::TalosClient for AllHealthy {
            async fn etcd_member_list(&self) -> anyhow::Result<std::collections::BTreeSet<etcd::EtcdMember>> {
                Ok(["a", "c", "d"].iter().map(|id| etcd::EtcdMember { id: (*id).to_string() }).collect())
            }
            async fn etcd_healthy(&self) -> anyhow::Result<bool> {
                Ok(true)
            }
        }
        struct AllHealthyFactory;
        #[async_trait::async_trait]
        impl TalosClientFactory for AllHealthyFactory {
            async fn connect(&self, _endpoint: &etcd::TalosEndpoint) -> anyhow::Result<Box<dyn etcd::TalosClient>> {
                Ok(Box::new(AllHealthy))
            }
        }

        for id in ["a", "c", "d"] {
            let status = Resource::new(
                Metadata::new(ResourceId::new(NS, fleetctl_types::ClusterMachineStatus::KIND, id))
                    .with_label(labels::MACHINE_SET, "ms1")
                    .with_label(labels::CLUSTER, "c1")
                    .with_label(labels::ROLE, Role::ControlPlane.to_string()),
                fleetctl_types::ClusterMachineStatus {
                    stage: fleetctl_types::MachineStage::Running,
                    ready: true,
                    connected: true,
                },
            );
            store.create(status, Some(OWNER)).await.unwrap();
        }

        let outcome = reconcile_once(&store, NS, "ms1", OWNER, &AllHealthyFactory).await.unwrap();
        assert_eq!(outcome.applied.len(), 1);
        assert!(matches!(&outcome.applied[0], Operation::Teardown(id) if id == "c"));
    }
}
