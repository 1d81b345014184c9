//! The Reconciliation Context: a pure, side-effect-free snapshot built once
//! per machine-set reconcile, plus the set-algebraic diffs every engine
//! strategy reads from.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use fleetctl_store::{LabelQuery, Store};
use fleetctl_types::{
    labels, Cluster, ClusterMachine, ClusterMachineConfigPatches, ClusterMachineConfigStatus,
    ClusterMachineStatus, ConfigPatch, LoadBalancerStatus, MachineSet, MachineSetNode, Phase, Quota,
    Resource, ResourceId, ResourceSpec,
};

use crate::patch::PatchAggregator;
use crate::Result;

/// Everything an engine strategy needs to decide what to do with one
/// machine set, fetched as a single snapshot read of the state store.
pub struct ReconciliationContext {
    pub machine_set: Resource<MachineSet>,
    pub cluster: Resource<Cluster>,
    pub load_balancer: Option<Resource<LoadBalancerStatus>>,
    pub nodes: Vec<Resource<MachineSetNode>>,
    pub cluster_machines: Vec<Resource<ClusterMachine>>,
    pub cluster_machine_statuses: Vec<Resource<ClusterMachineStatus>>,
    pub config_statuses: Vec<Resource<ClusterMachineConfigStatus>>,
    pub config_patches: Vec<Resource<ClusterMachineConfigPatches>>,
    pub aggregator: PatchAggregator,
    pub derived: DerivedSets,
}

/// The set-algebraic diffs and per-reconcile quotas derived from the
/// snapshot. Every set is keyed by machine id (the id shared by
/// `MachineSetNode`, `ClusterMachine`, and their sibling resources).
#[derive(Debug, Clone, Default)]
pub struct DerivedSets {
    pub running_nodes: BTreeSet<String>,
    pub locked_nodes: BTreeSet<String>,
    pub tearing_down_machines: BTreeSet<String>,
    pub destroy_ready: BTreeSet<String>,
    pub to_teardown: BTreeSet<String>,
    pub to_create: BTreeSet<String>,
    pub to_destroy: BTreeSet<String>,
    pub update_candidates: BTreeSet<String>,
    pub to_update: BTreeSet<String>,
    pub unconfigured: BTreeSet<String>,
    pub outdated: BTreeSet<String>,
    pub teardown_quota: Quota,
    pub update_quota: Quota,
}

impl ReconciliationContext {
    /// Builds a context for machine set `machine_set_id` in `namespace` from
    /// a fresh snapshot read of `store`. Performs no mutation.
    pub async fn build(
        store: &impl Store,
        namespace: &str,
        machine_set_id: &str,
    ) -> Result<Self> {
        let machine_set = store
            .get::<MachineSet>(&ResourceId::new(namespace, MachineSet::KIND, machine_set_id))
            .await?;
        let cluster_id = machine_set
            .metadata
            .label(labels::CLUSTER)
            .expect("machine set must carry a cluster label")
            .to_string();
        let cluster = store
            .get::<Cluster>(&ResourceId::new(namespace, Cluster::KIND, &cluster_id))
            .await?;
        let load_balancer = match store
            .get::<LoadBalancerStatus>(&ResourceId::new(namespace, LoadBalancerStatus::KIND, &cluster_id))
            .await
        {
            Ok(lb) => Some(lb),
            Err(err) if err.is_not_found() => None,
            Err(err) => return Err(err.into()),
        };

        let by_machine_set = LabelQuery::new().with_equals(labels::MACHINE_SET, machine_set_id);
        let nodes = store.list::<MachineSetNode>(namespace, &by_machine_set).await?;
        let cluster_machines = store.list::<ClusterMachine>(namespace, &by_machine_set).await?;
        let cluster_machine_statuses = store
            .list::<ClusterMachineStatus>(namespace, &by_machine_set)
            .await?;
        let config_statuses = store
            .list::<ClusterMachineConfigStatus>(namespace, &by_machine_set)
            .await?;
        let config_patches = store
            .list::<ClusterMachineConfigPatches>(namespace, &by_machine_set)
            .await?;
        let all_patches = store.list::<ConfigPatch>(namespace, &LabelQuery::new()).await?;
        let aggregator = PatchAggregator::new(all_patches);

        let derived = DerivedSets::compute(
            &machine_set,
            &cluster_id,
            &nodes,
            &cluster_machines,
            &config_statuses,
            &config_patches,
            &aggregator,
        );

        Ok(Self {
            machine_set,
            cluster,
            load_balancer,
            nodes,
            cluster_machines,
            cluster_machine_statuses,
            config_statuses,
            config_patches,
            aggregator,
            derived,
        })
    }

    pub fn cluster_id(&self) -> &str {
        self.machine_set
            .metadata
            .label(labels::CLUSTER)
            .expect("machine set must carry a cluster label")
    }

    pub fn cluster_machine(&self, machine_id: &str) -> Option<&Resource<ClusterMachine>> {
        self.cluster_machines
            .iter()
            .find(|cm| cm.metadata.id.id == machine_id)
    }

    pub fn node(&self, machine_id: &str) -> Option<&Resource<MachineSetNode>> {
        self.nodes.iter().find(|n| n.metadata.id.id == machine_id)
    }
}

impl DerivedSets {
    #[allow(clippy::too_many_arguments)]
    fn compute(
        machine_set: &Resource<MachineSet>,
        cluster_id: &str,
        nodes: &[Resource<MachineSetNode>],
        cluster_machines: &[Resource<ClusterMachine>],
        config_statuses: &[Resource<ClusterMachineConfigStatus>],
        config_patches: &[Resource<ClusterMachineConfigPatches>],
        aggregator: &PatchAggregator,
    ) -> Self {
        let running_nodes: BTreeSet<String> = nodes
            .iter()
            .filter(|n| n.metadata.phase == Phase::Running)
            .map(|n| n.metadata.id.id.clone())
            .collect();
        let locked_nodes: BTreeSet<String> = nodes
            .iter()
            .filter(|n| n.metadata.is_locked())
            .map(|n| n.metadata.id.id.clone())
            .collect();

        let cluster_machine_ids: BTreeSet<String> =
            cluster_machines.iter().map(|cm| cm.metadata.id.id.clone()).collect();
        let tearing_down_machines: BTreeSet<String> = cluster_machines
            .iter()
            .filter(|cm| cm.metadata.phase == Phase::TearingDown && !cm.metadata.finalizers.is_empty())
            .map(|cm| cm.metadata.id.id.clone())
            .collect();
        let destroy_ready: BTreeSet<String> = cluster_machines
            .iter()
            .filter(|cm| cm.metadata.phase == Phase::TearingDown && cm.metadata.finalizers.is_empty())
            .map(|cm| cm.metadata.id.id.clone())
            .collect();

        let to_teardown: BTreeSet<String> = if machine_set.metadata.phase == Phase::TearingDown {
            cluster_machine_ids.difference(&tearing_down_machines).cloned().collect()
        } else {
            cluster_machine_ids
                .difference(&running_nodes)
                .cloned()
                .collect::<BTreeSet<_>>()
                .difference(&locked_nodes)
                .cloned()
                .collect::<BTreeSet<_>>()
                .difference(&tearing_down_machines)
                .cloned()
                .collect()
        };

        let to_create: BTreeSet<String> = running_nodes.difference(&cluster_machine_ids).cloned().collect();
        let to_destroy = destroy_ready.clone();

        let update_candidates: BTreeSet<String> = running_nodes
            .intersection(&cluster_machine_ids)
            .cloned()
            .collect::<BTreeSet<_>>()
            .difference(&tearing_down_machines)
            .cloned()
            .collect::<BTreeSet<_>>()
            .difference(&locked_nodes)
            .cloned()
            .collect();

        let config_patches_exist: BTreeSet<String> =
            config_patches.iter().map(|p| p.metadata.id.id.clone()).collect();
        let machine_set_id = &machine_set.metadata.id.id;
        let to_update: BTreeSet<String> = update_candidates
            .iter()
            .filter(|id| {
                let expected = aggregator.fingerprint_for(id, machine_set_id, cluster_id);
                let cm = cluster_machines.iter().find(|cm| &cm.metadata.id.id == *id);
                let drifted = cm.is_none_or(|cm| cm.spec.inputs_version != expected);
                drifted || !config_patches_exist.contains(*id)
            })
            .cloned()
            .collect();

        let config_status_by_id: BTreeMap<&str, &Resource<ClusterMachineConfigStatus>> = config_statuses
            .iter()
            .map(|s| (s.metadata.id.id.as_str(), s))
            .collect();
        let unconfigured: BTreeSet<String> = running_nodes
            .iter()
            .filter(|id| !config_status_by_id.contains_key(id.as_str()))
            .cloned()
            .collect();
        let outdated: BTreeSet<String> = running_nodes
            .iter()
            .filter_map(|id| {
                let status = config_status_by_id.get(id.as_str())?;
                let cm = cluster_machines.iter().find(|cm| &cm.metadata.id.id == id)?;
                let version_mismatch = status.spec.applied_version != cm.metadata.version;
                let has_error = status.spec.last_config_error.is_some();
                (version_mismatch || has_error).then(|| id.clone())
            })
            .collect();

        let teardown_quota = Quota::new(
            machine_set.spec.delete_strategy.initial_quota(),
            tearing_down_machines.len(),
        );
        let update_in_flight = outdated.union(&unconfigured).count();
        let update_quota = Quota::new(machine_set.spec.update_strategy.initial_quota(), update_in_flight);

        Self {
            running_nodes,
            locked_nodes,
            tearing_down_machines,
            destroy_ready,
            to_teardown,
            to_create,
            to_destroy,
            update_candidates,
            to_update,
            unconfigured,
            outdated,
            teardown_quota,
            update_quota,
        }
    }
}
