//! The Patch Aggregator: orders per-machine config patches by scope
//! cluster → machine-set → cluster-machine → machine, and fingerprints the
//! resulting ordered list for the `InputsVersion` drift check.

use fleetctl_types::{labels, ConfigPatch, Phase, Resource};

/// Holds every `ConfigPatch` in a namespace and answers, for a given
/// machine, the ordered list of patches that apply to it.
pub struct PatchAggregator {
    patches: Vec<Resource<ConfigPatch>>,
}

impl PatchAggregator {
    pub fn new(patches: Vec<Resource<ConfigPatch>>) -> Self {
        Self { patches }
    }

    /// Patches scoped to `cluster_id` alone: carry the cluster label and
    /// neither a machine-set nor a cluster-machine label.
    fn cluster_scoped<'a>(&'a self, cluster_id: &str) -> Vec<&'a Resource<ConfigPatch>> {
        let mut matched: Vec<_> = self
            .patches
            .iter()
            .filter(|p| {
                p.metadata.phase == Phase::Running
                    && p.metadata.label(labels::CLUSTER) == Some(cluster_id)
                    && !p.metadata.has_label(labels::MACHINE_SET)
                    && !p.metadata.has_label(labels::CLUSTER_MACHINE)
            })
            .collect();
        matched.sort_by(|a, b| a.metadata.id.id.cmp(&b.metadata.id.id));
        matched
    }

    fn scoped_by<'a>(&'a self, key: &str, value: &str) -> Vec<&'a Resource<ConfigPatch>> {
        let mut matched: Vec<_> = self
            .patches
            .iter()
            .filter(|p| p.metadata.phase == Phase::Running && p.metadata.label(key) == Some(value))
            .collect();
        matched.sort_by(|a, b| a.metadata.id.id.cmp(&b.metadata.id.id));
        matched
    }

    /// The ordered list of patches applying to `machine_id`, in the order
    /// the Talos config for that machine would be assembled.
    pub fn patches_for(&self, machine_id: &str, machine_set_id: &str, cluster_id: &str) -> Vec<&Resource<ConfigPatch>> {
        let mut ordered = self.cluster_scoped(cluster_id);
        ordered.extend(self.scoped_by(labels::MACHINE_SET, machine_set_id));
        ordered.extend(self.scoped_by(labels::CLUSTER_MACHINE, machine_id));
        ordered.extend(self.scoped_by(labels::MACHINE, machine_id));
        ordered
    }

    /// Fingerprint of the ordered patch list — the value `ClusterMachine`'s
    /// `InputsVersion` must equal once converged.
    pub fn fingerprint_for(&self, machine_id: &str, machine_set_id: &str, cluster_id: &str) -> String {
        let ordered = self.patches_for(machine_id, machine_set_id, cluster_id);
        fleetctl_crypto::fingerprint(ordered.iter().map(|p| p.spec.data.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetctl_types::{Metadata, PatchScope, ResourceId, ResourceSpec};

    fn patch(id: &str, labels: &[(&str, &str)], data: &str) -> Resource<ConfigPatch> {
        let mut meta = Metadata::new(ResourceId::new("default", ConfigPatch::KIND, id));
        for (k, v) in labels {
            meta = meta.with_label(*k, *v);
        }
        Resource::new(
            meta,
            ConfigPatch {
                scope: PatchScope::Cluster,
                data: data.to_string(),
                compressed: false,
            },
        )
    }

    #[test]
    fn orders_cluster_then_machine_set_then_cluster_machine_then_machine() {
        let patches = vec![
            patch("p-machine", &[(labels::MACHINE, "m1")], "machine"),
            patch("p-cm", &[(labels::CLUSTER_MACHINE, "m1")], "cluster-machine"),
            patch("p-cluster", &[(labels::CLUSTER, "c1")], "cluster"),
            patch("p-ms", &[(labels::MACHINE_SET, "ms1")], "machine-set"),
        ];
        let aggregator = PatchAggregator::new(patches);
        let ordered = aggregator.patches_for("m1", "ms1", "c1");
        let data: Vec<&str> = ordered.iter().map(|p| p.spec.data.as_str()).collect();
        assert_eq!(data, vec!["cluster", "machine-set", "cluster-machine", "machine"]);
    }

    #[test]
    fn cluster_scoped_patch_excluded_once_it_also_carries_a_machine_set_label() {
        let patches = vec![patch(
            "p1",
            &[(labels::CLUSTER, "c1"), (labels::MACHINE_SET, "ms1")],
            "both",
        )];
        let aggregator = PatchAggregator::new(patches);
        let ordered = aggregator.patches_for("m1", "ms1", "c1");
        assert_eq!(ordered.len(), 1);
        assert_eq!(ordered[0].spec.data, "both");
    }

    #[test]
    fn tearing_down_patches_are_dropped() {
        let mut p = patch("p1", &[(labels::CLUSTER, "c1")], "x");
        p.metadata.phase = Phase::TearingDown;
        let aggregator = PatchAggregator::new(vec![p]);
        assert!(aggregator.patches_for("m1", "ms1", "c1").is_empty());
    }

    #[test]
    fn fingerprint_is_stable_for_the_same_ordered_inputs() {
        let patches = vec![patch("p1", &[(labels::CLUSTER, "c1")], "x")];
        let aggregator = PatchAggregator::new(patches);
        let a = aggregator.fingerprint_for("m1", "ms1", "c1");
        let b = aggregator.fingerprint_for("m1", "ms1", "c1");
        assert_eq!(a, b);
    }
}
