//! # fleetctl-types: core resource model for the fleet control plane
//!
//! This crate contains the shared types used across fleetctl:
//! - Resource envelope and metadata ([`Metadata`], [`Resource`], [`Phase`])
//! - Label/annotation well-known keys ([`labels`])
//! - Update/delete strategies ([`Strategy`], [`Quota`])
//! - The resource specs touched by the reconciliation engine and audit
//!   pipeline: [`Cluster`], [`MachineSet`], [`MachineSetNode`], [`Machine`],
//!   [`ClusterMachine`], [`ClusterMachineConfigPatches`],
//!   [`ClusterMachineConfigStatus`], [`ClusterMachineStatus`],
//!   [`ConfigPatch`], [`LoadBalancerStatus`], [`DbVersion`].
//!
//! None of these types perform I/O; persistence is the job of the resource
//! state store (see `fleetctl-store`).

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

pub mod labels;

/// Coarse lifecycle state shared by every resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Running,
    TearingDown,
}

impl Default for Phase {
    fn default() -> Self {
        Phase::Running
    }
}

impl Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Running => write!(f, "running"),
            Phase::TearingDown => write!(f, "tearing_down"),
        }
    }
}

/// Identity of a resource: every entity lives in a namespace, has a type
/// name, and an id unique within `(namespace, type)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId {
    pub namespace: String,
    pub kind: String,
    pub id: String,
}

impl ResourceId {
    pub fn new(namespace: impl Into<String>, kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            kind: kind.into(),
            id: id.into(),
        }
    }
}

impl Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.kind, self.id)
    }
}

/// Metadata carried by every resource: version, phase, labels, annotations,
/// finalizers, and owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub id: ResourceId,
    /// Monotonically increasing per-write version, assigned by the store.
    pub version: u64,
    pub phase: Phase,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    /// String tags that block destruction until removed by their owner.
    pub finalizers: Vec<String>,
    /// Only the owner may write once set (migrations are the documented
    /// exception).
    pub owner: Option<String>,
}

impl Metadata {
    pub fn new(id: ResourceId) -> Self {
        Self {
            id,
            version: 0,
            phase: Phase::Running,
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            finalizers: Vec::new(),
            owner: None,
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    pub fn has_label(&self, key: &str) -> bool {
        self.labels.contains_key(key)
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }

    pub fn has_annotation(&self, key: &str) -> bool {
        self.annotations.contains_key(key)
    }

    pub fn has_finalizer(&self, tag: &str) -> bool {
        self.finalizers.iter().any(|f| f == tag)
    }

    /// `locked` is carried as an annotation, not a label — it's metadata
    /// about the resource's update/teardown eligibility, not a selector key.
    pub fn is_locked(&self) -> bool {
        self.has_annotation(labels::LOCKED)
    }
}

/// A resource is metadata plus a typed spec. Reconcile logic never mutates
/// `Resource<T>` directly; it goes through the state store so that version
/// CAS and owner enforcement apply uniformly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource<T> {
    pub metadata: Metadata,
    pub spec: T,
}

impl<T> Resource<T> {
    pub fn new(metadata: Metadata, spec: T) -> Self {
        Self { metadata, spec }
    }
}

/// Update/delete strategy for a `MachineSet`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    Unset,
    Rolling { max_parallelism: u32 },
}

impl Strategy {
    /// Returns the initial quota units this strategy grants a reconcile,
    /// with `Unset` represented as unlimited (`-1`).
    pub fn initial_quota(self) -> i32 {
        match self {
            Strategy::Unset => -1,
            Strategy::Rolling { max_parallelism } => max_parallelism as i32,
        }
    }
}

/// Per-reconcile budget for destructive or disruptive operations. A quota
/// of `-1` means unlimited and is never consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota(i32);

impl Default for Quota {
    fn default() -> Self {
        Quota::UNLIMITED
    }
}

impl Quota {
    pub const UNLIMITED: Quota = Quota(-1);

    pub fn new(initial: i32, in_flight: usize) -> Self {
        if initial < 0 {
            return Quota::UNLIMITED;
        }
        Quota((initial - in_flight as i32).max(0))
    }

    pub fn is_unlimited(self) -> bool {
        self.0 < 0
    }

    pub fn remaining(self) -> i32 {
        self.0
    }

    pub fn has_capacity(self) -> bool {
        self.is_unlimited() || self.0 > 0
    }

    /// Consumes one unit, returning `true` if the consumption succeeded.
    /// Unlimited quotas always succeed without changing state.
    pub fn consume(&mut self) -> bool {
        if self.is_unlimited() {
            return true;
        }
        if self.0 > 0 {
            self.0 -= 1;
            true
        } else {
            false
        }
    }
}

/// The role a `MachineSet` plays within its cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    ControlPlane,
    Worker,
}

impl Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::ControlPlane => write!(f, "control-plane"),
            Role::Worker => write!(f, "worker"),
        }
    }
}

/// Static sizing for a `MachineSet`; absent means the set is sized purely by
/// its membership (`MachineSetNode`s).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineAllocation {
    pub count: u32,
}

/// Control-plane-only bootstrap parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapSpec {
    pub cluster_uuid: String,
}

/// Root of a cluster's resource tree. Teardown cascades to its machine sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub kubernetes_version: String,
    pub talos_version: String,
    pub backup_enabled: bool,
    pub features: BTreeMap<String, bool>,
}

/// A homogeneous group of machines within a cluster: control plane or
/// worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineSet {
    pub role: Role,
    pub update_strategy: Strategy,
    pub delete_strategy: Strategy,
    pub allocation: Option<MachineAllocation>,
    pub bootstrap: Option<BootstrapSpec>,
}

/// Desired-membership record: the fleet wants this physical machine in this
/// machine set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineSetNode {
    pub machine_id: String,
}

/// Physical/virtual asset registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    pub management_address: String,
    pub reachable: bool,
}

/// Actual realized membership of a machine in a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterMachine {
    pub kubernetes_version: String,
    /// Fingerprint of the ordered input patches, used as a sentinel for
    /// "config drift requires update".
    pub inputs_version: String,
}

/// Sibling of `ClusterMachine`: the aggregated patch list (or compressed
/// equivalent) applied to generate the Talos config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterMachineConfigPatches {
    pub patches: Vec<String>,
    pub compressed: bool,
}

/// Last successfully applied `ClusterMachine` version, plus any application
/// error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterMachineConfigStatus {
    pub applied_version: u64,
    pub cluster_machine_config_sha256: String,
    pub last_config_error: Option<String>,
}

/// Liveness + readiness + connectivity of the realized machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MachineStage {
    Unknown,
    Booting,
    Running,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterMachineStatus {
    pub stage: MachineStage,
    pub ready: bool,
    pub connected: bool,
}

/// Scope a `ConfigPatch` matches. At most one scope level may match a given
/// patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatchScope {
    Cluster,
    MachineSet,
    ClusterMachine,
    Machine,
}

/// A text/compressed Talos config fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigPatch {
    pub scope: PatchScope,
    pub data: String,
    pub compressed: bool,
}

/// Per-cluster health of the control-plane load balancer; gates
/// non-emergency control-plane scale-down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancerStatus {
    pub healthy: bool,
}

/// Singleton holding the currently applied migration index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbVersion {
    pub applied: u32,
}

/// Coarse derived health of a `MachineSet`, computed by the status reducer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MachineSetPhase {
    ScalingUp,
    ScalingDown,
    Reconfiguring,
    Running,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineCounts {
    pub total: u32,
    pub healthy: u32,
    pub connected: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineSetStatus {
    pub phase: MachineSetPhase,
    pub requested: u32,
    pub machines: MachineCounts,
    pub ready: bool,
    pub config_hash: String,
}

/// Identifies a resource spec's type name for the store and the audit hook
/// registry. Implementors are the `T` in `Resource<T>`.
pub trait ResourceSpec: Clone + std::fmt::Debug + PartialEq + Send + Sync + 'static {
    /// Type name as recorded in `ResourceId::kind` and used as the audit
    /// hook registry key.
    const KIND: &'static str;
}

macro_rules! impl_resource_spec {
    ($($ty:ty => $kind:expr),+ $(,)?) => {
        $(impl ResourceSpec for $ty {
            const KIND: &'static str = $kind;
        })+
    };
}

impl_resource_spec!(
    Cluster => "Cluster",
    MachineSet => "MachineSet",
    MachineSetNode => "MachineSetNode",
    Machine => "Machine",
    ClusterMachine => "ClusterMachine",
    ClusterMachineConfigPatches => "ClusterMachineConfigPatches",
    ClusterMachineConfigStatus => "ClusterMachineConfigStatus",
    ClusterMachineStatus => "ClusterMachineStatus",
    ConfigPatch => "ConfigPatch",
    LoadBalancerStatus => "LoadBalancerStatus",
    DbVersion => "DbVersion",
);

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Strategy::Unset => -1; "unset is unlimited")]
    #[test_case(Strategy::Rolling { max_parallelism: 1 } => 1; "rolling one")]
    #[test_case(Strategy::Rolling { max_parallelism: 5 } => 5; "rolling five")]
    fn strategy_initial_quota_cases(strategy: Strategy) -> i32 {
        strategy.initial_quota()
    }

    #[test]
    fn quota_unlimited_never_depletes() {
        let mut q = Quota::UNLIMITED;
        for _ in 0..100 {
            assert!(q.consume());
        }
        assert!(q.is_unlimited());
    }

    #[test]
    fn quota_clamped_to_zero_when_in_flight_exceeds_initial() {
        let q = Quota::new(2, 5);
        assert_eq!(q.remaining(), 0);
        assert!(!q.has_capacity());
    }

    #[test]
    fn quota_consume_depletes_to_zero() {
        let mut q = Quota::new(1, 0);
        assert!(q.consume());
        assert!(!q.consume());
        assert_eq!(q.remaining(), 0);
    }

    #[test]
    fn resource_survives_a_json_round_trip() {
        let id = ResourceId::new("default", Machine::KIND, "m1");
        let resource = Resource::new(
            Metadata::new(id).with_label(labels::ROLE, "worker"),
            Machine {
                management_address: "10.0.0.1".into(),
                reachable: true,
            },
        );
        let encoded = serde_json::to_string(&resource).unwrap();
        let decoded: Resource<Machine> = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, resource);
    }

    #[test]
    fn metadata_locked_annotation_detected() {
        let id = ResourceId::new("default", "MachineSetNode", "m1");
        let meta = Metadata::new(id).with_annotation(labels::LOCKED, "true");
        assert!(meta.is_locked());
    }

    #[test]
    fn strategy_initial_quota_unset_is_unlimited() {
        assert_eq!(Strategy::Unset.initial_quota(), -1);
        assert_eq!(Strategy::Rolling { max_parallelism: 3 }.initial_quota(), 3);
    }

    proptest::proptest! {
        #[test]
        fn quota_remaining_never_goes_negative(initial in 0i32..1000, in_flight in 0usize..1000) {
            let q = Quota::new(initial, in_flight);
            proptest::prop_assert!(q.remaining() >= 0);
        }

        #[test]
        fn quota_consume_never_exceeds_remaining(initial in 0i32..50) {
            let mut q = Quota::new(initial, 0);
            let mut consumed = 0;
            while q.consume() {
                consumed += 1;
                proptest::prop_assert!(consumed <= initial);
            }
            proptest::prop_assert_eq!(consumed, initial);
        }
    }
}
