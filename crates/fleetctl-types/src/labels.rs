//! Well-known label and annotation keys shared by every reconciler.

/// Links a resource to its owning cluster.
pub const CLUSTER: &str = "cluster";
/// Links a resource to its owning machine set.
pub const MACHINE_SET: &str = "machine-set";
/// Links a resource to a specific cluster machine.
pub const CLUSTER_MACHINE: &str = "cluster-machine";
/// Links a resource to a specific physical machine.
pub const MACHINE: &str = "machine";
/// `control-plane` or `worker`.
pub const ROLE: &str = "role";
/// Present on a `ClusterMachine` once its connectivity is established.
pub const CONNECTED: &str = "connected";

/// Annotation (not a label) present on a `MachineSetNode` to exempt it from
/// updates and teardown.
pub const LOCKED: &str = "locked";
/// Annotation key holding the `InputsVersion` fingerprint on a
/// `ClusterMachine`.
pub const INPUTS_VERSION: &str = "inputs-version";
