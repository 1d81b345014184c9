//! The Etcd Safety Oracle: gates control-plane scale-down on etcd
//! quorum health.
//!
//! The actual Talos wire protocol is out of scope; this
//! module specifies the contract a Talos client collaborator must satisfy
//! (`TalosClient`) and the pure quorum arithmetic (`can_scale_down`) that
//! consumes it.

use std::collections::BTreeSet;

use async_trait::async_trait;
use fleetctl_store::{LabelQuery, Store};
use fleetctl_types::{labels, ClusterMachineStatus, Machine, Role, ResourceSpec};
use tracing::warn;

use crate::error::Error;
use crate::Result;

/// Where a control-plane node's Talos API is reachable: a unix socket for
/// test/sidecar deployments, or a TCP endpoint in production.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TalosEndpoint {
    Unix(String),
    Tcp(String),
}

impl TalosEndpoint {
    /// Parses a `Machine.management_address` into an endpoint. Addresses
    /// prefixed `unix://` are sockets; anything else is a host:port.
    pub fn parse(management_address: &str) -> Self {
        match management_address.strip_prefix("unix://") {
            Some(path) => TalosEndpoint::Unix(path.to_string()),
            None => TalosEndpoint::Tcp(management_address.to_string()),
        }
    }
}

/// One etcd member as reported back by a node's Talos API.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct EtcdMember {
    pub id: String,
}

/// The minimal Talos RPC surface the oracle needs. Production
/// implementations live outside this crate; tests supply a fake.
#[async_trait]
pub trait TalosClient: Send + Sync {
    async fn etcd_member_list(&self) -> anyhow::Result<BTreeSet<EtcdMember>>;
    async fn etcd_healthy(&self) -> anyhow::Result<bool>;
}

/// Connects to a node's Talos API at the given endpoint.
#[async_trait]
pub trait TalosClientFactory: Send + Sync {
    async fn connect(&self, endpoint: &TalosEndpoint) -> anyhow::Result<Box<dyn TalosClient>>;
}

/// Health of one etcd member as observed from its node's Talos API.
#[derive(Debug, Clone)]
pub struct MemberHealth {
    pub id: String,
    pub healthy: bool,
    pub error: Option<String>,
}

/// Cross-checked etcd status for one cluster's control-plane machine set.
#[derive(Debug, Clone, Default)]
pub struct EtcdStatus {
    pub members: Vec<MemberHealth>,
}

impl EtcdStatus {
    fn is_member(&self, machine_id: &str) -> bool {
        self.members.iter().any(|m| m.id == machine_id)
    }

    /// `CanScaleDown`: true if removing `machine_id` would leave a
    /// healthy majority behind. A machine that isn't an etcd member at all
    /// is always safe to remove from etcd's perspective.
    pub fn can_scale_down(&self, machine_id: &str) -> bool {
        if !self.is_member(machine_id) {
            return true;
        }
        let total = self.members.len();
        let healthy = self.members.iter().filter(|m| m.healthy).count();
        if healthy < total / 2 + 1 {
            return false;
        }
        let removed_was_healthy = self.members.iter().any(|m| m.id == machine_id && m.healthy);
        let total_after = total - 1;
        let healthy_after = healthy - usize::from(removed_was_healthy);
        if total_after == 0 {
            return true;
        }
        healthy_after >= total_after / 2 + 1
    }
}

/// Walks every control-plane `ClusterMachineStatus` in `cluster_id`, opens a
/// Talos client per node, and cross-checks that every node reports the same
/// member set.
pub async fn gather_status(
    store: &impl Store,
    namespace: &str,
    cluster_id: &str,
    factory: &dyn TalosClientFactory,
) -> Result<EtcdStatus> {
    let query = LabelQuery::new()
        .with_equals(labels::CLUSTER, cluster_id)
        .with_equals(labels::ROLE, Role::ControlPlane.to_string());
    let statuses = store.list::<ClusterMachineStatus>(namespace, &query).await?;

    let mut reference_members: Option<BTreeSet<EtcdMember>> = None;
    let mut members = Vec::with_capacity(statuses.len());

    for status in &statuses {
        let machine_id = status.metadata.id.id.clone();
        let machine = store
            .get::<Machine>(&fleetctl_types::ResourceId::new(namespace, Machine::KIND, &machine_id))
            .await?;
        let endpoint = TalosEndpoint::parse(&machine.spec.management_address);

        let client = factory
            .connect(&endpoint)
            .await
            .map_err(|source| Error::TalosRpc { node: machine_id.clone(), source })?;

        let member_list = client
            .etcd_member_list()
            .await
            .map_err(|source| Error::TalosRpc { node: machine_id.clone(), source })?;
        match &reference_members {
            None => reference_members = Some(member_list.clone()),
            Some(reference) if reference != &member_list => {
                return Err(Error::EtcdMembersMismatch);
            }
            Some(_) => {}
        }

        let (healthy, error) = match client.etcd_healthy().await {
            Ok(healthy) => (healthy, None),
            Err(err) => (false, Some(err.to_string())),
        };
        members.push(MemberHealth { id: machine_id, healthy, error });
    }

    if members.len() % 2 == 0 && !members.is_empty() {
        warn!(cluster_id, count = members.len(), "even-cardinality etcd membership");
    }

    Ok(EtcdStatus { members })
}
