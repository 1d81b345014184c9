//! Error types for the reconciliation engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] fleetctl_store::StoreError),

    /// Etcd member lists disagreed across control-plane nodes.
    #[error("etcd members don't match")]
    EtcdMembersMismatch,

    /// A Talos RPC needed to assess etcd health failed.
    #[error("talos rpc to {node} failed: {source}")]
    TalosRpc {
        node: String,
        #[source]
        source: anyhow::Error,
    },

    /// Control-plane scale-down would break etcd quorum.
    #[error("scale-down of {machine_id} in cluster {cluster_id} would break etcd quorum")]
    QuorumUnsafe { cluster_id: String, machine_id: String },
}

pub type Result<T> = std::result::Result<T, Error>;
