//! Aggregate error type for the fleetctl facade.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] fleetctl_store::StoreError),

    #[error(transparent)]
    Audit(#[from] fleetctl_audit::AuditError),

    #[error(transparent)]
    Reconcile(#[from] fleetctl_reconcile::Error),

    #[error(transparent)]
    Migration(#[from] fleetctl_migration::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
