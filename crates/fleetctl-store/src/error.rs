use fleetctl_types::ResourceId;
use thiserror::Error;

/// Errors surfaced by a `Store` implementation.
///
/// `NotFound`, `Conflict`, `PhaseConflict`, and `OwnerConflict` are the four
/// kinds callers are expected to distinguish and handle locally; everything
/// else is a transient store error retried by the caller on the next
/// reconcile tick.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(ResourceId),

    #[error("version conflict on {id}: expected {expected}, found {actual}")]
    Conflict {
        id: ResourceId,
        expected: u64,
        actual: u64,
    },

    #[error("phase conflict on {id}: expected {expected}, found {actual}")]
    PhaseConflict {
        id: ResourceId,
        expected: String,
        actual: String,
    },

    #[error("owner conflict on {id}: owned by {owner:?}, write attempted by {attempted_by}")]
    OwnerConflict {
        id: ResourceId,
        owner: Option<String>,
        attempted_by: String,
    },

    #[error("{id} has unexpected kind: wanted {wanted}, stored as {found}")]
    KindMismatch {
        id: ResourceId,
        wanted: &'static str,
        found: String,
    },

    #[error("destroy blocked on {id}: phase={phase}, finalizers={finalizers:?}")]
    DestroyBlocked {
        id: ResourceId,
        phase: String,
        finalizers: Vec<String>,
    },

    #[error("store backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}
