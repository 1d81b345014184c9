//! A single ordered migration step against a resource state store.

use async_trait::async_trait;
use fleetctl_store::Store;

use crate::Result;

/// One schema or data migration, applied at most once per deployment.
///
/// Migrations are ordinary Rust, not SQL files: `apply` is handed the same
/// `Store` the rest of fleetctl uses, and is expected to call
/// `create`/`update`/`list` directly. `id` fixes the migration's position
/// in the sequence; gaps and duplicates are rejected at registration time
/// (see `MigrationManager::register`), not discovered mid-run.
#[async_trait]
pub trait Migration<S: Store>: Send + Sync {
    fn id(&self) -> u32;

    fn name(&self) -> &'static str;

    /// Applies this migration. Must be safe to retry from scratch if a
    /// previous run crashed before the manager persisted the new
    /// `DbVersion` — most migrations accomplish this by making their
    /// writes naturally idempotent (e.g. `list` then `create` only the
    /// missing resources) rather than by tracking partial progress.
    async fn apply(&self, store: &S) -> Result<()>;
}

/// A historical migration kept only to hold its numeric slot.
///
/// Deleting a migration outright would shift every later id down by one
/// and cause the manager to silently re-run migrations that already
/// applied under their old numbers. When a migration's effect is later
/// found to be unnecessary (superseded, reverted by a later migration,
/// or never actually needed in practice), replace it with a
/// `Tombstone` at the same id rather than removing the slot.
pub struct Tombstone {
    id: u32,
    name: &'static str,
}

impl Tombstone {
    pub fn new(id: u32, name: &'static str) -> Self {
        Self { id, name }
    }
}

#[async_trait]
impl<S: Store + Send + Sync> Migration<S> for Tombstone {
    fn id(&self) -> u32 {
        self.id
    }

    fn name(&self) -> &'static str {
        self.name
    }

    async fn apply(&self, _store: &S) -> Result<()> {
        Ok(())
    }
}
