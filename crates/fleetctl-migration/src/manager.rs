//! Ordered, resumable migration runner.
//!
//! The manager persists the last applied migration id as a `DbVersion`
//! singleton in the resource store itself, so the next `apply_pending`
//! call — whether that's the next process start after a crash, or the
//! next reconcile tick — resumes from wherever the last run left off
//! rather than needing an external checkpoint file.

use fleetctl_store::Store;
use fleetctl_types::{DbVersion, Metadata, Resource, ResourceId, ResourceSpec};
use tracing::info;

use crate::error::Error;
use crate::migration::Migration;
use crate::Result;

/// Owner tag the manager writes the `DbVersion` singleton under. Matches
/// `Metadata::owner`'s documented migration exception: every other writer
/// of a resource must match the creating owner, but the version singleton
/// is always written by whichever migration run last touched it.
const MIGRATION_OWNER: &str = "fleetctl-migration";
const DB_VERSION_NAMESPACE: &str = "system";
const DB_VERSION_ID: &str = "singleton";

/// Runtime knobs for one `apply_pending` call.
#[derive(Debug, Clone, Default)]
pub struct MigrationRunConfig {
    /// Stop after applying this id, even if later migrations are
    /// registered. `None` applies everything pending.
    pub max_version: Option<u32>,
    /// When set, only migrations whose name contains this substring run;
    /// everything else is skipped without advancing the persisted
    /// version past a skipped id. Used to re-run a single migration in
    /// isolation during development.
    pub filter: Option<String>,
}

pub struct MigrationManager<S> {
    store: S,
    migrations: Vec<Box<dyn Migration<S>>>,
}

impl<S: Store> MigrationManager<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            migrations: Vec::new(),
        }
    }

    /// Registers a migration. Rejects a duplicate id and keeps the
    /// internal list sorted by id so `apply_pending` can walk it in
    /// order.
    pub fn register(&mut self, migration: Box<dyn Migration<S>>) -> Result<()> {
        if self.migrations.iter().any(|m| m.id() == migration.id()) {
            return Err(Error::Duplicate(migration.id()));
        }
        self.migrations.push(migration);
        self.migrations.sort_by_key(|m| m.id());
        Ok(())
    }

    fn version_id() -> ResourceId {
        ResourceId::new(DB_VERSION_NAMESPACE, DbVersion::KIND, DB_VERSION_ID)
    }

    pub async fn current_version(&self) -> Result<u32> {
        match self.store.get::<DbVersion>(&Self::version_id()).await {
            Ok(resource) => Ok(resource.spec.applied),
            Err(err) if err.is_not_found() => Ok(0),
            Err(err) => Err(err.into()),
        }
    }

    async fn persist_version(&self, applied: u32) -> Result<()> {
        let id = Self::version_id();
        match self.store.get::<DbVersion>(&id).await {
            Ok(mut current) => {
                current.spec.applied = applied;
                self.store.update(current, MIGRATION_OWNER, None).await?;
            }
            Err(err) if err.is_not_found() => {
                let resource = Resource::new(Metadata::new(id), DbVersion { applied });
                self.store.create(resource, Some(MIGRATION_OWNER)).await?;
            }
            Err(err) => return Err(err.into()),
        }
        Ok(())
    }

    /// Applies every registered migration with id greater than the
    /// persisted version, in ascending order, persisting the new version
    /// after each one. Returns the version reached.
    ///
    /// Aborts with `Error::Gap` if the first pending migration's id isn't
    /// exactly `current + 1` — running `config.filter` skips do not
    /// advance the persisted version, so a subsequent unfiltered run
    /// still sees the gap and will not silently skip it.
    pub async fn apply_pending(&self, config: &MigrationRunConfig) -> Result<u32> {
        let mut current = self.current_version().await?;

        let highest_known = self.migrations.iter().map(|m| m.id()).max().unwrap_or(0);
        if current > highest_known {
            return Err(Error::Downgrade {
                persisted: current,
                highest_known,
            });
        }

        for migration in self.migrations.iter().filter(|m| m.id() > current) {
            if let Some(max) = config.max_version {
                if migration.id() > max {
                    break;
                }
            }
            if let Some(filter) = &config.filter {
                if !migration.name().contains(filter.as_str()) {
                    continue;
                }
            }
            if migration.id() != current + 1 {
                return Err(Error::Gap {
                    expected: current + 1,
                    found: migration.id(),
                });
            }

            info!(id = migration.id(), name = migration.name(), "applying migration");
            migration.apply(&self.store).await?;

            current = migration.id();
            self.persist_version(current).await?;
        }

        Ok(current)
    }
}
