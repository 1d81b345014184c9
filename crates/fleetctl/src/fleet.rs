//! `FleetController`: the process-level facade wiring the audit wrapper,
//! hook registry, reconciliation engines, and migration manager around
//! one resource state store.
//!
//! This is the seam an operator-facing binary (out of scope here) would
//! hold onto: one per deployment, constructed once at startup after config
//! load and migration, then driven by a reconcile loop per machine set and
//! a migration run on upgrade.

use fleetctl_audit::{AuditEventStore, AuditedStore, HookRegistry};
use fleetctl_migration::{Migration, MigrationManager, MigrationRunConfig};
use fleetctl_reconcile::etcd::TalosClientFactory;
use fleetctl_reconcile::ReconcileOutcome;
use fleetctl_store::Store;

use crate::hooks::register_default_hooks;
use crate::Result;

/// Owner string this controller writes under. Every `fleetctl` process
/// in a deployment should use the same owner so a restart can resume
/// ownership of the resources it was already reconciling; a different
/// owner (a second controller binary, a human `kubectl`-equivalent)
/// is rejected by the store's owner enforcement.
pub const DEFAULT_OWNER: &str = "fleetctl";

pub struct FleetController<S> {
    store: AuditedStore<S>,
    owner: String,
}

impl<S: Store> FleetController<S> {
    /// Wraps `inner` with a fresh hook registry (populated with the
    /// built-in fleet-model hooks) and the given audit event store.
    pub fn new(inner: S, events: AuditEventStore, owner: impl Into<String>) -> Result<Self> {
        let hooks = HookRegistry::new();
        register_default_hooks(&hooks)?;
        Ok(Self {
            store: AuditedStore::new(inner, hooks, events),
            owner: owner.into(),
        })
    }

    /// The audited store every reconciler, migration, and direct caller
    /// should go through — never the raw, unaudited inner store.
    pub fn store(&self) -> &AuditedStore<S> {
        &self.store
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Runs one reconcile pass for `machine_set_id`.
    /// Callers re-invoke this on every watch wakeup for the machine set;
    /// convergence is iterative.
    pub async fn reconcile_machine_set(
        &self,
        namespace: &str,
        machine_set_id: &str,
        talos: &dyn TalosClientFactory,
    ) -> Result<ReconcileOutcome> {
        let outcome =
            fleetctl_reconcile::reconcile_once(&self.store, namespace, machine_set_id, &self.owner, talos).await?;
        Ok(outcome)
    }

    /// Builds a migration manager bound to this controller's audited
    /// store. Migrations are free to bypass hooks that would otherwise
    /// fire on their writes by registering no hook for the kinds they
    /// touch in bulk — the audit wrapper only logs what's hooked.
    pub fn migrations(self) -> MigrationRunner<S> {
        MigrationRunner {
            manager: MigrationManager::new(self.store),
        }
    }
}

/// Thin wrapper so call sites don't need to import `fleetctl-migration`
/// directly just to register and run migrations against a controller's
/// store.
pub struct MigrationRunner<S> {
    manager: MigrationManager<AuditedStore<S>>,
}

impl<S: Store> MigrationRunner<S> {
    pub fn register(&mut self, migration: Box<dyn Migration<AuditedStore<S>>>) -> Result<()> {
        self.manager.register(migration)?;
        Ok(())
    }

    pub async fn current_version(&self) -> Result<u32> {
        Ok(self.manager.current_version().await?)
    }

    pub async fn apply_pending(&self, config: &MigrationRunConfig) -> Result<u32> {
        Ok(self.manager.apply_pending(config).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetctl_audit::AuditStoreConfig;
    use fleetctl_store::memory::MemoryStore;
    use fleetctl_types::{labels, Cluster, Machine, MachineSet, MachineSetNode, Metadata, Resource, ResourceId, ResourceSpec, Role, Strategy};

    async fn controller() -> FleetController<MemoryStore> {
        let events = AuditEventStore::open(":memory:", AuditStoreConfig::default()).await.unwrap();
        FleetController::new(MemoryStore::new(), events, DEFAULT_OWNER).unwrap()
    }

    struct NoTalos;
    #[async_trait::async_trait]
    impl TalosClientFactory for NoTalos {
        async fn connect(
            &self,
            _endpoint: &fleetctl_reconcile::etcd::TalosEndpoint,
        ) -> anyhow::Result<Box<dyn fleetctl_reconcile::etcd::TalosClient>> {
            Err(anyhow::anyhow!("no talos client configured for this test"))
        }
    }

    /// Registering a create hook for `MachineSet`, creating one, produces
    /// exactly one audited row carrying the session's actor email; a
    /// structurally identical re-submission via `update` adds none.
    #[tokio::test]
    async fn machine_set_create_is_audited_once_then_update_is_silent_when_unchanged() {
        let controller = controller().await;
        let session = fleetctl_audit::Session {
            email: Some("u@x".into()),
            ..Default::default()
        };

        let cluster = Resource::new(
            Metadata::new(ResourceId::new("default", Cluster::KIND, "c1")),
            Cluster {
                kubernetes_version: "1.30.0".into(),
                talos_version: "1.7.0".into(),
                backup_enabled: false,
                features: Default::default(),
            },
        );
        controller.store().create(cluster, Some(DEFAULT_OWNER)).await.unwrap();

        let machine_set = Resource::new(
            Metadata::new(ResourceId::new("default", MachineSet::KIND, "m1")).with_label(labels::CLUSTER, "c1"),
            MachineSet {
                role: Role::Worker,
                update_strategy: Strategy::Unset,
                delete_strategy: Strategy::Unset,
                allocation: None,
                bootstrap: None,
            },
        );
        let created = fleetctl_audit::session::with_session(session, controller.store().create(machine_set, Some(DEFAULT_OWNER)))
            .await
            .unwrap();

        let rows: Vec<_> = controller
            .store()
            .events()
            .reader(0, i64::MAX)
            .await
            .unwrap()
            .collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].event_type, fleetctl_audit::EventType::Create);
        assert_eq!(rows[0].resource_id.as_deref(), Some("m1"));
        assert_eq!(rows[0].data.actor_email(), Some("u@x"));

        // Re-submitting the identical spec via update must not add a row.
        controller.store().update(created, DEFAULT_OWNER, None).await.unwrap();
        let rows: Vec<_> = controller
            .store()
            .events()
            .reader(0, i64::MAX)
            .await
            .unwrap()
            .collect();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn reconcile_machine_set_runs_through_the_audited_store() {
        let controller = controller().await;
        let cluster = Resource::new(
            Metadata::new(ResourceId::new("default", Cluster::KIND, "c1")),
            Cluster {
                kubernetes_version: "1.30.0".into(),
                talos_version: "1.7.0".into(),
                backup_enabled: false,
                features: Default::default(),
            },
        );
        controller.store().create(cluster, Some(DEFAULT_OWNER)).await.unwrap();

        let machine_set = Resource::new(
            Metadata::new(ResourceId::new("default", MachineSet::KIND, "ms1")).with_label(labels::CLUSTER, "c1"),
            MachineSet {
                role: Role::Worker,
                update_strategy: Strategy::Unset,
                delete_strategy: Strategy::Unset,
                allocation: None,
                bootstrap: None,
            },
        );
        controller.store().create(machine_set, Some(DEFAULT_OWNER)).await.unwrap();

        let node = Resource::new(
            Metadata::new(ResourceId::new("default", MachineSetNode::KIND, "a"))
                .with_label(labels::MACHINE_SET, "ms1")
                .with_label(labels::CLUSTER, "c1"),
            MachineSetNode { machine_id: "a".into() },
        );
        controller.store().create(node, Some(DEFAULT_OWNER)).await.unwrap();
        let machine = Resource::new(
            Metadata::new(ResourceId::new("default", Machine::KIND, "a")),
            Machine { management_address: "10.0.0.1".into(), reachable: true },
        );
        controller.store().create(machine, Some(DEFAULT_OWNER)).await.unwrap();

        let outcome = controller.reconcile_machine_set("default", "ms1", &NoTalos).await.unwrap();
        assert_eq!(outcome.applied, vec![fleetctl_reconcile::Operation::Create("a".into())]);
    }
}
