//! `AuditedStore<S>`: wraps any `Store` with after-the-fact audit logging.
//!
//! Mutating operations — `create`, `update`, `update_with_conflicts`,
//! `destroy` — perform the underlying write first. Only once that write
//! has *succeeded* does the wrapper run the matching hook (if one is
//! registered for `T::KIND`) and, unless the hook returns `NoLog`, append
//! an event. A failed write never produces an event; a failed event
//! append never undoes an already-committed write (see `error` design:
//! audit-write failure is logged, not surfaced as a write failure to the
//! caller — see `append`).
//!
//! All other operations — `get`, `list`, `teardown`, `add_finalizer`,
//! `remove_finalizer`, `watch_for`, `watch_kind` — pass straight through
//! to the inner store. `teardown` in particular is a distinct store
//! method driving a phase transition, not a hooked mutation; an
//! `Update` call that transitions a resource into `Phase::TearingDown`
//! is what produces a `teardown` event, via the update hook inspecting
//! old/new phase.

use async_trait::async_trait;
use fleetctl_types::{Phase, Resource, ResourceId, ResourceSpec};
use tokio::sync::broadcast;
use tracing::warn;

use crate::event::AuditEvent;
use crate::hook::{HookOutcome, HookRegistry};
use crate::session;
use crate::store::AuditEventStore;
use fleetctl_store::{LabelQuery, Result, Store, StoreError, WatchEvent};

pub struct AuditedStore<S> {
    inner: S,
    hooks: HookRegistry,
    events: AuditEventStore,
}

impl<S: Store> AuditedStore<S> {
    pub fn new(inner: S, hooks: HookRegistry, events: AuditEventStore) -> Self {
        Self { inner, hooks, events }
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    /// Direct read access to the underlying event store — the `Reader`/
    /// `HasData` operations, for callers (tests, an audit-query
    /// API) that need to inspect what's been logged rather than cause
    /// more of it.
    pub fn events(&self) -> &AuditEventStore {
        &self.events
    }

    /// Appends `event`. An audit write failure is logged, not
    /// surfaced: the underlying state write this event describes has
    /// already committed by the time this runs.
    async fn append(&self, event: AuditEvent) {
        if let Err(err) = self.events.write(&event).await {
            warn!(error = %err, event_type = %event.event_type, resource_type = %event.resource_type, "audit event append failed");
        }
    }

    fn timestamp_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

#[async_trait]
impl<S: Store> Store for AuditedStore<S> {
    async fn create<T: ResourceSpec>(
        &self,
        resource: Resource<T>,
        owner: Option<&str>,
    ) -> Result<Resource<T>> {
        let created = self.inner.create(resource, owner).await?;

        if let Some(hook) = self.hooks.get_create::<T>().map_err(|e| StoreError::Backend(e.into()))? {
            let session = session::current_or_internal_agent();
            if let HookOutcome::Log(mut data) = hook(&created, Some(&session)) {
                data.session.get_or_insert(session);
                let event = AuditEvent::new(crate::event::EventType::Create, T::KIND, Self::timestamp_ms(), data);
                self.append(event).await;
            }
        }
        Ok(created)
    }

    async fn update<T: ResourceSpec>(
        &self,
        resource: Resource<T>,
        owner: &str,
        expected_phase: Option<Phase>,
    ) -> Result<Resource<T>> {
        let hook = self.hooks.get_update::<T>().map_err(|e| StoreError::Backend(e.into()))?;

        // Tolerate not-found: a hook on a resource that doesn't exist yet
        // (shouldn't happen for `update`, but the store contract only
        // promises `update` targets an existing resource) just means
        // there's no "old" to diff against.
        let old = if hook.is_some() {
            self.inner.get::<T>(&resource.metadata.id).await.ok()
        } else {
            None
        };

        let updated = self.inner.update(resource, owner, expected_phase).await?;

        if let Some(hook) = hook {
            let Some(old) = old else {
                return Ok(updated);
            };
            // Invariant (testable property 5): a write that doesn't
            // actually change the spec emits no event.
            if old.spec == updated.spec {
                return Ok(updated);
            }
            let event_type = if old.metadata.phase != Phase::TearingDown
                && updated.metadata.phase == Phase::TearingDown
            {
                crate::event::EventType::Teardown
            } else {
                crate::event::EventType::Update
            };
            let session = session::current_or_internal_agent();
            if let HookOutcome::Log(mut data) = hook(&old, &updated, Some(&session)) {
                data.session.get_or_insert(session);
                let event = AuditEvent::new(event_type, T::KIND, Self::timestamp_ms(), data);
                self.append(event).await;
            }
        }
        Ok(updated)
    }

    async fn update_with_conflicts<T, F>(&self, id: &ResourceId, owner: &str, mut updater: F) -> Result<Resource<T>>
    where
        T: ResourceSpec,
        F: FnMut(&mut Resource<T>) -> Result<()> + Send,
    {
        let hook = self
            .hooks
            .get_update_with_conflicts::<T>()
            .map_err(|e| StoreError::Backend(e.into()))?;

        // The old value is captured inside the updater closure, before
        // the caller's own mutation runs, matching the store's retry
        // semantics: on a lost CAS race the closure re-runs against a
        // fresher read, and we want the `old` the hook sees to be the
        // one that immediately preceded the write that actually landed.
        let captured_old = std::sync::Mutex::new(None);
        let updated = if hook.is_some() {
            self.inner
                .update_with_conflicts(id, owner, |current: &mut Resource<T>| {
                    *captured_old.lock().unwrap() = Some(current.clone());
                    updater(current)
                })
                .await?
        } else {
            self.inner.update_with_conflicts(id, owner, updater).await?
        };

        if let Some(hook) = hook {
            let Some(old) = captured_old.into_inner().unwrap() else {
                return Ok(updated);
            };
            if old.spec == updated.spec {
                return Ok(updated);
            }
            let session = session::current_or_internal_agent();
            if let HookOutcome::Log(mut data) = hook(&old, &updated, Some(&session)) {
                data.session.get_or_insert(session);
                let event = AuditEvent::new(
                    crate::event::EventType::UpdateWithConflicts,
                    T::KIND,
                    Self::timestamp_ms(),
                    data,
                );
                self.append(event).await;
            }
        }
        Ok(updated)
    }

    async fn destroy<T: ResourceSpec>(&self, id: &ResourceId, owner: Option<&str>) -> Result<()> {
        self.inner.destroy::<T>(id, owner).await?;

        if let Some(hook) = self.hooks.get_destroy::<T>().map_err(|e| StoreError::Backend(e.into()))? {
            let session = session::current_or_internal_agent();
            if let HookOutcome::Log(mut data) = hook(id, Some(&session)) {
                data.session.get_or_insert(session);
                let event = AuditEvent::new(crate::event::EventType::Destroy, T::KIND, Self::timestamp_ms(), data);
                self.append(event).await;
            }
        }
        Ok(())
    }

    async fn get<T: ResourceSpec>(&self, id: &ResourceId) -> Result<Resource<T>> {
        self.inner.get(id).await
    }

    async fn list<T: ResourceSpec>(&self, namespace: &str, query: &LabelQuery) -> Result<Vec<Resource<T>>> {
        self.inner.list(namespace, query).await
    }

    async fn teardown<T: ResourceSpec>(&self, id: &ResourceId) -> Result<Resource<T>> {
        self.inner.teardown(id).await
    }

    async fn add_finalizer<T: ResourceSpec>(&self, id: &ResourceId, tag: &str) -> Result<()> {
        self.inner.add_finalizer::<T>(id, tag).await
    }

    async fn remove_finalizer<T: ResourceSpec>(&self, id: &ResourceId, tag: &str) -> Result<()> {
        self.inner.remove_finalizer::<T>(id, tag).await
    }

    async fn watch_for<T: ResourceSpec>(&self, id: &ResourceId) -> Result<broadcast::Receiver<WatchEvent<T>>> {
        self.inner.watch_for(id).await
    }

    async fn watch_kind<T: ResourceSpec>(&self, namespace: &str) -> Result<broadcast::Receiver<WatchEvent<T>>> {
        self.inner.watch_kind(namespace).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::AuditEventData;
    use crate::store::AuditStoreConfig;
    use fleetctl_store::memory::MemoryStore;
    use fleetctl_types::{Machine, Metadata};
    use std::sync::Arc;

    fn machine(id: &str) -> Resource<Machine> {
        Resource::new(
            Metadata::new(ResourceId::new("default", Machine::KIND, id)),
            Machine {
                management_address: "10.0.0.1".into(),
                reachable: true,
            },
        )
    }

    async fn audited() -> AuditedStore<MemoryStore> {
        let events = AuditEventStore::open(":memory:", AuditStoreConfig::default()).await.unwrap();
        AuditedStore::new(MemoryStore::new(), HookRegistry::new(), events)
    }

    #[tokio::test]
    async fn create_without_hook_is_not_logged() {
        let store = audited().await;
        store.create(machine("m1"), Some("ctrl")).await.unwrap();
        assert!(!store.events.has_data().await.unwrap());
    }

    #[tokio::test]
    async fn create_with_hook_logs_after_write_succeeds() {
        let store = audited().await;
        store
            .hooks
            .register_create::<Machine>(Arc::new(|r, _s| {
                HookOutcome::Log(AuditEventData {
                    machine: Some(crate::event::MachineRecord {
                        id: r.metadata.id.id.clone(),
                    }),
                    ..Default::default()
                })
            }))
            .unwrap();
        let created = store.create(machine("m1"), Some("ctrl")).await.unwrap();
        // The hook observed the post-write resource (version assigned).
        assert_eq!(created.metadata.version, 1);
        assert!(store.events.has_data().await.unwrap());
    }

    #[tokio::test]
    async fn hook_returning_no_log_skips_event_but_write_still_happens() {
        let store = audited().await;
        store
            .hooks
            .register_create::<Machine>(Arc::new(|_r, _s| HookOutcome::NoLog))
            .unwrap();
        let created = store.create(machine("m1"), Some("ctrl")).await.unwrap();
        assert!(!store.events.has_data().await.unwrap());
        let got = store.get::<Machine>(&created.metadata.id).await.unwrap();
        assert_eq!(got, created);
    }

    #[tokio::test]
    async fn teardown_passes_through_unhooked() {
        let store = audited().await;
        store
            .hooks
            .register_update::<Machine>(Arc::new(|_old, _new, _s| {
                panic!("teardown must not invoke the update hook")
            }))
            .unwrap();
        let created = store.create(machine("m1"), Some("ctrl")).await.unwrap();
        store.teardown::<Machine>(&created.metadata.id).await.unwrap();
    }

    #[tokio::test]
    async fn update_with_structurally_equal_spec_emits_no_event() {
        let store = audited().await;
        store
            .hooks
            .register_update::<Machine>(Arc::new(|_old, new, _s| {
                HookOutcome::Log(AuditEventData {
                    machine: Some(crate::event::MachineRecord {
                        id: new.metadata.id.id.clone(),
                    }),
                    ..Default::default()
                })
            }))
            .unwrap();
        let created = store.create(machine("m1"), Some("ctrl")).await.unwrap();
        // Same spec, just resubmitted: no actual change.
        let mut resubmitted = created.clone();
        resubmitted.metadata.version = created.metadata.version;
        store.update(resubmitted, "ctrl", None).await.unwrap();
        assert!(!store.events.has_data().await.unwrap());
    }

    #[tokio::test]
    async fn update_teardown_transition_logs_as_teardown_event() {
        let store = audited().await;
        store
            .hooks
            .register_update::<Machine>(Arc::new(|_old, new, _s| {
                HookOutcome::Log(AuditEventData {
                    machine: Some(crate::event::MachineRecord {
                        id: new.metadata.id.id.clone(),
                    }),
                    ..Default::default()
                })
            }))
            .unwrap();
        let created = store.create(machine("m1"), Some("ctrl")).await.unwrap();
        let mut tearing_down = created.clone();
        tearing_down.metadata.phase = fleetctl_types::Phase::TearingDown;
        store.update(tearing_down, "ctrl", None).await.unwrap();

        let rows: Vec<_> = store.events.reader(0, i64::MAX).await.unwrap().collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].event_type, crate::event::EventType::Teardown);
    }
}
