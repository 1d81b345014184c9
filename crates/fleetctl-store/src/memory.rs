//! An in-memory `Store` used by fleetctl's own test suites. Not a
//! deployment target: no persistence, no cross-process watch fan-out.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use fleetctl_types::{Phase, Resource, ResourceId, ResourceSpec};
use tokio::sync::broadcast;

use crate::error::{Result, StoreError};
use crate::query::LabelQuery;
use crate::{Store, WatchEvent};

type AnyBox = Box<dyn Any + Send + Sync>;

const WATCH_CHANNEL_CAPACITY: usize = 256;

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<ResourceId, AnyBox>>,
    channels: Mutex<HashMap<&'static str, AnyBox>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn channel<T: ResourceSpec>(&self) -> broadcast::Sender<WatchEvent<T>> {
        let mut channels = self.channels.lock().unwrap();
        let entry = channels
            .entry(T::KIND)
            .or_insert_with(|| Box::new(broadcast::channel::<WatchEvent<T>>(WATCH_CHANNEL_CAPACITY).0));
        entry
            .downcast_ref::<broadcast::Sender<WatchEvent<T>>>()
            .expect("channel registry corrupted: kind maps to wrong sender type")
            .clone()
    }

    fn publish<T: ResourceSpec>(&self, event: WatchEvent<T>) {
        // No active receivers is a normal, non-error condition.
        let _ = self.channel::<T>().send(event);
    }

    fn downcast<T: ResourceSpec>(id: &ResourceId, any: &AnyBox) -> Result<Resource<T>> {
        any.downcast_ref::<Resource<T>>()
            .cloned()
            .ok_or_else(|| StoreError::KindMismatch {
                id: id.clone(),
                wanted: T::KIND,
                found: id.kind.clone(),
            })
    }

    fn check_owner(id: &ResourceId, stored_owner: &Option<String>, owner: &str) -> Result<()> {
        match stored_owner {
            Some(o) if o != owner => Err(StoreError::OwnerConflict {
                id: id.clone(),
                owner: stored_owner.clone(),
                attempted_by: owner.to_string(),
            }),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create<T: ResourceSpec>(
        &self,
        mut resource: Resource<T>,
        owner: Option<&str>,
    ) -> Result<Resource<T>> {
        resource.metadata.id.kind = T::KIND.to_string();
        resource.metadata.version = 1;
        resource.metadata.phase = Phase::Running;
        resource.metadata.owner = owner.map(String::from);

        let mut entries = self.entries.lock().unwrap();
        if entries.contains_key(&resource.metadata.id) {
            return Err(StoreError::Conflict {
                id: resource.metadata.id.clone(),
                expected: 0,
                actual: 1,
            });
        }
        entries.insert(resource.metadata.id.clone(), Box::new(resource.clone()));
        drop(entries);

        self.publish(WatchEvent::Created(resource.clone()));
        Ok(resource)
    }

    async fn update<T: ResourceSpec>(
        &self,
        mut resource: Resource<T>,
        owner: &str,
        expected_phase: Option<Phase>,
    ) -> Result<Resource<T>> {
        let mut entries = self.entries.lock().unwrap();
        let id = resource.metadata.id.clone();
        let current_any = entries.get(&id).ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let current = Self::downcast::<T>(&id, current_any)?;

        Self::check_owner(&id, &current.metadata.owner, owner)?;

        if resource.metadata.version != current.metadata.version {
            return Err(StoreError::Conflict {
                id,
                expected: resource.metadata.version,
                actual: current.metadata.version,
            });
        }
        if let Some(expected) = expected_phase {
            if current.metadata.phase != expected {
                return Err(StoreError::PhaseConflict {
                    id,
                    expected: expected.to_string(),
                    actual: current.metadata.phase.to_string(),
                });
            }
        }

        resource.metadata.version = current.metadata.version + 1;
        resource.metadata.owner = current.metadata.owner.clone();
        entries.insert(id.clone(), Box::new(resource.clone()));
        drop(entries);

        self.publish(WatchEvent::Updated {
            old: current,
            new: resource.clone(),
        });
        Ok(resource)
    }

    async fn update_with_conflicts<T, F>(
        &self,
        id: &ResourceId,
        owner: &str,
        mut updater: F,
    ) -> Result<Resource<T>>
    where
        T: ResourceSpec,
        F: FnMut(&mut Resource<T>) -> Result<()> + Send,
    {
        let mut entries = self.entries.lock().unwrap();
        let current_any = entries.get(id).ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let current = Self::downcast::<T>(id, current_any)?;
        Self::check_owner(id, &current.metadata.owner, owner)?;

        let mut updated = current.clone();
        updater(&mut updated)?;
        updated.metadata.id = id.clone();
        updated.metadata.version = current.metadata.version + 1;
        updated.metadata.owner = current.metadata.owner.clone();

        entries.insert(id.clone(), Box::new(updated.clone()));
        drop(entries);

        self.publish(WatchEvent::Updated {
            old: current,
            new: updated.clone(),
        });
        Ok(updated)
    }

    async fn destroy<T: ResourceSpec>(&self, id: &ResourceId, owner: Option<&str>) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        let current_any = entries.get(id).ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let current = Self::downcast::<T>(id, current_any)?;

        if let Some(owner) = owner {
            Self::check_owner(id, &current.metadata.owner, owner)?;
        }
        if !current.metadata.finalizers.is_empty() {
            return Err(StoreError::DestroyBlocked {
                id: id.clone(),
                phase: current.metadata.phase.to_string(),
                finalizers: current.metadata.finalizers.clone(),
            });
        }

        entries.remove(id);
        drop(entries);

        self.publish::<T>(WatchEvent::Destroyed(id.clone()));
        Ok(())
    }

    async fn get<T: ResourceSpec>(&self, id: &ResourceId) -> Result<Resource<T>> {
        let entries = self.entries.lock().unwrap();
        let any = entries.get(id).ok_or_else(|| StoreError::NotFound(id.clone()))?;
        Self::downcast::<T>(id, any)
    }

    async fn list<T: ResourceSpec>(
        &self,
        namespace: &str,
        query: &LabelQuery,
    ) -> Result<Vec<Resource<T>>> {
        let entries = self.entries.lock().unwrap();
        let mut out = Vec::new();
        for (id, any) in entries.iter() {
            if id.kind != T::KIND || id.namespace != namespace {
                continue;
            }
            if let Some(resource) = any.downcast_ref::<Resource<T>>() {
                if query.matches(&resource.metadata.labels) {
                    out.push(resource.clone());
                }
            }
        }
        out.sort_by(|a, b| a.metadata.id.id.cmp(&b.metadata.id.id));
        Ok(out)
    }

    async fn teardown<T: ResourceSpec>(&self, id: &ResourceId) -> Result<Resource<T>> {
        let mut entries = self.entries.lock().unwrap();
        let current_any = entries.get(id).ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let mut current = Self::downcast::<T>(id, current_any)?;
        if current.metadata.phase == Phase::TearingDown {
            return Ok(current);
        }
        let old = current.clone();
        current.metadata.phase = Phase::TearingDown;
        current.metadata.version += 1;
        entries.insert(id.clone(), Box::new(current.clone()));
        drop(entries);

        self.publish(WatchEvent::Updated {
            old,
            new: current.clone(),
        });
        Ok(current)
    }

    async fn add_finalizer<T: ResourceSpec>(&self, id: &ResourceId, tag: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        let current_any = entries.get(id).ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let mut current = Self::downcast::<T>(id, current_any)?;
        if !current.metadata.has_finalizer(tag) {
            current.metadata.finalizers.push(tag.to_string());
            current.metadata.version += 1;
            entries.insert(id.clone(), Box::new(current));
        }
        Ok(())
    }

    async fn remove_finalizer<T: ResourceSpec>(&self, id: &ResourceId, tag: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        let current_any = entries.get(id).ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let mut current = Self::downcast::<T>(id, current_any)?;
        current.metadata.finalizers.retain(|f| f != tag);
        current.metadata.version += 1;
        entries.insert(id.clone(), Box::new(current));
        Ok(())
    }

    async fn watch_for<T: ResourceSpec>(
        &self,
        _id: &ResourceId,
    ) -> Result<broadcast::Receiver<WatchEvent<T>>> {
        Ok(self.channel::<T>().subscribe())
    }

    async fn watch_kind<T: ResourceSpec>(
        &self,
        _namespace: &str,
    ) -> Result<broadcast::Receiver<WatchEvent<T>>> {
        Ok(self.channel::<T>().subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetctl_types::{Machine, Metadata, ResourceSpec};

    fn machine(id: &str) -> Resource<Machine> {
        Resource::new(
            Metadata::new(ResourceId::new("default", Machine::KIND, id)),
            Machine {
                management_address: "10.0.0.1".into(),
                reachable: true,
            },
        )
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = MemoryStore::new();
        let created = store.create(machine("m1"), Some("ctrl")).await.unwrap();
        assert_eq!(created.metadata.version, 1);
        let got = store
            .get::<Machine>(&ResourceId::new("default", Machine::KIND, "m1"))
            .await
            .unwrap();
        assert_eq!(got, created);
    }

    #[tokio::test]
    async fn second_create_conflicts() {
        let store = MemoryStore::new();
        store.create(machine("m1"), Some("ctrl")).await.unwrap();
        let err = store.create(machine("m1"), Some("ctrl")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn update_by_non_owner_is_rejected() {
        let store = MemoryStore::new();
        let created = store.create(machine("m1"), Some("ctrl-a")).await.unwrap();
        let err = store
            .update(created, "ctrl-b", None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::OwnerConflict { .. }));
    }

    #[tokio::test]
    async fn destroy_blocked_by_finalizer() {
        let store = MemoryStore::new();
        let created = store.create(machine("m1"), Some("ctrl")).await.unwrap();
        let id = created.metadata.id.clone();
        store.add_finalizer::<Machine>(&id, "cluster-machine").await.unwrap();
        let err = store.destroy::<Machine>(&id, Some("ctrl")).await.unwrap_err();
        assert!(matches!(err, StoreError::DestroyBlocked { .. }));
        store.remove_finalizer::<Machine>(&id, "cluster-machine").await.unwrap();
        store.destroy::<Machine>(&id, Some("ctrl")).await.unwrap();
    }

    #[tokio::test]
    async fn teardown_is_idempotent() {
        let store = MemoryStore::new();
        let created = store.create(machine("m1"), Some("ctrl")).await.unwrap();
        let id = created.metadata.id.clone();
        let once = store.teardown::<Machine>(&id).await.unwrap();
        let twice = store.teardown::<Machine>(&id).await.unwrap();
        assert_eq!(once.metadata.version, twice.metadata.version);
    }
}
