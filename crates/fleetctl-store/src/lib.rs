//! The resource state store contract consumed by fleetctl.
//!
//! The real store backing a fleet deployment is an external collaborator —
//! a versioned, labeled, phased, owner-enforced CRUD+watch service (COSI's
//! design is the closest public analogue). This crate specifies the
//! contract fleetctl's audit wrapper and reconcile engines need from it,
//! and ships an in-memory reference implementation (`memory::MemoryStore`)
//! used across the workspace's integration tests.

pub mod error;
pub mod memory;
pub mod query;

use async_trait::async_trait;
use fleetctl_types::{Phase, Resource, ResourceId, ResourceSpec};

pub use error::{Result, StoreError};
pub use query::LabelQuery;

/// A change observed on a watch stream.
#[derive(Debug, Clone)]
pub enum WatchEvent<T> {
    Created(Resource<T>),
    Updated { old: Resource<T>, new: Resource<T> },
    Destroyed(ResourceId),
}

/// CRUD + watch over versioned, labeled, phased resources with owner
/// enforcement.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Creates `resource`, assigning it version 1. If `owner` is set, only
    /// that owner may subsequently update or destroy it.
    async fn create<T: ResourceSpec>(
        &self,
        resource: Resource<T>,
        owner: Option<&str>,
    ) -> Result<Resource<T>>;

    /// Replaces the spec of an existing resource under CAS on
    /// `resource.metadata.version`. `expected_phase`, when set, aborts with
    /// `PhaseConflict` if the stored phase differs.
    async fn update<T: ResourceSpec>(
        &self,
        resource: Resource<T>,
        owner: &str,
        expected_phase: Option<Phase>,
    ) -> Result<Resource<T>>;

    /// Reads the current resource, applies `updater` to a clone, and writes
    /// it back under CAS; retries internally on a lost race up to a small
    /// bound. `updater` may fail to abort without writing.
    async fn update_with_conflicts<T, F>(
        &self,
        id: &ResourceId,
        owner: &str,
        updater: F,
    ) -> Result<Resource<T>>
    where
        T: ResourceSpec,
        F: FnMut(&mut Resource<T>) -> Result<()> + Send;

    /// Destroys a resource outright. Most resource kinds in this system are
    /// destroyed only after `teardown` drives them to `TearingDown` with no
    /// finalizers remaining.
    async fn destroy<T: ResourceSpec>(&self, id: &ResourceId, owner: Option<&str>) -> Result<()>;

    async fn get<T: ResourceSpec>(&self, id: &ResourceId) -> Result<Resource<T>>;

    async fn list<T: ResourceSpec>(
        &self,
        namespace: &str,
        query: &LabelQuery,
    ) -> Result<Vec<Resource<T>>>;

    /// Transitions a resource to `Phase::TearingDown`. Idempotent: tearing
    /// down an already-tearing-down resource is a no-op that returns the
    /// current value.
    async fn teardown<T: ResourceSpec>(&self, id: &ResourceId) -> Result<Resource<T>>;

    async fn add_finalizer<T: ResourceSpec>(&self, id: &ResourceId, tag: &str) -> Result<()>;

    async fn remove_finalizer<T: ResourceSpec>(&self, id: &ResourceId, tag: &str) -> Result<()>;

    /// Subscribes to every change for one resource id.
    async fn watch_for<T: ResourceSpec>(
        &self,
        id: &ResourceId,
    ) -> Result<tokio::sync::broadcast::Receiver<WatchEvent<T>>>;

    /// Subscribes to every change across all resources of kind `T` in
    /// `namespace`.
    async fn watch_kind<T: ResourceSpec>(
        &self,
        namespace: &str,
    ) -> Result<tokio::sync::broadcast::Receiver<WatchEvent<T>>>;
}
