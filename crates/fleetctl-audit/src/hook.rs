//! Per-resource-type hook registry.
//!
//! Hooks are registered once at startup, keyed by `ResourceSpec::KIND`, and
//! are looked up generically at each `create`/`update`/`destroy`/
//! `update_with_conflicts` call. The registry is polymorphic: it stores
//! `Box<dyn Any>` per kind and the wrapper downcasts to the caller's
//! concrete `T` on every lookup. A kind collision between two distinct
//! Rust types (same `KIND` string, different `T`) is a programming error
//! we fail loudly on rather than silently skip logging for.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use fleetctl_types::{Resource, ResourceId, ResourceSpec};

use crate::error::{AuditError, Result};
use crate::event::{AuditEventData, Session};

/// What a hook wants done with the write it observed.
pub enum HookOutcome {
    /// Append an audit event carrying this data.
    Log(AuditEventData),
    /// Let the write through without emitting an event.
    NoLog,
}

pub type CreateHook<T> = dyn Fn(&Resource<T>, Option<&Session>) -> HookOutcome + Send + Sync;
pub type UpdateHook<T> =
    dyn Fn(&Resource<T>, &Resource<T>, Option<&Session>) -> HookOutcome + Send + Sync;
pub type DestroyHook<T> = dyn Fn(&ResourceId, Option<&Session>) -> HookOutcome + Send + Sync;

type AnyBox = Box<dyn Any + Send + Sync>;

#[derive(Default)]
pub struct HookRegistry {
    create: RwLock<HashMap<&'static str, AnyBox>>,
    update: RwLock<HashMap<&'static str, AnyBox>>,
    destroy: RwLock<HashMap<&'static str, AnyBox>>,
    update_with_conflicts: RwLock<HashMap<&'static str, AnyBox>>,
}

macro_rules! registry_slot {
    ($register:ident, $get:ident, $field:ident, $hook_ty:ident, $operation:literal) => {
        pub fn $register<T: ResourceSpec>(&self, hook: Arc<$hook_ty<T>>) -> Result<()> {
            let mut map = self.$field.write().unwrap();
            if map.contains_key(T::KIND) {
                return Err(AuditError::HookAlreadyRegistered {
                    kind: T::KIND,
                    operation: $operation,
                });
            }
            map.insert(T::KIND, Box::new(hook));
            Ok(())
        }

        pub(crate) fn $get<T: ResourceSpec>(&self) -> Result<Option<Arc<$hook_ty<T>>>> {
            let map = self.$field.read().unwrap();
            let Some(any) = map.get(T::KIND) else {
                return Ok(None);
            };
            any.downcast_ref::<Arc<$hook_ty<T>>>()
                .cloned()
                .map(Some)
                .ok_or(AuditError::HookTypeMismatch { kind: T::KIND })
        }
    };
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    registry_slot!(register_create, get_create, create, CreateHook, "create");
    registry_slot!(register_update, get_update, update, UpdateHook, "update");
    registry_slot!(register_destroy, get_destroy, destroy, DestroyHook, "destroy");
    registry_slot!(
        register_update_with_conflicts,
        get_update_with_conflicts,
        update_with_conflicts,
        UpdateHook,
        "update_with_conflicts"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetctl_types::{Machine, Metadata};

    fn machine(id: &str) -> Resource<Machine> {
        Resource::new(
            Metadata::new(ResourceId::new("default", Machine::KIND, id)),
            Machine {
                management_address: "10.0.0.1".into(),
                reachable: true,
            },
        )
    }

    #[test]
    fn unregistered_kind_returns_none() {
        let registry = HookRegistry::new();
        assert!(registry.get_create::<Machine>().unwrap().is_none());
    }

    #[test]
    fn double_registration_fails_loudly() {
        let registry = HookRegistry::new();
        registry
            .register_create::<Machine>(Arc::new(|_r, _s| HookOutcome::NoLog))
            .unwrap();
        let err = registry
            .register_create::<Machine>(Arc::new(|_r, _s| HookOutcome::NoLog))
            .unwrap_err();
        assert!(matches!(err, AuditError::HookAlreadyRegistered { .. }));
    }

    #[test]
    fn registered_hook_is_invoked() {
        let registry = HookRegistry::new();
        registry
            .register_create::<Machine>(Arc::new(|_r, _s| {
                HookOutcome::Log(AuditEventData::default())
            }))
            .unwrap();
        let hook = registry.get_create::<Machine>().unwrap().unwrap();
        match hook(&machine("m1"), None) {
            HookOutcome::Log(_) => {}
            HookOutcome::NoLog => panic!("expected Log"),
        }
    }
}
