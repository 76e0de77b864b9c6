//! # Name-keyed entity registry with pluggable type factories.
//!
//! One [`Registry`] per entity family (streams, senders, ports). A factory
//! is registered under a type name and produces a started entity from a
//! name + config; the registry guarantees name uniqueness even under
//! concurrent creation:
//!
//! ```text
//! create(type, name, cfg)
//!   ├─ reserve name under the directory lock (DuplicateName if taken)
//!   ├─ run the factory OUTSIDE the lock (slow: spawns processes)
//!   ├─ ok  → publish the live entity under its name
//!   └─ err → release the reservation, nothing visible remains
//! ```
//!
//! ## Rules
//! - **No partial registration**: a failed create leaves no trace.
//! - **Delete removes first**: concurrent lookups stop seeing the entity
//!   before its (possibly slow) destruction runs; teardown failures are
//!   logged and swallowed.
//! - **Reservations are invisible**: `find`/`list`/`delete` treat a
//!   reserved name as absent.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::error::{Error, Result};
use crate::events::{Bus, Event, EventKind};

/// A live entity managed by a [`Registry`].
#[async_trait]
pub trait Entity: Send + Sync + 'static {
    /// Unique name within the registry.
    fn name(&self) -> &str;
    /// Type name the entity was created under.
    fn type_name(&self) -> &str;
    /// Tears the entity down: process killed, channel closed. Idempotent.
    async fn destroy(&self) -> Result<()>;
}

/// Constructs and starts an entity from its name and configuration.
pub type Factory<C, E> =
    Arc<dyn Fn(Arc<str>, C) -> BoxFuture<'static, Result<Arc<E>>> + Send + Sync>;

enum Slot<E> {
    /// Name taken by an in-flight create.
    Reserved,
    Live(Arc<E>),
}

struct RegistryInner<C, E> {
    kind: &'static str,
    factories: Mutex<HashMap<String, Factory<C, E>>>,
    entities: Mutex<HashMap<String, Slot<E>>>,
    bus: Bus,
}

/// Directory of live entities plus the type→factory map.
pub struct Registry<C, E: Entity> {
    inner: Arc<RegistryInner<C, E>>,
}

impl<C, E: Entity> Clone for Registry<C, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Entity names become directory components of the control endpoint, so
/// path separators and traversal are rejected up front.
pub(crate) fn validate_entity_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Config("entity name must not be empty".into()));
    }
    if name.contains('/') || name.contains('\0') || name == "." || name == ".." {
        return Err(Error::Config(format!("invalid entity name {name:?}")));
    }
    Ok(())
}

impl<C: Send + 'static, E: Entity> Registry<C, E> {
    /// Creates an empty registry; `kind` labels log lines and events.
    pub fn new(kind: &'static str, bus: Bus) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                kind,
                factories: Mutex::new(HashMap::new()),
                entities: Mutex::new(HashMap::new()),
                bus,
            }),
        }
    }

    /// Registers a factory under `type_name`.
    pub fn register_type(&self, type_name: &str, factory: Factory<C, E>) -> Result<()> {
        let mut factories = lock(&self.inner.factories);
        if factories.contains_key(type_name) {
            return Err(Error::DuplicateType(type_name.to_string()));
        }
        factories.insert(type_name.to_string(), factory);
        Ok(())
    }

    /// Removes the factory under `type_name`. Live entities of that type
    /// are unaffected.
    pub fn unregister_type(&self, type_name: &str) -> Result<()> {
        lock(&self.inner.factories)
            .remove(type_name)
            .map(|_| ())
            .ok_or_else(|| Error::UnknownType(type_name.to_string()))
    }

    /// Registered type names, sorted.
    pub fn list_types(&self) -> Vec<String> {
        let mut types: Vec<String> = lock(&self.inner.factories).keys().cloned().collect();
        types.sort();
        types
    }

    /// Creates, starts, and publishes a new entity.
    ///
    /// Fails with `UnknownType`, `DuplicateName` (live or reserved), or
    /// whatever the factory fails with; on failure nothing stays visible.
    pub async fn create(&self, type_name: &str, name: &str, config: C) -> Result<Arc<E>> {
        validate_entity_name(name)?;
        let factory = lock(&self.inner.factories)
            .get(type_name)
            .cloned()
            .ok_or_else(|| Error::UnknownType(type_name.to_string()))?;

        {
            let mut entities = lock(&self.inner.entities);
            if entities.contains_key(name) {
                return Err(Error::DuplicateName(name.to_string()));
            }
            entities.insert(name.to_string(), Slot::Reserved);
        }

        // The factory may spawn processes and wait on sockets; it runs
        // without holding the directory lock.
        match factory(Arc::from(name), config).await {
            Ok(entity) => {
                lock(&self.inner.entities).insert(name.to_string(), Slot::Live(entity.clone()));
                tracing::info!(kind = self.inner.kind, r#type = type_name, name, "entity created");
                self.inner
                    .bus
                    .publish(Event::now(EventKind::EntityCreated).with_entity(name));
                Ok(entity)
            }
            Err(err) => {
                lock(&self.inner.entities).remove(name);
                tracing::warn!(
                    kind = self.inner.kind,
                    r#type = type_name,
                    name,
                    error = %err,
                    "entity creation failed"
                );
                Err(err)
            }
        }
    }

    /// Removes the entity from the directory, then destroys it.
    pub async fn delete(&self, name: &str) -> Result<()> {
        let entity = {
            let mut entities = lock(&self.inner.entities);
            match entities.remove(name) {
                Some(Slot::Live(entity)) => entity,
                Some(Slot::Reserved) => {
                    // an in-flight create owns this name
                    entities.insert(name.to_string(), Slot::Reserved);
                    return Err(Error::NotFound(name.to_string()));
                }
                None => return Err(Error::NotFound(name.to_string())),
            }
        };
        if let Err(err) = entity.destroy().await {
            tracing::warn!(
                kind = self.inner.kind,
                name,
                error = %err,
                "entity teardown failed"
            );
        }
        tracing::info!(kind = self.inner.kind, name, "entity deleted");
        self.inner
            .bus
            .publish(Event::now(EventKind::EntityDeleted).with_entity(name));
        Ok(())
    }

    /// Looks up a live entity by name.
    pub fn find(&self, name: &str) -> Option<Arc<E>> {
        match lock(&self.inner.entities).get(name) {
            Some(Slot::Live(entity)) => Some(entity.clone()),
            _ => None,
        }
    }

    /// Lists live entities, optionally filtered by type name.
    pub fn list(&self, type_filter: Option<&str>) -> Vec<Arc<E>> {
        lock(&self.inner.entities)
            .values()
            .filter_map(|slot| match slot {
                Slot::Live(entity) => Some(entity.clone()),
                Slot::Reserved => None,
            })
            .filter(|entity| type_filter.map_or(true, |t| entity.type_name() == t))
            .collect()
    }

    /// Number of live entities (reservations excluded).
    pub fn len(&self) -> usize {
        lock(&self.inner.entities)
            .values()
            .filter(|slot| matches!(slot, Slot::Live(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deletes every live entity; used on controller shutdown.
    pub async fn clear(&self) {
        let names: Vec<String> = self
            .list(None)
            .iter()
            .map(|entity| entity.name().to_string())
            .collect();
        for name in names {
            let _ = self.delete(&name).await;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
