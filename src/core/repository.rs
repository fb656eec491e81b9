//! Repository combining an entity store with per-entity distributed mutexes.
//!
//! Mutating access follows take / modify / put back: [`Repository::take`]
//! locks the entity's identity and loads it, [`Repository::put_back`] persists
//! the change and releases the lock. Reads through [`Repository::find`] and
//! the query methods never lock.

use std::marker::PhantomData;

use serde_json::Value;

use crate::core::{Entity, EntityStore, Identity, LockStore, MutexService, StoreError};
use crate::util::clock::{Clock, SystemClock};

/// Outcome of [`Repository::take`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Take<T> {
    /// The caller holds the lock and the loaded entity.
    Held(T),
    /// No such entity; no lock is held.
    NotFound,
    /// Another owner holds the lock; no lock is held.
    Contended,
}

impl<T> Take<T> {
    /// The entity, if the caller now holds it.
    pub fn into_held(self) -> Option<T> {
        match self {
            Self::Held(entity) => Some(entity),
            Self::NotFound | Self::Contended => None,
        }
    }
}

/// Outcome of [`Repository::put_if_absent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome<T> {
    /// The entity was stored.
    Inserted,
    /// An entity with the same identity already existed; nothing was written.
    Existing(T),
    /// The identity is locked by another owner; nothing was written.
    Contended,
}

/// Entity repository guarded by lease mutexes.
pub struct Repository<T, S, L, C = SystemClock> {
    store: S,
    mutexes: MutexService<L, C>,
    _marker: PhantomData<fn() -> T>,
}

impl<T, S, L, C> Repository<T, S, L, C>
where
    T: Entity,
    S: EntityStore<T>,
    L: LockStore,
    C: Clock,
{
    /// Combine an entity store with a mutex service.
    pub const fn new(store: S, mutexes: MutexService<L, C>) -> Self {
        Self {
            store,
            mutexes,
            _marker: PhantomData,
        }
    }

    /// Mutex service guarding this repository.
    pub const fn mutexes(&self) -> &MutexService<L, C> {
        &self.mutexes
    }

    /// Entity store backing this repository.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Read without locking.
    pub async fn find(&self, identity: &Identity) -> Result<Option<T>, StoreError> {
        self.store.load(identity).await
    }

    async fn load_held(&self, identity: &Identity) -> Result<Take<T>, StoreError> {
        match self.store.load(identity).await {
            Ok(Some(entity)) => Ok(Take::Held(entity)),
            Ok(None) => {
                self.mutexes.unlock_all(std::slice::from_ref(identity)).await;
                Ok(Take::NotFound)
            }
            Err(e) => {
                self.mutexes.unlock_all(std::slice::from_ref(identity)).await;
                Err(e)
            }
        }
    }

    /// Lock an entity for modification and load it.
    ///
    /// An entity stored without ever having been locked gets its lock record
    /// created here.
    pub async fn take(&self, identity: &Identity) -> Result<Take<T>, StoreError> {
        let outcome = self.mutexes.lock(identity).await?;
        if outcome.acquired {
            return self.load_held(identity).await;
        }
        if !outcome.absent {
            return Ok(Take::Contended);
        }

        if self.store.load(identity).await?.is_none() {
            return Ok(Take::NotFound);
        }
        if self.mutexes.create_and_lock(identity).await?.acquired {
            self.load_held(identity).await
        } else {
            Ok(Take::Contended)
        }
    }

    /// Store a new entity unless one with the same identity exists.
    pub async fn put_if_absent(&self, entity: T) -> Result<PutOutcome<T>, StoreError> {
        let identity = entity.identity();
        let created = self.mutexes.create_and_lock(&identity).await?;
        let held = created.acquired || self.mutexes.lock(&identity).await?.acquired;
        if !held {
            return Ok(PutOutcome::Contended);
        }

        let result = match self.store.load(&identity).await {
            Ok(Some(existing)) => Ok(PutOutcome::Existing(existing)),
            Ok(None) => self.store.save(&entity).await.map(|()| PutOutcome::Inserted),
            Err(e) => Err(e),
        };
        self.mutexes.unlock_all(std::slice::from_ref(&identity)).await;
        if matches!(result, Ok(PutOutcome::Inserted)) {
            tracing::debug!(%identity, "entity inserted");
        }
        result
    }

    /// Persist entities obtained through [`take`](Self::take) and release
    /// their locks. Locks are released even if the write fails.
    pub async fn put_back(&self, entities: &[T]) -> Result<(), StoreError> {
        let result = self.store.save_all(&[], entities).await;
        let identities: Vec<Identity> = entities.iter().map(Entity::identity).collect();
        self.mutexes.unlock_all(&identities).await;
        result
    }

    /// Release locks without writing anything.
    pub async fn release(&self, identities: &[Identity]) {
        self.mutexes.unlock_all(identities).await;
    }

    /// Delete entities. Their lock records are kept.
    pub async fn remove(&self, identities: &[Identity]) -> Result<(), StoreError> {
        self.store.remove(identities).await
    }

    /// Identities of every stored entity.
    pub async fn query_all_ids(&self) -> Result<Vec<Identity>, StoreError> {
        self.store.query_all_ids().await
    }

    /// Entities whose `field` equals `value`.
    pub async fn query_all_by_field(
        &self,
        field: &str,
        value: impl Into<Value> + Send,
    ) -> Result<Vec<T>, StoreError> {
        self.store.query_all_by_field(field, value.into()).await
    }

    /// Number of stored entities.
    pub async fn count(&self) -> Result<u64, StoreError> {
        self.store.count().await
    }
}
