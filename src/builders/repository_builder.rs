//! Builders to construct document-backed repositories from configuration.

use crate::config::RepositoryConfig;
use crate::core::{DocumentDatabase, Entity, EntityCodec, MutexService, Repository, StoreError};
use crate::infra::{DocumentEntityStore, DocumentLockStore};
use crate::util::clock::{Clock, SystemClock};

/// Repository whose entities and lock records share one document database.
pub type DocumentRepository<T, D, K, C = SystemClock> = Repository<
    T,
    DocumentEntityStore<T, <D as DocumentDatabase>::Collection, K>,
    DocumentLockStore<<D as DocumentDatabase>::Collection>,
    C,
>;

/// Build a mutex service over the lock collection named by the config.
pub fn build_mutex_service<D, C>(
    cfg: &RepositoryConfig,
    db: &D,
    clock: C,
) -> Result<MutexService<DocumentLockStore<D::Collection>, C>, StoreError>
where
    D: DocumentDatabase,
    C: Clock,
{
    cfg.validate().map_err(StoreError::InvalidConfig)?;
    let locks = DocumentLockStore::new(db.collection(&cfg.mutex_collection_name()));
    Ok(MutexService::with_clock(locks, cfg.mutex.clone(), clock))
}

/// Build a repository for one entity collection and its lock collection.
pub fn build_repository<T, D, K>(
    cfg: &RepositoryConfig,
    db: &D,
    codec: K,
) -> Result<DocumentRepository<T, D, K>, StoreError>
where
    T: Entity,
    D: DocumentDatabase,
    K: EntityCodec<T>,
{
    build_repository_with_clock(cfg, db, codec, SystemClock)
}

/// [`build_repository`] with a custom clock.
pub fn build_repository_with_clock<T, D, K, C>(
    cfg: &RepositoryConfig,
    db: &D,
    codec: K,
    clock: C,
) -> Result<DocumentRepository<T, D, K, C>, StoreError>
where
    T: Entity,
    D: DocumentDatabase,
    K: EntityCodec<T>,
    C: Clock,
{
    let mutexes = build_mutex_service(cfg, db, clock)?;
    let store = DocumentEntityStore::new(db.collection(&cfg.collection), codec);
    tracing::info!(
        collection = %cfg.collection,
        mutex_collection = %cfg.mutex_collection_name(),
        lock_retry_count = cfg.mutex.lock_retry_count,
        max_lock_hold_ms = cfg.mutex.max_lock_hold_ms,
        "repository built"
    );
    Ok(Repository::new(store, mutexes))
}
