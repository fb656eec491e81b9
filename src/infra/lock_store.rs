//! Lock store backed by any [`DocumentCollection`].
//!
//! Lock records live in their own collection, one document per identity:
//! `{"_id": <identity>, "state": 0|1, "time": <ms>}`.

use async_trait::async_trait;

use crate::core::document::{DocumentCollection, Filter, Update};
use crate::core::lock_store::{LockRecord, LockState, STATE_FIELD, TIME_FIELD};
use crate::core::{Identity, LockStore, StoreError};

/// Translates lock primitives into single document-store round-trips.
#[derive(Clone)]
pub struct DocumentLockStore<D> {
    coll: D,
}

impl<D: DocumentCollection> DocumentLockStore<D> {
    /// Wrap the collection that holds lock records.
    pub const fn new(coll: D) -> Self {
        Self { coll }
    }

    /// Underlying collection.
    pub const fn collection(&self) -> &D {
        &self.coll
    }

    fn acquirable(identity: &Identity, stale_before_ms: u64) -> Filter {
        Filter::And(vec![
            Filter::id(identity),
            Filter::Or(vec![
                Filter::equals(STATE_FIELD, LockState::Unlocked.code()),
                Filter::less_than(TIME_FIELD, stale_before_ms),
            ]),
        ])
    }
}

#[async_trait]
impl<D: DocumentCollection> LockStore for DocumentLockStore<D> {
    async fn conditional_acquire(
        &self,
        identity: &Identity,
        now_ms: u64,
        stale_before_ms: u64,
    ) -> Result<bool, StoreError> {
        let filter = Self::acquirable(identity, stale_before_ms);
        let update = Update::new()
            .set(STATE_FIELD, LockState::Locked.code())
            .set(TIME_FIELD, now_ms);
        let Some(before) = self.coll.find_one_and_update(&filter, &update).await? else {
            return Ok(false);
        };
        if let Ok(previous) = LockRecord::from_document(&before) {
            if previous.state == LockState::Locked {
                tracing::warn!(
                    %identity,
                    held_since_ms = previous.acquired_at_ms,
                    "reclaimed stale lock"
                );
            }
        }
        Ok(true)
    }

    async fn exists(&self, identity: &Identity) -> Result<bool, StoreError> {
        Ok(self.coll.find_one(&Filter::id(identity)).await?.is_some())
    }

    async fn create_locked(&self, identity: &Identity, now_ms: u64) -> Result<bool, StoreError> {
        let doc = LockRecord::locked(identity.clone(), now_ms).to_document();
        match self.coll.insert_one(doc).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_duplicate_key() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn release(&self, identity: &Identity) -> Result<(), StoreError> {
        let update = Update::new().set(STATE_FIELD, LockState::Unlocked.code());
        self.coll.update_one(&Filter::id(identity), &update).await?;
        Ok(())
    }

    async fn record(&self, identity: &Identity) -> Result<Option<LockRecord>, StoreError> {
        self.coll
            .find_one(&Filter::id(identity))
            .await?
            .as_ref()
            .map(LockRecord::from_document)
            .transpose()
    }
}
