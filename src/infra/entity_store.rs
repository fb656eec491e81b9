//! Entity CRUD over a [`DocumentCollection`] through an [`EntityCodec`].

use std::marker::PhantomData;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::document::{DocumentCollection, Filter, ID_FIELD};
use crate::core::{Entity, EntityCodec, EntityStore, Identity, StoreError};

/// Typed entity store on top of an untyped document collection.
pub struct DocumentEntityStore<T, D, K> {
    coll: D,
    codec: K,
    _marker: PhantomData<fn() -> T>,
}

impl<T, D, K> DocumentEntityStore<T, D, K>
where
    T: Entity,
    D: DocumentCollection,
    K: EntityCodec<T>,
{
    /// Wrap an entity collection with the codec for its entity type.
    pub const fn new(coll: D, codec: K) -> Self {
        Self {
            coll,
            codec,
            _marker: PhantomData,
        }
    }

    /// Underlying collection.
    pub const fn collection(&self) -> &D {
        &self.coll
    }
}

#[async_trait]
impl<T, D, K> EntityStore<T> for DocumentEntityStore<T, D, K>
where
    T: Entity,
    D: DocumentCollection,
    K: EntityCodec<T>,
{
    async fn load(&self, identity: &Identity) -> Result<Option<T>, StoreError> {
        self.coll
            .find_one(&Filter::id(identity))
            .await?
            .map(|doc| self.codec.decode(doc))
            .transpose()
    }

    async fn save(&self, entity: &T) -> Result<(), StoreError> {
        let doc = self.codec.encode(entity)?;
        self.coll.insert_one(doc).await
    }

    async fn save_all(&self, to_insert: &[T], to_update: &[T]) -> Result<(), StoreError> {
        if !to_insert.is_empty() {
            let docs = to_insert
                .iter()
                .map(|e| self.codec.encode(e))
                .collect::<Result<Vec<_>, _>>()?;
            self.coll.insert_many(docs).await?;
        }
        for entity in to_update {
            let identity = entity.identity();
            let doc = self.codec.encode(entity)?;
            if self.coll.replace_one(&Filter::id(&identity), doc).await? == 0 {
                tracing::debug!(%identity, "update matched no stored entity");
            }
        }
        Ok(())
    }

    async fn remove(&self, identities: &[Identity]) -> Result<(), StoreError> {
        for identity in identities {
            self.coll.delete_one(&Filter::id(identity)).await?;
        }
        Ok(())
    }

    async fn query_all_ids(&self) -> Result<Vec<Identity>, StoreError> {
        self.coll
            .find(&Filter::All)
            .await?
            .iter()
            .map(|doc| {
                doc.get(ID_FIELD)
                    .and_then(Identity::from_value)
                    .ok_or_else(|| StoreError::Codec("stored entity has no usable _id".into()))
            })
            .collect()
    }

    async fn query_all_by_field(&self, field: &str, value: Value) -> Result<Vec<T>, StoreError> {
        self.coll
            .find(&Filter::Eq(field.to_owned(), value))
            .await?
            .into_iter()
            .map(|doc| self.codec.decode(doc))
            .collect()
    }

    async fn count(&self) -> Result<u64, StoreError> {
        self.coll.estimated_count().await
    }
}
