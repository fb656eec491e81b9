//! Entity contracts: identity accessor, document codec, and CRUD store.

use std::marker::PhantomData;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::core::document::{Document, ID_FIELD};
use crate::core::{Identity, StoreError};

/// A persisted entity that knows its own identity.
pub trait Entity: Send + Sync + 'static {
    /// Stable identity shared with the entity's lock record.
    fn identity(&self) -> Identity;
}

/// Marshals an entity type to and from the store's native document.
pub trait EntityCodec<T>: Send + Sync {
    /// Encode an entity; the document must carry the entity's `_id`.
    fn encode(&self, entity: &T) -> Result<Document, StoreError>;
    /// Decode a stored document.
    fn decode(&self, doc: Document) -> Result<T, StoreError>;
}

/// Codec for any serde entity, stamping `_id` from [`Entity::identity`].
pub struct JsonCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonCodec<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> EntityCodec<T> for JsonCodec<T>
where
    T: Entity + Serialize + DeserializeOwned,
{
    fn encode(&self, entity: &T) -> Result<Document, StoreError> {
        match serde_json::to_value(entity)? {
            Value::Object(mut doc) => {
                doc.insert(ID_FIELD.to_owned(), entity.identity().to_value());
                Ok(doc)
            }
            other => Err(StoreError::Codec(format!(
                "entity {} did not encode to an object: {other}",
                entity.identity()
            ))),
        }
    }

    fn decode(&self, doc: Document) -> Result<T, StoreError> {
        Ok(serde_json::from_value(Value::Object(doc))?)
    }
}

/// Plain CRUD persistence of one entity type. No coordination.
#[async_trait]
pub trait EntityStore<T: Entity>: Send + Sync {
    /// Load by identity.
    async fn load(&self, identity: &Identity) -> Result<Option<T>, StoreError>;

    /// Insert a new entity.
    async fn save(&self, entity: &T) -> Result<(), StoreError>;

    /// Insert new entities, then replace existing ones.
    async fn save_all(&self, to_insert: &[T], to_update: &[T]) -> Result<(), StoreError>;

    /// Delete entities by identity.
    async fn remove(&self, identities: &[Identity]) -> Result<(), StoreError>;

    /// Identities of every stored entity.
    async fn query_all_ids(&self) -> Result<Vec<Identity>, StoreError>;

    /// Entities whose `field` equals `value`.
    async fn query_all_by_field(&self, field: &str, value: Value) -> Result<Vec<T>, StoreError>;

    /// Number of stored entities.
    async fn count(&self) -> Result<u64, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Order {
        number: String,
        total: u32,
    }

    impl Entity for Order {
        fn identity(&self) -> Identity {
            Identity::from(self.number.as_str())
        }
    }

    #[derive(Serialize, Deserialize)]
    struct Counter(u32);

    impl Entity for Counter {
        fn identity(&self) -> Identity {
            Identity::from(self.0)
        }
    }

    #[test]
    fn test_encode_stamps_identity() {
        let codec = JsonCodec::<Order>::new();
        let order = Order {
            number: "order-42".into(),
            total: 9,
        };
        let doc = codec.encode(&order).unwrap();
        assert_eq!(doc["_id"], json!("order-42"));
        assert_eq!(doc["total"], json!(9));
        assert_eq!(codec.decode(doc).unwrap(), order);
    }

    #[test]
    fn test_non_object_entity_rejected() {
        let codec = JsonCodec::<Counter>::new();
        assert!(matches!(codec.encode(&Counter(3)), Err(StoreError::Codec(_))));
    }
}
