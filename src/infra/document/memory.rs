//! In-memory document store for development/testing.
//!
//! Every operation takes the collection's mutex for its whole duration, which
//! gives the same single-document atomicity a real document store provides.
//! Collections are shared handles: clones observe the same documents.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::core::document::{
    Document, DocumentCollection, DocumentDatabase, Filter, Update, ID_FIELD,
};
use crate::core::StoreError;

fn key_of(id: &Value) -> String {
    id.to_string()
}

/// Direct key lookup when the filter pins `_id`.
fn pinned_key(filter: &Filter) -> Option<String> {
    match filter {
        Filter::Eq(field, value) if field == ID_FIELD => Some(key_of(value)),
        Filter::And(filters) => filters.iter().find_map(pinned_key),
        _ => None,
    }
}

/// Single in-memory collection.
#[derive(Clone)]
pub struct InMemoryCollection {
    name: Arc<str>,
    docs: Arc<Mutex<BTreeMap<String, Document>>>,
}

impl InMemoryCollection {
    /// Create an empty standalone collection.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Arc::from(name.into()),
            docs: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Collection name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of stored documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.lock().len()
    }

    /// Whether the collection holds no documents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.docs.lock().is_empty()
    }

    fn first_match_key(docs: &BTreeMap<String, Document>, filter: &Filter) -> Option<String> {
        if let Some(key) = pinned_key(filter) {
            return docs
                .get(&key)
                .filter(|doc| filter.matches(doc))
                .map(|_| key);
        }
        docs.iter()
            .find(|(_, doc)| filter.matches(doc))
            .map(|(key, _)| key.clone())
    }

    fn insert_locked(
        &self,
        docs: &mut BTreeMap<String, Document>,
        doc: Document,
    ) -> Result<(), StoreError> {
        let key = doc.get(ID_FIELD).map(key_of).ok_or_else(|| {
            StoreError::Codec(format!("document for `{}` has no {ID_FIELD}", self.name))
        })?;
        if docs.contains_key(&key) {
            return Err(StoreError::DuplicateKey(format!("{}: {key}", self.name)));
        }
        docs.insert(key, doc);
        Ok(())
    }
}

#[async_trait]
impl DocumentCollection for InMemoryCollection {
    async fn find_one(&self, filter: &Filter) -> Result<Option<Document>, StoreError> {
        let docs = self.docs.lock();
        Ok(Self::first_match_key(&docs, filter).and_then(|key| docs.get(&key).cloned()))
    }

    async fn find(&self, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        let docs = self.docs.lock();
        Ok(docs
            .values()
            .filter(|doc| filter.matches(doc))
            .cloned()
            .collect())
    }

    async fn find_one_and_update(
        &self,
        filter: &Filter,
        update: &Update,
    ) -> Result<Option<Document>, StoreError> {
        let mut docs = self.docs.lock();
        let Some(key) = Self::first_match_key(&docs, filter) else {
            return Ok(None);
        };
        Ok(docs.get_mut(&key).map(|doc| {
            let before = doc.clone();
            update.apply(doc);
            before
        }))
    }

    async fn update_one(&self, filter: &Filter, update: &Update) -> Result<u64, StoreError> {
        let mut docs = self.docs.lock();
        let Some(key) = Self::first_match_key(&docs, filter) else {
            return Ok(0);
        };
        if let Some(doc) = docs.get_mut(&key) {
            update.apply(doc);
        }
        Ok(1)
    }

    async fn insert_one(&self, doc: Document) -> Result<(), StoreError> {
        let mut docs = self.docs.lock();
        self.insert_locked(&mut docs, doc)
    }

    async fn insert_many(&self, batch: Vec<Document>) -> Result<(), StoreError> {
        let mut docs = self.docs.lock();
        for doc in batch {
            self.insert_locked(&mut docs, doc)?;
        }
        Ok(())
    }

    async fn replace_one(&self, filter: &Filter, mut doc: Document) -> Result<u64, StoreError> {
        let mut docs = self.docs.lock();
        let Some(key) = Self::first_match_key(&docs, filter) else {
            return Ok(0);
        };
        let Some(current) = docs.get_mut(&key) else {
            return Ok(0);
        };
        let id = current.get(ID_FIELD).cloned().unwrap_or(Value::Null);
        if doc.get(ID_FIELD).is_some_and(|new_id| *new_id != id) {
            return Err(StoreError::Backend(format!(
                "replacement would change {ID_FIELD} of {key} in `{}`",
                self.name
            )));
        }
        doc.insert(ID_FIELD.to_owned(), id);
        *current = doc;
        Ok(1)
    }

    async fn delete_one(&self, filter: &Filter) -> Result<u64, StoreError> {
        let mut docs = self.docs.lock();
        let Some(key) = Self::first_match_key(&docs, filter) else {
            return Ok(0);
        };
        Ok(u64::from(docs.remove(&key).is_some()))
    }

    async fn estimated_count(&self) -> Result<u64, StoreError> {
        Ok(self.docs.lock().len() as u64)
    }
}

/// In-memory database handing out shared collections by name.
#[derive(Clone, Default)]
pub struct InMemoryDatabase {
    collections: Arc<Mutex<HashMap<String, InMemoryCollection>>>,
}

impl InMemoryDatabase {
    /// Create an empty database.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of collections created so far.
    #[must_use]
    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

impl DocumentDatabase for InMemoryDatabase {
    type Collection = InMemoryCollection;

    fn collection(&self, name: &str) -> InMemoryCollection {
        self.collections
            .lock()
            .entry(name.to_owned())
            .or_insert_with(|| InMemoryCollection::new(name))
            .clone()
    }
}
