//! Document store contract consumed by the lock and entity adapters.
//!
//! The store engine itself (durability, replication, indexing) lives outside
//! this crate. Adapters only rely on two atomic guarantees:
//!
//! - `find_one_and_update` applies a conditional update to a single document
//!   atomically and reports whether anything matched;
//! - `insert_one` fails with [`StoreError::DuplicateKey`] when a document with
//!   the same `_id` already exists.

use std::cmp::Ordering;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::core::{Identity, StoreError};

/// Native document representation.
pub type Document = Map<String, Value>;

/// Field holding a document's identity.
pub const ID_FIELD: &str = "_id";

/// Predicate over a single document.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every document.
    All,
    /// Field equals value.
    Eq(String, Value),
    /// Field is strictly less than value.
    Lt(String, Value),
    /// All sub-filters match.
    And(Vec<Filter>),
    /// At least one sub-filter matches.
    Or(Vec<Filter>),
}

impl Filter {
    /// Match the document with the given identity.
    #[must_use]
    pub fn id(identity: &Identity) -> Self {
        Self::Eq(ID_FIELD.to_owned(), identity.to_value())
    }

    /// Field equality.
    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq(field.into(), value.into())
    }

    /// Field strictly below value.
    pub fn less_than(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Lt(field.into(), value.into())
    }

    /// Evaluate against a document. Missing fields never match `Eq` or `Lt`.
    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Self::All => true,
            Self::Eq(field, value) => doc.get(field).is_some_and(|v| v == value),
            Self::Lt(field, value) => doc
                .get(field)
                .and_then(|v| compare_values(v, value))
                .is_some_and(|o| o == Ordering::Less),
            Self::And(filters) => filters.iter().all(|f| f.matches(doc)),
            Self::Or(filters) => filters.iter().any(|f| f.matches(doc)),
        }
    }
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
                return Some(x.cmp(&y));
            }
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                return Some(x.cmp(&y));
            }
            x.as_f64()?.partial_cmp(&y.as_f64()?)
        }
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Single field mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    /// Overwrite the field.
    Set(String, Value),
}

/// Ordered set of field mutations applied atomically to one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    ops: Vec<UpdateOp>,
}

impl Update {
    /// Empty update.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `Set` mutation.
    #[must_use]
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ops.push(UpdateOp::Set(field.into(), value.into()));
        self
    }

    /// Mutations in application order.
    #[must_use]
    pub fn ops(&self) -> &[UpdateOp] {
        &self.ops
    }

    /// Apply all mutations to a document in place.
    pub fn apply(&self, doc: &mut Document) {
        for op in &self.ops {
            match op {
                UpdateOp::Set(field, value) => {
                    doc.insert(field.clone(), value.clone());
                }
            }
        }
    }
}

/// A single collection of documents keyed by `_id`.
#[async_trait]
pub trait DocumentCollection: Send + Sync {
    /// First document matching the filter.
    async fn find_one(&self, filter: &Filter) -> Result<Option<Document>, StoreError>;

    /// Every document matching the filter.
    async fn find(&self, filter: &Filter) -> Result<Vec<Document>, StoreError>;

    /// Atomically update the first matching document, returning its pre-image.
    async fn find_one_and_update(
        &self,
        filter: &Filter,
        update: &Update,
    ) -> Result<Option<Document>, StoreError>;

    /// Update the first matching document; returns the matched count.
    async fn update_one(&self, filter: &Filter, update: &Update) -> Result<u64, StoreError>;

    /// Insert a document; fails with `DuplicateKey` if its `_id` is taken.
    async fn insert_one(&self, doc: Document) -> Result<(), StoreError>;

    /// Insert documents in order, stopping at the first failure.
    async fn insert_many(&self, docs: Vec<Document>) -> Result<(), StoreError>;

    /// Replace the first matching document; returns the matched count.
    async fn replace_one(&self, filter: &Filter, doc: Document) -> Result<u64, StoreError>;

    /// Delete the first matching document; returns the deleted count.
    async fn delete_one(&self, filter: &Filter) -> Result<u64, StoreError>;

    /// Approximate number of documents in the collection.
    async fn estimated_count(&self) -> Result<u64, StoreError>;
}

/// Source of named collections.
pub trait DocumentDatabase {
    /// Collection handle type.
    type Collection: DocumentCollection + Clone + 'static;

    /// Handle to the named collection, created on first use.
    fn collection(&self, name: &str) -> Self::Collection;
}
