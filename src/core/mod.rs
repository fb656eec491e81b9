//! Core lock protocol, entity contracts, and the document store contract.

pub mod document;
pub mod entity;
pub mod error;
pub mod identity;
pub mod lock_store;
pub mod mutex_service;
pub mod repository;

pub use document::{
    Document, DocumentCollection, DocumentDatabase, Filter, Update, UpdateOp, ID_FIELD,
};
pub use entity::{Entity, EntityCodec, EntityStore, JsonCodec};
pub use error::{AppResult, StoreError};
pub use identity::Identity;
pub use lock_store::{LockRecord, LockState, LockStore};
pub use mutex_service::{LockOutcome, MutexService};
pub use repository::{PutOutcome, Repository, Take};
