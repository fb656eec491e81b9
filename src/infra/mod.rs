//! Infrastructure adapters for document stores, locks, and entities.

pub mod document;
pub mod entity_store;
pub mod lock_store;

pub use document::{InMemoryCollection, InMemoryDatabase};
pub use entity_store::DocumentEntityStore;
pub use lock_store::DocumentLockStore;
