//! Configuration models for mutexes and repositories.

pub mod mutex;

pub use mutex::{BackoffConfig, MutexConfig, RepositoryConfig};
