//! Builders to construct repositories and mutex services from configuration.

pub mod repository_builder;

pub use repository_builder::{
    build_mutex_service, build_repository, build_repository_with_clock, DocumentRepository,
};
