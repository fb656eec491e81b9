//! # docmutex
//!
//! Lease-based distributed mutexes and entity persistence for worker processes
//! that share a single document store.
//!
//! Processes serialize access to per-entity state without a central
//! coordinator. The only primitives required from the store are an atomic
//! conditional single-document update and an insert that rejects duplicate
//! identities. Crashed holders never block others for long: a lock older than
//! the configured lease is reclaimed by whichever caller asks next.
//!
//! ## Lock protocol
//!
//! - **Acquire**: one conditional update matching `unlocked OR stale`
//! - **Disambiguate**: on a miss, one existence probe tells "never locked"
//!   apart from "held by someone else"
//! - **Retry**: a fixed attempt budget, optionally with capped back-off
//! - **Create**: first lock of an identity inserts the record already locked;
//!   losing the insert race is an outcome, not an error
//! - **Release**: best effort; a lost release heals through lease expiry
//!
//! ```rust,ignore
//! use docmutex::builders::build_repository;
//! use docmutex::config::RepositoryConfig;
//! use docmutex::core::{JsonCodec, Take};
//! use docmutex::infra::InMemoryDatabase;
//!
//! let db = InMemoryDatabase::new();
//! let cfg = RepositoryConfig::new("orders");
//! let orders = build_repository(&cfg, &db, JsonCodec::<Order>::new())?;
//!
//! orders.put_if_absent(Order::new("order-42")).await?;
//! if let Take::Held(mut order) = orders.take(&"order-42".into()).await? {
//!     order.total += 10;
//!     orders.put_back(&[order]).await?;
//! }
//! ```
//!
//! For complete examples, see:
//! - `tests/mutex_protocol_test.rs` - lock protocol properties
//! - `tests/repository_test.rs` - take / put back workflows

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Lock protocol, entity contracts, and the document store contract.
pub mod core;
/// Configuration models for mutexes and repositories.
pub mod config;
/// Builders to construct repositories from configuration.
pub mod builders;
/// Infrastructure adapters for document stores, locks, and entities.
pub mod infra;
/// Shared utilities.
pub mod util;
