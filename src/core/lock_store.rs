//! Lock records and the atomic primitives the mutex service needs.

use async_trait::async_trait;
use serde_json::Value;

use crate::core::document::{Document, ID_FIELD};
use crate::core::{Identity, StoreError};

/// Field holding the lock state code.
pub const STATE_FIELD: &str = "state";
/// Field holding the acquisition timestamp in milliseconds.
pub const TIME_FIELD: &str = "time";

/// Lock state as persisted in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// Free for any caller.
    Unlocked,
    /// Held until released or stale.
    Locked,
}

impl LockState {
    /// Stored numeric code.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Unlocked => 0,
            Self::Locked => 1,
        }
    }

    /// Parse a stored numeric code.
    #[must_use]
    pub const fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(Self::Unlocked),
            1 => Some(Self::Locked),
            _ => None,
        }
    }
}

/// One lock record per identity that has ever been locked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRecord {
    /// Identity shared with the guarded entity.
    pub identity: Identity,
    /// Current state.
    pub state: LockState,
    /// Milliseconds since epoch of the last successful LOCKED transition.
    pub acquired_at_ms: u64,
}

impl LockRecord {
    /// Fresh record in the LOCKED state.
    #[must_use]
    pub const fn locked(identity: Identity, now_ms: u64) -> Self {
        Self {
            identity,
            state: LockState::Locked,
            acquired_at_ms: now_ms,
        }
    }

    /// Whether a conditional acquire with this cutoff would match.
    #[must_use]
    pub const fn is_acquirable(&self, stale_before_ms: u64) -> bool {
        matches!(self.state, LockState::Unlocked) || self.acquired_at_ms < stale_before_ms
    }

    /// Encode to the stored document shape.
    #[must_use]
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        doc.insert(ID_FIELD.to_owned(), self.identity.to_value());
        doc.insert(STATE_FIELD.to_owned(), Value::from(self.state.code()));
        doc.insert(TIME_FIELD.to_owned(), Value::from(self.acquired_at_ms));
        doc
    }

    /// Decode from the stored document shape.
    pub fn from_document(doc: &Document) -> Result<Self, StoreError> {
        let identity = doc
            .get(ID_FIELD)
            .and_then(Identity::from_value)
            .ok_or_else(|| StoreError::Codec("lock record has no usable _id".into()))?;
        let state = doc
            .get(STATE_FIELD)
            .and_then(Value::as_u64)
            .and_then(LockState::from_code)
            .ok_or_else(|| StoreError::Codec(format!("lock record {identity} has bad state")))?;
        let acquired_at_ms = doc
            .get(TIME_FIELD)
            .and_then(Value::as_u64)
            .ok_or_else(|| StoreError::Codec(format!("lock record {identity} has no time")))?;
        Ok(Self {
            identity,
            state,
            acquired_at_ms,
        })
    }
}

/// Atomic lock primitives, each mapped to exactly one store round-trip.
///
/// Implementations must not cache lock state: the store is the single source
/// of truth for every caller in every process.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Atomically lock the record if it is unlocked or its lease started
    /// before `stale_before_ms`. Returns whether a record matched.
    async fn conditional_acquire(
        &self,
        identity: &Identity,
        now_ms: u64,
        stale_before_ms: u64,
    ) -> Result<bool, StoreError>;

    /// Whether any lock record exists for the identity.
    async fn exists(&self, identity: &Identity) -> Result<bool, StoreError>;

    /// Insert a new record already LOCKED. `Ok(false)` when a record with the
    /// same identity exists.
    async fn create_locked(&self, identity: &Identity, now_ms: u64) -> Result<bool, StoreError>;

    /// Set the record to UNLOCKED unconditionally.
    async fn release(&self, identity: &Identity) -> Result<(), StoreError>;

    /// Read the current record, if any.
    async fn record(&self, identity: &Identity) -> Result<Option<LockRecord>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_shape() {
        let record = LockRecord::locked(Identity::from("order-42"), 1_000);
        let doc = record.to_document();
        assert_eq!(doc["_id"], Value::from("order-42"));
        assert_eq!(doc["state"], Value::from(1));
        assert_eq!(doc["time"], Value::from(1_000));
        assert_eq!(LockRecord::from_document(&doc).unwrap(), record);
    }

    #[test]
    fn test_bad_state_rejected() {
        let mut doc = LockRecord::locked(Identity::from(1_i64), 0).to_document();
        doc.insert(STATE_FIELD.into(), Value::from(9));
        assert!(matches!(
            LockRecord::from_document(&doc),
            Err(StoreError::Codec(_))
        ));
    }

    #[test]
    fn test_missing_time_rejected() {
        let mut doc = LockRecord::locked(Identity::from("a"), 7).to_document();
        doc.remove(TIME_FIELD);
        assert!(matches!(
            LockRecord::from_document(&doc),
            Err(StoreError::Codec(_))
        ));
    }

    #[test]
    fn test_acquirable() {
        let mut record = LockRecord::locked(Identity::from("a"), 500);
        assert!(!record.is_acquirable(500));
        assert!(record.is_acquirable(501));
        record.state = LockState::Unlocked;
        assert!(record.is_acquirable(0));
    }
}
