//! Lease-based mutex protocol on top of a [`LockStore`].
//!
//! Acquisition is a single conditional update whose predicate accepts both a
//! free record and a stale one, so abandoned locks are healed by whichever
//! caller comes next. Only when that update misses does the service spend a
//! second round-trip to tell "no record yet" apart from "held by someone".
//!
//! ```rust,ignore
//! use docmutex::config::MutexConfig;
//! use docmutex::core::MutexService;
//!
//! let mutexes = MutexService::new(lock_store, MutexConfig::default());
//! let outcome = mutexes.acquire(&"order-42".into()).await?;
//! if outcome.acquired {
//!     // critical section
//!     mutexes.unlock_all(&["order-42".into()]).await;
//! }
//! ```

use std::time::Duration;

use crate::config::MutexConfig;
use crate::core::{Identity, LockStore, StoreError};
use crate::util::clock::{Clock, SystemClock};

/// Result of an acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOutcome {
    /// The caller now holds the lock.
    pub acquired: bool,
    /// No lock record exists; take the create-and-lock path instead.
    pub absent: bool,
}

impl LockOutcome {
    /// Lock obtained.
    #[must_use]
    pub const fn acquired() -> Self {
        Self {
            acquired: true,
            absent: false,
        }
    }

    /// No record for the identity.
    #[must_use]
    pub const fn absent() -> Self {
        Self {
            acquired: false,
            absent: true,
        }
    }

    /// Held by another owner (or lost a create race).
    #[must_use]
    pub const fn contended() -> Self {
        Self {
            acquired: false,
            absent: false,
        }
    }
}

/// Distributed mutexes keyed by [`Identity`].
///
/// Holds no lock state of its own; clones of the underlying store may be
/// shared freely across tasks and processes.
pub struct MutexService<L, C = SystemClock> {
    store: L,
    clock: C,
    config: MutexConfig,
}

impl<L: LockStore> MutexService<L, SystemClock> {
    /// Service using the system wall clock.
    pub const fn new(store: L, config: MutexConfig) -> Self {
        Self::with_clock(store, config, SystemClock)
    }
}

impl<L: LockStore, C: Clock> MutexService<L, C> {
    /// Service using a custom clock.
    pub const fn with_clock(store: L, config: MutexConfig, clock: C) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// Active configuration.
    pub const fn config(&self) -> &MutexConfig {
        &self.config
    }

    /// Underlying lock store.
    pub const fn store(&self) -> &L {
        &self.store
    }

    /// First instant a lease taken at `acquired_at_ms` counts as stale is
    /// `acquired_at_ms + max_lock_hold_ms`; return the exclusive cutoff the
    /// store compares against.
    fn stale_before(&self, now_ms: u64) -> u64 {
        now_ms
            .checked_sub(self.config.max_lock_hold_ms)
            .map_or(0, |edge| edge.saturating_add(1))
    }

    async fn try_acquire(&self, identity: &Identity) -> Result<bool, StoreError> {
        let now = self.clock.now_ms();
        let stale_before = self.stale_before(now);
        self.store
            .conditional_acquire(identity, now, stale_before)
            .await
    }

    /// Try to lock an existing record, retrying while it is held.
    ///
    /// Returns `absent` when no record exists, `contended` once the retry
    /// budget is spent. Only store failures are errors.
    pub async fn lock(&self, identity: &Identity) -> Result<LockOutcome, StoreError> {
        if self.try_acquire(identity).await? {
            tracing::debug!(%identity, "lock acquired");
            return Ok(LockOutcome::acquired());
        }

        if !self.store.exists(identity).await? {
            tracing::debug!(%identity, "no lock record");
            return Ok(LockOutcome::absent());
        }

        for attempt in 0..self.config.lock_retry_count {
            if let Some(backoff) = &self.config.backoff {
                tokio::time::sleep(backoff.delay(attempt)).await;
            }
            if self.try_acquire(identity).await? {
                tracing::debug!(%identity, retries = attempt + 1, "lock acquired after retry");
                return Ok(LockOutcome::acquired());
            }
            tracing::trace!(%identity, attempt, "lock still held");
        }

        tracing::debug!(
            %identity,
            retries = self.config.lock_retry_count,
            "lock contended, retry budget exhausted"
        );
        Ok(LockOutcome::contended())
    }

    /// [`lock`](Self::lock) bounded by a deadline.
    ///
    /// On timeout the in-flight update may already have applied, so the
    /// result is [`StoreError::Indeterminate`] rather than a failure.
    pub async fn lock_within(
        &self,
        identity: &Identity,
        timeout: Duration,
    ) -> Result<LockOutcome, StoreError> {
        tokio::time::timeout(timeout, self.lock(identity))
            .await
            .map_err(|_| {
                StoreError::Indeterminate(format!("lock on {identity} timed out after {timeout:?}"))
            })?
    }

    /// Create the lock record already held by the caller.
    ///
    /// A concurrent creator winning the insert is reported as not acquired;
    /// the caller should go back to [`lock`](Self::lock).
    pub async fn create_and_lock(&self, identity: &Identity) -> Result<LockOutcome, StoreError> {
        let now = self.clock.now_ms();
        if self.store.create_locked(identity, now).await? {
            tracing::debug!(%identity, "lock record created");
            Ok(LockOutcome::acquired())
        } else {
            tracing::debug!(%identity, "lost lock record create race");
            Ok(LockOutcome::contended())
        }
    }

    /// Lock, creating the record first if this identity was never locked.
    pub async fn acquire(&self, identity: &Identity) -> Result<LockOutcome, StoreError> {
        let outcome = self.lock(identity).await?;
        if !outcome.absent {
            return Ok(outcome);
        }
        let created = self.create_and_lock(identity).await?;
        if created.acquired {
            return Ok(created);
        }
        self.lock(identity).await
    }

    /// Release every identity independently. Failures are logged and
    /// otherwise ignored; an unreleased lock expires after the lease length.
    pub async fn unlock_all(&self, identities: &[Identity]) {
        for identity in identities {
            if let Err(e) = self.store.release(identity).await {
                tracing::warn!(%identity, error = %e, "failed to release lock");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{LockRecord, LockState};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    /// Lock store keeping records in a map and counting round-trips.
    #[derive(Default)]
    struct ScriptedStore {
        records: Mutex<HashMap<Identity, LockRecord>>,
        acquire_calls: AtomicUsize,
        exists_calls: AtomicUsize,
        cutoffs: Mutex<Vec<u64>>,
        fail_release: bool,
    }

    #[async_trait]
    impl LockStore for ScriptedStore {
        async fn conditional_acquire(
            &self,
            identity: &Identity,
            now_ms: u64,
            stale_before_ms: u64,
        ) -> Result<bool, StoreError> {
            self.acquire_calls.fetch_add(1, Ordering::SeqCst);
            self.cutoffs.lock().push(stale_before_ms);
            let mut records = self.records.lock();
            match records.get_mut(identity) {
                Some(r) if r.is_acquirable(stale_before_ms) => {
                    r.state = LockState::Locked;
                    r.acquired_at_ms = now_ms;
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn exists(&self, identity: &Identity) -> Result<bool, StoreError> {
            self.exists_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.records.lock().contains_key(identity))
        }

        async fn create_locked(
            &self,
            identity: &Identity,
            now_ms: u64,
        ) -> Result<bool, StoreError> {
            let mut records = self.records.lock();
            if records.contains_key(identity) {
                return Ok(false);
            }
            records.insert(identity.clone(), LockRecord::locked(identity.clone(), now_ms));
            Ok(true)
        }

        async fn release(&self, identity: &Identity) -> Result<(), StoreError> {
            if self.fail_release {
                return Err(StoreError::Backend("connection reset".into()));
            }
            if let Some(r) = self.records.lock().get_mut(identity) {
                r.state = LockState::Unlocked;
            }
            Ok(())
        }

        async fn record(&self, identity: &Identity) -> Result<Option<LockRecord>, StoreError> {
            Ok(self.records.lock().get(identity).cloned())
        }
    }

    /// Clock that moves forward by a fixed step on every read.
    struct SteppingClock {
        now: AtomicU64,
        step: u64,
    }

    impl Clock for SteppingClock {
        fn now_ms(&self) -> u64 {
            self.now.fetch_add(self.step, Ordering::SeqCst)
        }
    }

    fn id(s: &str) -> Identity {
        Identity::from(s)
    }

    #[tokio::test]
    async fn test_absent_record_probes_once() {
        let svc = MutexService::new(ScriptedStore::default(), MutexConfig::default());
        let outcome = svc.lock(&id("new")).await.unwrap();
        assert_eq!(outcome, LockOutcome::absent());
        assert_eq!(svc.store().acquire_calls.load(Ordering::SeqCst), 1);
        assert_eq!(svc.store().exists_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fast_path_skips_existence_probe() {
        let svc = MutexService::new(ScriptedStore::default(), MutexConfig::default());
        assert!(svc.create_and_lock(&id("a")).await.unwrap().acquired);
        svc.unlock_all(&[id("a")]).await;

        assert_eq!(svc.lock(&id("a")).await.unwrap(), LockOutcome::acquired());
        assert_eq!(svc.store().exists_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_retry_budget_counts_attempts() {
        let clock = crate::util::clock::ManualClock::new(10_000);
        let cfg = MutexConfig::default().with_lock_retry_count(4);
        let svc = MutexService::with_clock(ScriptedStore::default(), cfg, clock);
        assert!(svc.create_and_lock(&id("a")).await.unwrap().acquired);

        let outcome = svc.lock(&id("a")).await.unwrap();
        assert_eq!(outcome, LockOutcome::contended());
        // first attempt plus four retries
        assert_eq!(svc.store().acquire_calls.load(Ordering::SeqCst), 5);
        assert_eq!(svc.store().exists_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_recomputes_cutoff() {
        let clock = SteppingClock {
            now: AtomicU64::new(0),
            step: 100,
        };
        let cfg = MutexConfig::default()
            .with_lock_retry_count(20)
            .with_max_lock_hold_ms(1_000);
        let svc = MutexService::with_clock(ScriptedStore::default(), cfg, clock);
        // created at t=0, clock reads 100 next
        assert!(svc.create_and_lock(&id("a")).await.unwrap().acquired);

        // becomes stale mid-loop once the clock reaches 1000
        assert_eq!(svc.lock(&id("a")).await.unwrap(), LockOutcome::acquired());
        let cutoffs = svc.store().cutoffs.lock().clone();
        assert!(cutoffs.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(cutoffs.last().copied(), Some(1));
    }

    #[tokio::test]
    async fn test_release_errors_are_swallowed() {
        let store = ScriptedStore {
            fail_release: true,
            ..ScriptedStore::default()
        };
        let svc = MutexService::new(store, MutexConfig::default());
        svc.unlock_all(&[id("a"), id("b")]).await;
    }

    #[tokio::test]
    async fn test_acquire_creates_missing_record() {
        let svc = MutexService::new(ScriptedStore::default(), MutexConfig::default());
        assert_eq!(svc.acquire(&id("fresh")).await.unwrap(), LockOutcome::acquired());
        let record = svc.store().record(&id("fresh")).await.unwrap().unwrap();
        assert_eq!(record.state, LockState::Locked);
    }

    #[test]
    fn test_stale_cutoff_before_epoch_window() {
        let cfg = MutexConfig::default().with_max_lock_hold_ms(1_000);
        let svc = MutexService::new(ScriptedStore::default(), cfg);
        assert_eq!(svc.stale_before(500), 0);
        assert_eq!(svc.stale_before(1_000), 1);
        assert_eq!(svc.stale_before(5_000), 4_001);
    }
}
