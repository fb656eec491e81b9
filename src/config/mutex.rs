//! Mutex and repository configuration structures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default number of extra acquisition attempts after the existence probe.
pub const DEFAULT_LOCK_RETRY_COUNT: u32 = 300;
/// Default lease length in milliseconds.
pub const DEFAULT_MAX_LOCK_HOLD_MS: u64 = 60 * 1000;
/// Prefix of the lock collection paired with an entity collection.
pub const MUTEX_COLLECTION_PREFIX: &str = "mutexes_";

/// Environment variable overriding `lock_retry_count`.
pub const ENV_LOCK_RETRY_COUNT: &str = "DOCMUTEX_LOCK_RETRY_COUNT";
/// Environment variable overriding `max_lock_hold_ms`.
pub const ENV_MAX_LOCK_HOLD_MS: &str = "DOCMUTEX_MAX_LOCK_HOLD_MS";
/// Environment variable enabling back-off with this initial delay.
pub const ENV_BACKOFF_INITIAL_MS: &str = "DOCMUTEX_BACKOFF_INITIAL_MS";
/// Environment variable capping the back-off delay.
pub const ENV_BACKOFF_MAX_MS: &str = "DOCMUTEX_BACKOFF_MAX_MS";

/// Capped exponential back-off between contended acquisition attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub initial_ms: u64,
    /// Upper bound on any single delay.
    pub max_ms: u64,
}

impl BackoffConfig {
    /// Delay before retry number `attempt` (zero-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1_u64.checked_shl(attempt.min(63)).unwrap_or(u64::MAX);
        Duration::from_millis(self.initial_ms.saturating_mul(factor).min(self.max_ms))
    }

    /// Validate back-off bounds.
    pub fn validate(&self) -> Result<(), String> {
        if self.initial_ms == 0 {
            return Err("backoff initial_ms must be greater than 0".into());
        }
        if self.max_ms < self.initial_ms {
            return Err("backoff max_ms must not be below initial_ms".into());
        }
        Ok(())
    }
}

/// Lock acquisition tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MutexConfig {
    /// Extra conditional-acquire attempts once the record is known to exist.
    pub lock_retry_count: u32,
    /// Lease length; a lock held longer than this may be reclaimed.
    pub max_lock_hold_ms: u64,
    /// Optional delay between attempts. `None` busy-polls.
    pub backoff: Option<BackoffConfig>,
}

impl Default for MutexConfig {
    fn default() -> Self {
        Self {
            lock_retry_count: DEFAULT_LOCK_RETRY_COUNT,
            max_lock_hold_ms: DEFAULT_MAX_LOCK_HOLD_MS,
            backoff: None,
        }
    }
}

impl MutexConfig {
    /// Set the retry budget.
    #[must_use]
    pub const fn with_lock_retry_count(mut self, count: u32) -> Self {
        self.lock_retry_count = count;
        self
    }

    /// Set the lease length.
    #[must_use]
    pub const fn with_max_lock_hold_ms(mut self, ms: u64) -> Self {
        self.max_lock_hold_ms = ms;
        self
    }

    /// Enable capped exponential back-off.
    #[must_use]
    pub const fn with_backoff(mut self, initial_ms: u64, max_ms: u64) -> Self {
        self.backoff = Some(BackoffConfig { initial_ms, max_ms });
        self
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_lock_hold_ms == 0 {
            return Err("max_lock_hold_ms must be greater than 0".into());
        }
        if let Some(backoff) = &self.backoff {
            backoff.validate()?;
        }
        Ok(())
    }

    /// Build from defaults overridden by environment variables, loading a
    /// `.env` file first if one is present.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from defaults overridden by the given key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(v) = parse_var::<u32, _>(&lookup, ENV_LOCK_RETRY_COUNT)? {
            cfg.lock_retry_count = v;
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, ENV_MAX_LOCK_HOLD_MS)? {
            cfg.max_lock_hold_ms = v;
        }
        if let Some(initial_ms) = parse_var::<u64, _>(&lookup, ENV_BACKOFF_INITIAL_MS)? {
            let max_ms = parse_var::<u64, _>(&lookup, ENV_BACKOFF_MAX_MS)?.unwrap_or(initial_ms);
            cfg.backoff = Some(BackoffConfig { initial_ms, max_ms });
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| format!("{key}: {e}"))
        })
        .transpose()
}

/// Repository configuration: entity collection plus its lock collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Entity collection name.
    pub collection: String,
    /// Lock collection name; defaults to `mutexes_<collection>`.
    #[serde(default)]
    pub mutex_collection: Option<String>,
    /// Lock acquisition tuning.
    #[serde(default)]
    pub mutex: MutexConfig,
}

impl RepositoryConfig {
    /// Configuration with default mutex settings.
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            mutex_collection: None,
            mutex: MutexConfig::default(),
        }
    }

    /// Replace the mutex settings.
    #[must_use]
    pub fn with_mutex(mut self, mutex: MutexConfig) -> Self {
        self.mutex = mutex;
        self
    }

    /// Name of the collection holding lock records.
    #[must_use]
    pub fn mutex_collection_name(&self) -> String {
        self.mutex_collection
            .clone()
            .unwrap_or_else(|| format!("{MUTEX_COLLECTION_PREFIX}{}", self.collection))
    }

    /// Validate names and mutex settings.
    pub fn validate(&self) -> Result<(), String> {
        if self.collection.trim().is_empty() {
            return Err("collection must not be empty".into());
        }
        if self.mutex_collection_name() == self.collection {
            return Err("mutex collection must differ from the entity collection".into());
        }
        self.mutex
            .validate()
            .map_err(|e| format!("mutex config for `{}` invalid: {e}", self.collection))
    }

    /// Parse repository configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }
}
