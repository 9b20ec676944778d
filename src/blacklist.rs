//! Revoked-token blacklist with TTL expiry.
//!
//! Maps `jti -> revoked` until the original token would have expired
//! anyway, which caps growth: an entry never outlives the token it
//! shadows. Two backends: a process-local map for single-instance
//! deployments and tests, and the SQLite store shared across instances
//! pointed at the same database.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::db::RevokedTokenStore;

/// In-memory blacklist. Entries are pruned lazily on lookup; a dead
/// entry that is never looked up again costs one map slot until then.
#[derive(Clone, Default)]
pub struct MemoryBlacklist {
    entries: Arc<Mutex<HashMap<String, Instant>>>,
}

impl MemoryBlacklist {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&self, jti: &str, ttl_ms: i64) {
        if ttl_ms <= 0 {
            return;
        }
        let expires_at = Instant::now() + Duration::from_millis(ttl_ms as u64);
        self.entries
            .lock()
            .expect("blacklist mutex poisoned")
            .insert(jti.to_string(), expires_at);
    }

    fn is_blacklisted(&self, jti: &str) -> bool {
        let mut entries = self.entries.lock().expect("blacklist mutex poisoned");
        match entries.get(jti) {
            Some(expires_at) if *expires_at > Instant::now() => true,
            Some(_) => {
                entries.remove(jti);
                false
            }
            None => false,
        }
    }
}

/// Pluggable blacklist backend.
#[derive(Clone)]
pub enum BlacklistStore {
    Memory(MemoryBlacklist),
    Sqlite(RevokedTokenStore),
}

impl BlacklistStore {
    pub fn memory() -> Self {
        Self::Memory(MemoryBlacklist::new())
    }

    pub fn sqlite(store: RevokedTokenStore) -> Self {
        Self::Sqlite(store)
    }

    /// Blacklist a `jti` for `ttl_ms`. No-op when the TTL is non-positive,
    /// so already-expired tokens never create entries.
    pub async fn add(&self, jti: &str, ttl_ms: i64) -> Result<(), sqlx::Error> {
        match self {
            Self::Memory(m) => {
                m.add(jti, ttl_ms);
                Ok(())
            }
            Self::Sqlite(s) => s.add(jti, ttl_ms).await,
        }
    }

    /// Check whether a `jti` is currently blacklisted. An entry whose TTL
    /// has lapsed reads as not blacklisted.
    pub async fn is_blacklisted(&self, jti: &str) -> Result<bool, sqlx::Error> {
        match self {
            Self::Memory(m) => Ok(m.is_blacklisted(jti)),
            Self::Sqlite(s) => s.is_revoked(jti).await,
        }
    }
}
