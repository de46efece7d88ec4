//! State locking.
//!
//! A tick must never run twice at once for the same identity. The driver
//! takes this lock for the whole pass; a lock older than its TTL is treated
//! as abandoned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default lock TTL in seconds.
pub const DEFAULT_LOCK_TTL_SECS: u64 = 3600;

/// Information about a state lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    /// Unique lock identifier.
    pub lock_id: String,
    /// Who holds the lock.
    pub holder: String,
    /// When the lock was acquired.
    pub acquired_at: DateTime<Utc>,
    /// When the lock expires.
    pub expires_at: DateTime<Utc>,
}

impl LockInfo {
    /// Creates a lock held by `holder` for `ttl_secs` seconds.
    #[must_use]
    pub fn new(holder: &str, ttl_secs: u64) -> Self {
        let now = Utc::now();
        Self {
            lock_id: Uuid::new_v4().to_string(),
            holder: holder.to_string(),
            acquired_at: now,
            expires_at: now + ttl(ttl_secs),
        }
    }

    /// Checks if the lock has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Extends the lock by `ttl_secs` from now.
    pub fn refresh(&mut self, ttl_secs: u64) {
        self.expires_at = Utc::now() + ttl(ttl_secs);
    }

    /// Returns the remaining time until expiry in seconds.
    #[must_use]
    pub fn remaining_secs(&self) -> i64 {
        (self.expires_at - Utc::now()).num_seconds().max(0)
    }
}

fn ttl(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX / 1000))
}

/// Generates a unique holder identifier for the current process.
#[must_use]
pub fn generate_holder_id() -> String {
    let hostname = hostname::get()
        .map_or_else(|_| String::from("unknown"), |h| h.to_string_lossy().to_string());
    let pid = std::process::id();
    let uuid = Uuid::new_v4().simple().to_string();

    format!("{hostname}-{pid}-{}", &uuid[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_expiry() {
        let lock = LockInfo::new("ci", 60);
        assert_eq!(lock.holder, "ci");
        assert!(!lock.is_expired());
        assert!(lock.remaining_secs() > 0);

        let mut stale = LockInfo::new("ci", 0);
        stale.expires_at = Utc::now() - chrono::Duration::seconds(1);
        assert!(stale.is_expired());
        assert_eq!(stale.remaining_secs(), 0);

        stale.refresh(60);
        assert!(!stale.is_expired());
    }

    #[test]
    fn test_holder_id_generation() {
        let id1 = generate_holder_id();
        let id2 = generate_holder_id();
        assert_ne!(id1, id2);
        assert!(id1.contains(&std::process::id().to_string()));
    }
}
