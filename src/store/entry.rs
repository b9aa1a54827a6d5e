//! Store entries and the wall clock used for expirations

use super::value::Value;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A live value and its optional absolute expiration
#[derive(Debug, Clone)]
pub struct Entry {
    /// The value
    pub value: Value,

    /// Absolute expiration instant in Unix milliseconds
    pub expire_at: Option<u64>,
}

impl Entry {
    /// Create a new entry without expiration
    pub fn new(value: Value) -> Self {
        Entry {
            value,
            expire_at: None,
        }
    }

    /// Check whether the entry is dead at `now`
    pub fn is_expired_at(&self, now: u64) -> bool {
        matches!(self.expire_at, Some(at) if at <= now)
    }

    /// Check if the entry has expired
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_ms())
    }

    /// Calculate approximate memory usage of this entry in bytes
    pub fn memory_usage(&self, key_len: usize) -> usize {
        key_len + self.value.memory_usage() + std::mem::size_of::<Option<u64>>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let mut entry = Entry::new(Value::string("v"));
        assert!(!entry.is_expired_at(100));

        entry.expire_at = Some(100);
        assert!(!entry.is_expired_at(99));
        assert!(entry.is_expired_at(100));
    }
}
