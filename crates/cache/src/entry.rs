//! Cache entries

use crate::clock::Timestamp;

/// Immutable value record stamped with its absolute expiry.
#[derive(Debug)]
pub struct Entry<V> {
    value: V,
    expires_at: Timestamp,
}

impl<V> Entry<V> {
    pub fn new(value: V, expires_at: Timestamp) -> Self {
        Self { value, expires_at }
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn expires_at(&self) -> Timestamp {
        self.expires_at
    }

    /// An entry is readable strictly before its expiry timestamp.
    #[inline]
    pub fn is_live_at(&self, now: Timestamp) -> bool {
        now < self.expires_at
    }
}
