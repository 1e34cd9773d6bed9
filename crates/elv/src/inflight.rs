//! Suppresses concurrent duplicate deliveries within one process.
//!
//! The bus may hand the same message to the same river twice at once on
//! different consumer tasks. Both copies would pass a `reject_key` check since
//! neither has published yet, so the first claim on `(river, @id)` wins and the
//! second delivery is skipped. Across processes the `reject_key` contract is
//! all there is.

use std::sync::Arc;
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

type Key = (&'static str, String);

#[derive(Debug, Clone, Default)]
pub struct InflightTracker {
    entries: Arc<DashMap<Key, Instant>>,
}

impl InflightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the message for this river. `None` if another task holds it.
    pub fn try_begin(&self, river: &'static str, message_id: &str) -> Option<InflightGuard> {
        let key = (river, message_id.to_string());
        match self.entries.entry(key.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(vacant) => {
                vacant.insert(Instant::now());
                Some(InflightGuard {
                    entries: Arc::clone(&self.entries),
                    key,
                })
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Releases the claim when dropped, including on panic or cancellation.
#[derive(Debug)]
pub struct InflightGuard {
    entries: Arc<DashMap<Key, Instant>>,
    key: Key,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.entries.remove(&self.key);
    }
}
