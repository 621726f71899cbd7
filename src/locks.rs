//! Per-key async mutexes
//!
//! Serializes read-modify-write cycles on one document (a user, a quest, a
//! collectible) inside the process. Cross-process safety comes from the
//! store's conditional update; this only removes needless conflicts.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Idle entries are pruned once the map grows past this many keys
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`. Released when the guard drops.
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let slot = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            if locks.len() > PRUNE_THRESHOLD {
                locks.retain(|_, slot| Arc::strong_count(slot) > 1);
            }
            Arc::clone(locks.entry(key.to_string()).or_default())
        };
        slot.lock_owned().await
    }
}
