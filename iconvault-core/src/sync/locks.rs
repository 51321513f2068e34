//! Keyed lock arena for per-icon serialization
//!
//! One exclusive async lock per icon name, created lazily and never removed,
//! so two operations on the same icon always contend on the same handle.
//! Operations on distinct icons proceed in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Arena of per-key exclusive locks.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    arena: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `key`, waiting if another holder has it.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let handle = {
            let mut arena = self
                .arena
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            Arc::clone(
                arena
                    .entry(key.to_string())
                    .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
            )
        };
        handle.lock_owned().await
    }

    /// Number of keys ever locked (handles are never pruned).
    pub fn len(&self) -> usize {
        self.arena
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
