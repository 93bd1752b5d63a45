use super::WindowEntry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Storage for fixed-window entries.
///
/// Implementations must make [`WindowStore::update`] atomic per key: no
/// other `update` for the same key may interleave between reading the
/// slot and writing it back. The closure must not block.
pub trait WindowStore: Send + Sync + std::fmt::Debug {
    /// Run `f` on the slot for `key` and persist what it leaves behind.
    ///
    /// `None` going in means no entry; leaving `None` removes the entry.
    fn update<T, F>(&self, key: &str, f: F) -> T
    where
        F: FnOnce(&mut Option<WindowEntry>) -> T;

    /// Snapshot of the entry for `key`, expired or not.
    fn get(&self, key: &str) -> Option<WindowEntry>;

    /// Remove every entry expired at `now_millis`; returns how many went.
    fn remove_expired(&self, now_millis: u64) -> usize;

    /// Number of stored entries, including expired ones not yet swept.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-local store guarded by a single mutex.
///
/// Contention is low (one short critical section per check), so one lock
/// for the whole map is enough.
#[derive(Default, Clone, Debug)]
pub struct InMemoryWindowStore {
    // Map key -> (count, reset_at)
    data: Arc<Mutex<HashMap<String, WindowEntry>>>,
}

impl InMemoryWindowStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Entries are plain data, so a panic mid-update cannot leave one
    // half-written; keep serving after poisoning.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, WindowEntry>> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl WindowStore for InMemoryWindowStore {
    fn update<T, F>(&self, key: &str, f: F) -> T
    where
        F: FnOnce(&mut Option<WindowEntry>) -> T,
    {
        let mut guard = self.lock();
        match guard.get_mut(key) {
            Some(existing) => {
                let mut slot = Some(*existing);
                let out = f(&mut slot);
                match slot {
                    Some(entry) => *existing = entry,
                    None => {
                        guard.remove(key);
                    }
                }
                out
            }
            None => {
                let mut slot = None;
                let out = f(&mut slot);
                if let Some(entry) = slot {
                    guard.insert(key.to_string(), entry);
                }
                out
            }
        }
    }

    fn get(&self, key: &str) -> Option<WindowEntry> {
        self.lock().get(key).copied()
    }

    fn remove_expired(&self, now_millis: u64) -> usize {
        let mut guard = self.lock();
        let before = guard.len();
        guard.retain(|_, entry| !entry.is_expired(now_millis));
        before - guard.len()
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}
