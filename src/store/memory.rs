use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{Observation, ObservationStore, StoreConnector, StoreError};
use crate::session::FinalMinuteWindow;

type Key = (String, DateTime<Utc>);

#[derive(Default)]
struct Shared {
    rows: Mutex<BTreeMap<Key, Observation>>,
    failing_acquires: AtomicUsize,
    failing_writes: AtomicUsize,
    open_sessions: AtomicUsize,
    acquires: AtomicUsize,
}

impl Shared {
    fn rows(&self) -> MutexGuard<'_, BTreeMap<Key, Observation>> {
        self.rows.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Take one pending injected failure, if any
fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// In-process store with the same insert-or-ignore contract as the database.
/// Cloning yields another handle onto the same rows.
#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls to `acquire` fail with `StoreError::Unavailable`
    pub fn fail_next_acquires(&self, count: usize) {
        self.shared.failing_acquires.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` upserts fail without writing anything
    pub fn fail_next_writes(&self, count: usize) {
        self.shared.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Sessions acquired and not yet dropped
    pub fn open_sessions(&self) -> usize {
        self.shared.open_sessions.load(Ordering::SeqCst)
    }

    /// Successful acquires since creation
    pub fn acquire_count(&self) -> usize {
        self.shared.acquires.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.shared.rows().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, symbol: &str, minute: DateTime<Utc>) -> Option<Observation> {
        self.shared.rows().get(&(symbol.to_string(), minute)).cloned()
    }

    /// All rows ordered by `(symbol, minute)`
    pub fn observations(&self) -> Vec<Observation> {
        self.shared.rows().values().cloned().collect()
    }
}

/// Session handed out by [`MemoryStore`]
pub struct MemorySession {
    shared: Arc<Shared>,
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.shared.open_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObservationStore for MemorySession {
    async fn upsert_batch(&mut self, rows: &[Observation]) -> Result<u64, StoreError> {
        if take_failure(&self.shared.failing_writes) {
            return Err(StoreError::Unavailable("injected write failure".to_string()));
        }

        let mut stored = self.shared.rows();
        let mut inserted = 0;
        for row in rows {
            if let std::collections::btree_map::Entry::Vacant(slot) = stored.entry(row.key()) {
                slot.insert(row.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn symbols_present_in(&mut self, window: &FinalMinuteWindow) -> Result<HashSet<String>, StoreError> {
        Ok(self
            .shared
            .rows()
            .values()
            .filter(|row| window.contains(row.minute))
            .map(|row| row.symbol.clone())
            .collect())
    }
}

#[async_trait]
impl StoreConnector for MemoryStore {
    type Session = MemorySession;

    async fn acquire(&self) -> Result<MemorySession, StoreError> {
        if take_failure(&self.shared.failing_acquires) {
            return Err(StoreError::Unavailable("injected acquire failure".to_string()));
        }

        self.shared.acquires.fetch_add(1, Ordering::SeqCst);
        self.shared.open_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(MemorySession {
            shared: Arc::clone(&self.shared),
        })
    }
}
