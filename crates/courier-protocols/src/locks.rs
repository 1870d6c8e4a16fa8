use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = DashMap<String, Arc<Mutex<()>>>;

/// Per-record async locks serializing read-modify-write of one exchange
/// or connection record. An entry lives only while someone holds or
/// waits for it.
#[derive(Debug, Default)]
pub struct ExchangeLocks {
    locks: Arc<LockMap>,
}

/// Exclusive access to one record id. Dropping it releases the lock and
/// removes the entry when no other task is waiting.
#[derive(Debug)]
pub struct ExchangeGuard {
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<LockMap>,
    id: String,
}

impl Drop for ExchangeGuard {
    fn drop(&mut self) {
        // Release first so the map holds the only reference left.
        self.guard.take();
        self.locks
            .remove_if(&self.id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

impl ExchangeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `id`.
    pub async fn lock(&self, id: &str) -> ExchangeGuard {
        let mutex = self
            .locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        ExchangeGuard {
            guard: Some(mutex.lock_owned().await),
            locks: self.locks.clone(),
            id: id.to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
