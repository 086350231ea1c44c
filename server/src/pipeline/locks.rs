//! Per-path keyed locking so at most one mutation is in flight per path at a
//! time, without serializing unrelated paths behind a single global lock.
//!
//! Grounded on the teacher's `BlobManager::current_container`
//! (`Arc<Mutex<Option<OpenContainer>>>`, a single-slot guarded resource);
//! generalized here to a map of slots, one per path, with reference-counted
//! cleanup so the map doesn't grow unboundedly as paths come and go.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

struct Slot {
    mutex: Arc<AsyncMutex<()>>,
    refcount: AtomicUsize,
}

#[derive(Default)]
pub struct PathLocks {
    slots: StdMutex<HashMap<String, Arc<Slot>>>,
}

pub struct PathLockGuard<'a> {
    path: String,
    owner: &'a PathLocks,
    _held: OwnedMutexGuard<()>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self {
            slots: StdMutex::new(HashMap::new()),
        }
    }

    /// Acquire the lock for `path`, blocking until any other in-flight mutation
    /// on the same path finishes. Held only across the commit step of an
    /// upload/delete/rollback, never across the body stream.
    pub async fn lock(&self, path: &str) -> PathLockGuard<'_> {
        let slot = {
            let mut slots = self.slots.lock().unwrap();
            let slot = slots
                .entry(path.to_string())
                .or_insert_with(|| {
                    Arc::new(Slot {
                        mutex: Arc::new(AsyncMutex::new(())),
                        refcount: AtomicUsize::new(0),
                    })
                })
                .clone();
            slot.refcount.fetch_add(1, Ordering::SeqCst);
            slot
        };

        let held = slot.mutex.clone().lock_owned().await;

        PathLockGuard {
            path: path.to_string(),
            owner: self,
            _held: held,
        }
    }
}

impl Drop for PathLockGuard<'_> {
    fn drop(&mut self) {
        let mut slots = self.owner.slots.lock().unwrap();
        if let Some(slot) = slots.get(&self.path) {
            if slot.refcount.fetch_sub(1, Ordering::SeqCst) == 1 {
                slots.remove(&self.path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn serializes_same_path() {
        let locks = Arc::new(PathLocks::new());
        let order = Arc::new(StdMutex::new(Vec::new()));

        let l1 = locks.clone();
        let o1 = order.clone();
        let h1 = tokio::spawn(async move {
            let _g = l1.lock("/a.txt").await;
            tokio::time::sleep(Duration::from_millis(20)).await;
            o1.lock().unwrap().push(1);
        });

        tokio::time::sleep(Duration::from_millis(5)).await;

        let l2 = locks.clone();
        let o2 = order.clone();
        let h2 = tokio::spawn(async move {
            let _g = l2.lock("/a.txt").await;
            o2.lock().unwrap().push(2);
        });

        h1.await.unwrap();
        h2.await.unwrap();
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn cleans_up_slot_after_release() {
        let locks = PathLocks::new();
        {
            let _g = locks.lock("/a.txt").await;
        }
        assert!(locks.slots.lock().unwrap().is_empty());
    }
}
