//! Per-workbook mutual exclusion
//!
//! A calculation holds its workbook's lock from the first write until the
//! reload completes, so concurrent requests against the same file never
//! interleave their write/persist/reload cycles. Different files proceed
//! in parallel.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
pub struct WorkbookLocks {
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl WorkbookLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock guarding `path`, created on first use
    pub fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key).or_default())
    }

    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Acquire a workbook lock; a panic in a previous holder leaves no state
/// behind worth refusing over.
pub fn acquire(lock: &Mutex<()>) -> MutexGuard<'_, ()> {
    lock.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_same_path_shares_lock() {
        let locks = WorkbookLocks::new();
        let a = locks.lock_for(Path::new("uploads/MATRIZ.xlsx"));
        let b = locks.lock_for(Path::new("uploads/MATRIZ.xlsx"));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(locks.len(), 1);
    }

    #[test]
    fn test_different_paths_have_distinct_locks() {
        let locks = WorkbookLocks::new();
        let a = locks.lock_for(Path::new("uploads/MATRIZ.xlsx"));
        let b = locks.lock_for(Path::new("uploads/IDEAS.xlsx"));
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_lock_serializes_critical_sections() {
        let locks = Arc::new(WorkbookLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                thread::spawn(move || {
                    let lock = locks.lock_for(Path::new("shared.xlsx"));
                    let _guard = acquire(&lock);
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(5));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }
}
