//! Poison-tolerant lock acquisition
//!
//! The packet hook must always produce a verdict, so a panic elsewhere that
//! poisons the blocklist lock cannot be allowed to take the hot path down
//! with it. These helpers log the poisoning once per acquisition and hand back
//! the guard; blocklist entries are plain `(address, count)` pairs, so the
//! data behind a poisoned lock is still structurally valid.

use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::error;

/// Acquire a Mutex lock, recovering from poisoning if necessary.
pub fn lock_or_recover<'a, T>(mutex: &'a Mutex<T>, context: &str) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            error!(
                "Mutex poisoned for '{}' - continuing with last written state",
                context
            );
            poisoned.into_inner()
        }
    }
}

/// Acquire a read lock, recovering from poisoning if necessary.
///
/// `context` names what the lock protects and only appears in the log line.
pub fn read_lock_or_recover<'a, T>(rwlock: &'a RwLock<T>, context: &str) -> RwLockReadGuard<'a, T> {
    match rwlock.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            error!(
                "RwLock (read) poisoned for '{}' - continuing with last written state",
                context
            );
            poisoned.into_inner()
        }
    }
}

/// Acquire a write lock, recovering from poisoning if necessary.
pub fn write_lock_or_recover<'a, T>(
    rwlock: &'a RwLock<T>,
    context: &str,
) -> RwLockWriteGuard<'a, T> {
    match rwlock.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            error!(
                "RwLock (write) poisoned for '{}' - continuing with last written state",
                context
            );
            poisoned.into_inner()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_write_then_read() {
        let rwlock = RwLock::new(BTreeMap::new());
        write_lock_or_recover(&rwlock, "test map").insert(1u32, 11u32);

        let guard = read_lock_or_recover(&rwlock, "test map");
        assert_eq!(guard.get(&1), Some(&11));
    }

    #[test]
    fn test_mutex_poisoning_recovery() {
        let mutex = Arc::new(Mutex::new(3u32));
        let mutex_clone = Arc::clone(&mutex);

        let handle = thread::spawn(move || {
            let _guard = mutex_clone.lock().unwrap();
            panic!("Intentional panic to poison the lock");
        });
        let _ = handle.join();
        assert!(mutex.is_poisoned());

        *lock_or_recover(&mutex, "poisoned mutex") += 1;
        assert_eq!(*lock_or_recover(&mutex, "poisoned mutex"), 4);
    }

    #[test]
    fn test_rwlock_poisoning_recovery() {
        let rwlock = Arc::new(RwLock::new(vec![7u32]));
        let rwlock_clone = Arc::clone(&rwlock);

        // Poison the lock by panicking while holding the write guard
        let handle = thread::spawn(move || {
            let _guard = rwlock_clone.write().unwrap();
            panic!("Intentional panic to poison the lock");
        });
        let _ = handle.join();
        assert!(rwlock.is_poisoned());

        assert_eq!(*read_lock_or_recover(&rwlock, "poisoned rwlock"), vec![7]);
        write_lock_or_recover(&rwlock, "poisoned rwlock").push(8);
        assert_eq!(read_lock_or_recover(&rwlock, "poisoned rwlock").len(), 2);
    }
}
