/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A scoped mutual-exclusion primitive shared by the block store, per-peer idle tracking, and the
//! catch-up single-flight guard.
//!
//! `Lock` guards no data of its own. It serializes *tasks*: a closure passed to
//! [`use_exclusively`](Lock::use_exclusively) runs while no other task holds the lock, and the lock is
//! released when the closure returns, whether it returns normally, returns an error, or panics.

use std::sync::{Mutex, MutexGuard, TryLockError};

#[derive(Default)]
pub struct Lock {
    mutex: Mutex<()>,
}

impl Lock {
    pub fn new() -> Self {
        Self { mutex: Mutex::new(()) }
    }

    /// Run `task` once every earlier holder of the lock has released it.
    pub fn use_exclusively<T>(&self, task: impl FnOnce() -> T) -> T {
        let _guard = self.acquire();
        task()
    }

    /// Run `task` only if the lock is free right now. Returns `None` without running `task` otherwise.
    pub fn try_use<T>(&self, task: impl FnOnce() -> T) -> Option<T> {
        let _guard = match self.mutex.try_lock() {
            Ok(guard) => guard,
            // A task that panicked while holding the lock leaves nothing to repair.
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return None,
        };
        Some(task())
    }

    /// Whether some task currently holds the lock.
    pub fn is_locked(&self) -> bool {
        matches!(self.mutex.try_lock(), Err(TryLockError::WouldBlock))
    }

    fn acquire(&self) -> MutexGuard<'_, ()> {
        self.mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
