//! Shared configuration handles and lock helpers

use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Configuration shared between a delegate and the persistence layer
pub type Shared<T> = Arc<RwLock<T>>;

/// Wrap a value for sharing
pub fn shared<T>(value: T) -> Shared<T> {
    Arc::new(RwLock::new(value))
}

// A panic on another thread must not wedge the scheduler, so poisoned locks
// are recovered rather than propagated.

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}
