//! Type aliases for commonly used complex types.
//!
//! Gives meaningful names to the shared-state wrappers used across the
//! crates so the same pattern reads the same way everywhere.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

/// A thread-safe, mutex-protected wrapper for cross-thread sharing.
///
/// Uses `parking_lot::Mutex` for better performance than `std::sync::Mutex`.
pub type ThreadSafe<T> = Arc<Mutex<T>>;

/// A thread-safe wrapper allowing concurrent reads.
pub type ThreadSafeRw<T> = Arc<RwLock<T>>;

/// A thread-safe hash map for cross-thread key-value storage.
pub type ThreadSafeMap<K, V> = Arc<RwLock<HashMap<K, V>>>;

/// Create a new [`ThreadSafe`] value.
pub fn thread_safe<T>(value: T) -> ThreadSafe<T> {
    Arc::new(Mutex::new(value))
}

/// Create a new [`ThreadSafeRw`] value.
pub fn thread_safe_rw<T>(value: T) -> ThreadSafeRw<T> {
    Arc::new(RwLock::new(value))
}

/// Create a new, empty [`ThreadSafeMap`].
pub fn thread_safe_map<K, V>() -> ThreadSafeMap<K, V> {
    Arc::new(RwLock::new(HashMap::new()))
}
