use std::sync::Mutex;
use std::sync::MutexGuard;

use once_cell::sync::Lazy;

pub type GlobalLockGuard = MutexGuard<'static, ()>;

/// A global lock, independent of any particular term pool, used to guard
/// bootstrap and teardown code that must not run concurrently with itself
/// (for instance registering a distinguished function symbol).
pub fn lock_global() -> GlobalLockGuard {
    GLOBAL_MUTEX.lock().expect("Failed to lock GLOBAL_MUTEX")
}

static GLOBAL_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));
