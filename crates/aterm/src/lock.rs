//! The busy/forbidden shared/exclusive lock (component C1).
//!
//! Many threads may create, look up and copy terms concurrently. Any one
//! thread may ask for exclusive access (to mark, sweep or rehash) while every
//! other thread is made to quiesce. The protocol avoids a kernel
//! reader-writer lock on the fast path: acquiring shared access is two atomic
//! stores plus a branch, unless an exclusive acquisition is already pending.
//!
//! This mirrors `busy_forbidden.rs` in the teacher crate, reimplemented in
//! plain Rust (no FFI): each thread owns a pair of atomic flags registered in
//! a process-wide table, and the exclusive acquirer takes a `parking_lot`
//! mutex, raises every other thread's `forbidden` flag and spins until each
//! thread's `busy` flag clears.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use log::trace;
use parking_lot::Mutex;
use parking_lot::MutexGuard;

static NEXT_MUTEX_ID: AtomicUsize = AtomicUsize::new(0);

struct ThreadFlags {
    busy: AtomicBool,
    forbidden: AtomicBool,
}

impl ThreadFlags {
    fn new() -> Self {
        ThreadFlags {
            busy: AtomicBool::new(false),
            forbidden: AtomicBool::new(false),
        }
    }
}

thread_local! {
    // Cache of per-(SharedMutex, thread) flags, and the shared/exclusive
    // reentrancy depth for this thread against that mutex. Keyed by the
    // mutex's process-wide id rather than a pointer so the cache survives a
    // `SharedMutex` being moved into its owning struct.
    static LOCAL: std::cell::RefCell<HashMap<usize, LocalState>> = std::cell::RefCell::new(HashMap::new());
}

struct LocalState {
    flags: Arc<ThreadFlags>,
    shared_depth: usize,
    exclusive_depth: usize,
}

/// A shared/exclusive lock implementing the busy/forbidden protocol.
///
/// `SharedMutex` is meant to be embedded once per term pool (there is exactly
/// one process-wide instance backing the global term pool, see [`crate::pool`]),
/// but nothing here assumes a singleton; tests may construct their own.
pub struct SharedMutex {
    id: usize,
    global: Mutex<()>,
    threads: Mutex<Vec<Arc<ThreadFlags>>>,
}

impl Default for SharedMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedMutex {
    pub fn new() -> Self {
        SharedMutex {
            id: NEXT_MUTEX_ID.fetch_add(1, Ordering::Relaxed),
            global: Mutex::new(()),
            threads: Mutex::new(Vec::new()),
        }
    }

    fn local_flags(&self) -> Arc<ThreadFlags> {
        LOCAL.with(|local| {
            let mut local = local.borrow_mut();
            if let Some(state) = local.get(&self.id) {
                return state.flags.clone();
            }

            let flags = Arc::new(ThreadFlags::new());
            self.threads.lock().push(flags.clone());
            local.insert(
                self.id,
                LocalState {
                    flags: flags.clone(),
                    shared_depth: 0,
                    exclusive_depth: 0,
                },
            );
            flags
        })
    }

    /// Acquires shared (read/create) access. Reentrant: nested calls from the
    /// same thread only increment a depth counter.
    pub fn lock_shared(&self) -> SharedGuard<'_> {
        let flags = self.local_flags();

        let depth = LOCAL.with(|local| local.borrow()[&self.id].shared_depth);
        if depth == 0 {
            flags.busy.store(true, Ordering::SeqCst);

            let mut iterations = 0u64;
            while flags.forbidden.load(Ordering::SeqCst) {
                flags.busy.store(false, Ordering::SeqCst);
                trace!(
                    "shared lock {} yielding to a pending exclusive acquisition (iteration {})",
                    self.id,
                    iterations
                );
                // Briefly contend on the global mutex so the exclusive
                // acquirer, which holds it for the duration of its section,
                // gets a chance to finish raising every thread's forbidden flag
                // and to run its critical section.
                drop(self.global.lock());
                flags.busy.store(true, Ordering::SeqCst);
                iterations += 1;
            }
        }

        LOCAL.with(|local| {
            local.borrow_mut().get_mut(&self.id).unwrap().shared_depth = depth + 1;
        });

        SharedGuard { mutex: self }
    }

    fn unlock_shared(&self) {
        LOCAL.with(|local| {
            let mut local = local.borrow_mut();
            let state = local.get_mut(&self.id).unwrap();
            state.shared_depth -= 1;
            if state.shared_depth == 0 {
                state.flags.busy.store(false, Ordering::SeqCst);
            }
        });
    }

    /// Acquires exclusive access. Reentrant for the same thread.
    pub fn lock_exclusive(&self) -> ExclusiveGuard<'_> {
        let depth = LOCAL.with(|local| {
            local
                .borrow()
                .get(&self.id)
                .map(|s| s.exclusive_depth)
                .unwrap_or(0)
        });

        if depth > 0 {
            LOCAL.with(|local| {
                local.borrow_mut().get_mut(&self.id).unwrap().exclusive_depth = depth + 1;
            });
            return ExclusiveGuard {
                mutex: self,
                guard: None,
            };
        }

        // Ensure this thread is registered before locking so it never waits
        // on its own forbidden flag below.
        let own_flags = self.local_flags();
        let guard = self.global.lock();

        let threads = self.threads.lock().clone();
        for flags in &threads {
            if !Arc::ptr_eq(flags, &own_flags) {
                flags.forbidden.store(true, Ordering::SeqCst);
            }
        }

        for flags in &threads {
            if Arc::ptr_eq(flags, &own_flags) {
                continue;
            }

            let mut iterations = 0u64;
            while flags.busy.load(Ordering::SeqCst) {
                trace!(
                    "exclusive lock {} waiting for a busy thread (iteration {})",
                    self.id,
                    iterations
                );
                std::hint::spin_loop();
                iterations += 1;
            }
        }

        LOCAL.with(|local| {
            local.borrow_mut().get_mut(&self.id).unwrap().exclusive_depth = 1;
        });

        ExclusiveGuard {
            mutex: self,
            guard: Some(guard),
        }
    }

    fn unlock_exclusive(&self) {
        let depth = LOCAL.with(|local| {
            let mut local = local.borrow_mut();
            let state = local.get_mut(&self.id).unwrap();
            state.exclusive_depth -= 1;
            state.exclusive_depth
        });

        if depth == 0 {
            let own_flags = self.local_flags();
            for flags in self.threads.lock().iter() {
                if !Arc::ptr_eq(flags, &own_flags) {
                    flags.forbidden.store(false, Ordering::SeqCst);
                }
            }
        }
    }

    /// Whether the current thread currently holds shared access (directly or
    /// through a reentrant call).
    pub fn is_shared_locked(&self) -> bool {
        LOCAL.with(|local| {
            local
                .borrow()
                .get(&self.id)
                .map(|s| s.shared_depth > 0)
                .unwrap_or(false)
        })
    }
}

/// RAII guard for shared access. Releases on drop, balancing the matching
/// `lock_shared` call.
pub struct SharedGuard<'a> {
    mutex: &'a SharedMutex,
}

impl Drop for SharedGuard<'_> {
    fn drop(&mut self) {
        self.mutex.unlock_shared();
    }
}

/// RAII guard for exclusive access.
pub struct ExclusiveGuard<'a> {
    mutex: &'a SharedMutex,
    // `None` for reentrant acquisitions; only the outermost guard actually
    // holds the process-wide mutex.
    guard: Option<MutexGuard<'a, ()>>,
}

impl Drop for ExclusiveGuard<'_> {
    fn drop(&mut self) {
        self.mutex.unlock_exclusive();
        // `self.guard` (if any) drops after this, releasing the global mutex
        // only once every other thread's forbidden flag has been cleared.
    }
}

/// A value whose access is arbitrated entirely by a [`SharedMutex`], rather
/// than by a lock embedded in the value itself. Mirrors `BfTermPool<T>` in
/// the teacher crate: many threads may call [`BfGuarded::read`] concurrently,
/// and [`BfGuarded::write`] requires the exclusive mode of the same
/// `SharedMutex`.
///
/// # Safety
/// Every access must go through `read`/`write`; nothing prevents misuse from
/// within this module, but callers are all within this crate and follow the
/// discipline enforced by the public API.
pub struct BfGuarded<T> {
    mutex: Arc<SharedMutex>,
    data: std::cell::UnsafeCell<T>,
}

unsafe impl<T: Send> Send for BfGuarded<T> {}
unsafe impl<T: Send> Sync for BfGuarded<T> {}

impl<T> BfGuarded<T> {
    pub fn new(mutex: Arc<SharedMutex>, value: T) -> Self {
        BfGuarded {
            mutex,
            data: std::cell::UnsafeCell::new(value),
        }
    }

    pub fn read(&self) -> BfReadGuard<'_, T> {
        let guard = self.mutex.lock_shared();
        BfReadGuard { guard, data: &self.data }
    }

    pub fn write(&self) -> BfWriteGuard<'_, T> {
        let guard = self.mutex.lock_exclusive();
        BfWriteGuard { guard, data: &self.data }
    }

    /// Mutates `T` while holding only the *shared* mode of the lock.
    ///
    /// Sound as long as callers uphold the discipline §4.4 describes for
    /// protected containers: a given `BfGuarded` instance is only ever
    /// mutated by the thread that owns it (its per-thread protection set, or
    /// a container it created); every other thread only ever observes it
    /// through `read`, and only while holding the *exclusive* mode (so never
    /// concurrently with this call).
    pub fn mutate<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let _guard = self.mutex.lock_shared();
        f(unsafe { &mut *self.data.get() })
    }
}

pub struct BfReadGuard<'a, T> {
    #[allow(dead_code)]
    guard: SharedGuard<'a>,
    data: &'a std::cell::UnsafeCell<T>,
}

impl<T> std::ops::Deref for BfReadGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.data.get() }
    }
}

pub struct BfWriteGuard<'a, T> {
    #[allow(dead_code)]
    guard: ExclusiveGuard<'a>,
    data: &'a std::cell::UnsafeCell<T>,
}

impl<T> std::ops::Deref for BfWriteGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.data.get() }
    }
}

impl<T> std::ops::DerefMut for BfWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.data.get() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn shared_locks_are_reentrant() {
        let mutex = SharedMutex::new();
        let a = mutex.lock_shared();
        assert!(mutex.is_shared_locked());
        let b = mutex.lock_shared();
        drop(b);
        assert!(mutex.is_shared_locked());
        drop(a);
        assert!(!mutex.is_shared_locked());
    }

    #[test_log::test]
    fn exclusive_excludes_shared_from_other_threads() {
        use std::sync::Arc as StdArc;

        let mutex = StdArc::new(SharedMutex::new());
        let data = BfGuarded::new(mutex.clone(), 0usize);
        let data = StdArc::new(data);

        std::thread::scope(|scope| {
            for _ in 0..4 {
                let data = data.clone();
                scope.spawn(move || {
                    for _ in 0..1000 {
                        *data.write() += 1;
                    }
                });
            }
        });

        assert_eq!(*data.read(), 4000);
    }

    #[test_log::test]
    fn exclusive_is_reentrant() {
        let mutex = SharedMutex::new();
        let outer = mutex.lock_exclusive();
        let inner = mutex.lock_exclusive();
        drop(inner);
        drop(outer);
    }
}
