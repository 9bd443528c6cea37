//! Protected container adapters (component C4, continued).
//!
//! Grounded on `aterm_container.rs`: a protected container wraps its backing
//! collection in a [`BfGuarded`] shared with the root set, registering once
//! on construction and deregistering on `Drop`. Every mutator takes only the
//! shared lock (via `BfGuarded::mutate`) so unrelated threads' container
//! mutations don't serialize against each other; a concurrent mark still
//! sees a stable view because it only reads while holding the exclusive
//! lock. Cell assignment stores whole term identities, never torn.
//!
//! `ProtectedMapping`'s backing `HashMap` rehashes itself transparently
//! inside `insert`, under that same shared lock rather than the exclusive
//! lock a manually managed bucket array would need — the same call this
//! crate makes for `gc::resize_phase`, since there is no separate rehash step
//! to gate behind anything stronger.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::hash::Hash;
use std::sync::Arc;

use crate::lock::BfGuarded;
use crate::pool;
use crate::root_set::Markable;
use crate::term::ATerm;
use crate::term::ATermRef;
use crate::term::RawTerm;

impl<C: Markable + Send + Sync> Markable for BfGuarded<C> {
    fn mark(&self, worklist: &mut Vec<RawTerm>) {
        self.read().mark(worklist);
    }
    fn size(&self) -> usize {
        self.read().size()
    }
}

impl Markable for Vec<RawTerm> {
    fn mark(&self, worklist: &mut Vec<RawTerm>) {
        worklist.extend(self.iter().copied());
    }
    fn size(&self) -> usize {
        self.len()
    }
}

impl Markable for VecDeque<RawTerm> {
    fn mark(&self, worklist: &mut Vec<RawTerm>) {
        worklist.extend(self.iter().copied());
    }
    fn size(&self) -> usize {
        self.len()
    }
}

impl<K: Eq + Hash + Send + Sync + 'static> Markable for HashMap<K, RawTerm> {
    fn mark(&self, worklist: &mut Vec<RawTerm>) {
        worklist.extend(self.values().copied());
    }
    fn size(&self) -> usize {
        self.len()
    }
}

/// A protected container: registers itself as a root on construction,
/// deregisters on drop, and arbitrates every access through the process's
/// shared/exclusive lock.
struct Protected<C: Markable + Send + Sync + 'static> {
    data: Arc<BfGuarded<C>>,
    root: usize,
}

impl<C: Markable + Send + Sync + 'static> Protected<C> {
    fn new(initial: C) -> Self {
        let data: Arc<BfGuarded<C>> = pool::with_thread_pool(|thread_pool| thread_pool.new_protected_container(initial));
        let markable: Arc<dyn Markable + Send + Sync> = data.clone();
        let root = pool::with_thread_pool(|thread_pool| thread_pool.protect_container(markable));
        Protected { data, root }
    }
}

impl<C: Markable + Send + Sync + 'static> Drop for Protected<C> {
    fn drop(&mut self) {
        pool::with_thread_pool(|thread_pool| thread_pool.unprotect_container(self.root));
    }
}

/// A growable, protected sequence of terms.
pub struct ProtectedSequence {
    inner: Protected<Vec<RawTerm>>,
}

impl ProtectedSequence {
    pub fn new() -> Self {
        ProtectedSequence {
            inner: Protected::new(Vec::new()),
        }
    }

    pub fn push(&self, term: ATermRef<'_>) {
        self.inner.data.mutate(|v| v.push(term.raw));
    }

    pub fn get(&self, index: usize) -> Option<ATermRef<'_>> {
        self.inner.data.read().get(index).map(|raw| ATermRef::new(*raw))
    }

    pub fn len(&self) -> usize {
        self.inner.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ProtectedSequence {
    fn default() -> Self {
        Self::new()
    }
}

/// A protected double-ended sequence.
pub struct ProtectedDeque {
    inner: Protected<VecDeque<RawTerm>>,
}

impl ProtectedDeque {
    pub fn new() -> Self {
        ProtectedDeque {
            inner: Protected::new(VecDeque::new()),
        }
    }

    pub fn push_back(&self, term: ATermRef<'_>) {
        self.inner.data.mutate(|v| v.push_back(term.raw));
    }

    pub fn push_front(&self, term: ATermRef<'_>) {
        self.inner.data.mutate(|v| v.push_front(term.raw));
    }

    pub fn pop_front(&self) -> Option<ATerm> {
        self.inner.data.mutate(|v| v.pop_front()).map(ATerm::from_raw)
    }

    pub fn pop_back(&self) -> Option<ATerm> {
        self.inner.data.mutate(|v| v.pop_back()).map(ATerm::from_raw)
    }

    pub fn len(&self) -> usize {
        self.inner.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ProtectedDeque {
    fn default() -> Self {
        Self::new()
    }
}

/// A protected LIFO stack, backed by the same storage as a sequence.
pub struct ProtectedStack {
    inner: Protected<Vec<RawTerm>>,
}

impl ProtectedStack {
    pub fn new() -> Self {
        ProtectedStack {
            inner: Protected::new(Vec::new()),
        }
    }

    pub fn push(&self, term: ATermRef<'_>) {
        self.inner.data.mutate(|v| v.push(term.raw));
    }

    pub fn pop(&self) -> Option<ATerm> {
        self.inner.data.mutate(|v| v.pop()).map(ATerm::from_raw)
    }

    pub fn top(&self) -> Option<ATermRef<'_>> {
        self.inner.data.read().last().map(|raw| ATermRef::new(*raw))
    }

    pub fn len(&self) -> usize {
        self.inner.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ProtectedStack {
    fn default() -> Self {
        Self::new()
    }
}

/// A protected mapping from an arbitrary (non-term) key to a term value.
pub struct ProtectedMapping<K: Eq + Hash + Send + Sync + 'static> {
    inner: Protected<HashMap<K, RawTerm>>,
}

impl<K: Eq + Hash + Send + Sync + 'static> ProtectedMapping<K> {
    pub fn new() -> Self {
        ProtectedMapping {
            inner: Protected::new(HashMap::new()),
        }
    }

    pub fn insert(&self, key: K, term: ATermRef<'_>) {
        self.inner.data.mutate(|m| m.insert(key, term.raw));
    }

    pub fn get(&self, key: &K) -> Option<ATermRef<'_>> {
        self.inner.data.read().get(key).map(|raw| ATermRef::new(*raw))
    }

    pub fn remove(&self, key: &K) -> Option<ATerm> {
        self.inner.data.mutate(|m| m.remove(key)).map(ATerm::from_raw)
    }

    pub fn len(&self) -> usize {
        self.inner.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash + Send + Sync + 'static> Default for ProtectedMapping<K> {
    fn default() -> Self {
        Self::new()
    }
}
