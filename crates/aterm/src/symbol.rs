//! The function-symbol pool (component C2): interned `(name, arity)` pairs
//! with stable identity, reference counts and "registered prefix" counters
//! for fresh-name generation.
//!
//! Grounded on `symbol.rs` and `function_symbol_pool.h` in the reference
//! material: `create` returns the canonical symbol for a `(name, arity)`
//! pair, `register_prefix`/`deregister` hand out shared counters, and
//! `sweep` purges symbols nobody references any more.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use log::trace;

use crate::term::ATermRef;

/// The interned representation of a function symbol. Never constructed
/// directly by users; reached only through [`Symbol`]/[`SymbolRef`].
pub(crate) struct SymbolData {
    name: Box<str>,
    arity: usize,
    pub(crate) creation_hook: parking_lot::Mutex<Option<CreationHook>>,
    pub(crate) deletion_hook: parking_lot::Mutex<Option<DeletionHook>>,
}

impl SymbolData {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn arity(&self) -> usize {
        self.arity
    }
}

impl fmt::Debug for SymbolData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymbolData")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

pub type CreationHook = Arc<dyn Fn(ATermRef<'_>) + Send + Sync>;
pub type DeletionHook = Arc<dyn Fn(ATermRef<'_>) + Send + Sync>;

/// A reference-counted handle to an interned function symbol.
///
/// Two `Symbol`s compare, hash and order by identity: since `SymbolPool`
/// guarantees a single canonical [`SymbolData`] per `(name, arity)`, pointer
/// equality is structural equality.
#[derive(Clone)]
pub struct Symbol {
    pub(crate) data: Arc<SymbolData>,
}

impl Symbol {
    pub fn name(&self) -> &str {
        &self.data.name
    }

    pub fn arity(&self) -> usize {
        self.data.arity
    }

    pub fn borrow(&self) -> SymbolRef<'_> {
        SymbolRef { data: &self.data }
    }

    pub(crate) fn address(&self) -> usize {
        Arc::as_ptr(&self.data) as usize
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.data.name, self.data.arity)
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}
impl Eq for Symbol {}

impl std::hash::Hash for Symbol {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.address().hash(state);
    }
}

impl PartialOrd for Symbol {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Symbol {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.address().cmp(&other.address())
    }
}

/// A borrowed view of a [`Symbol`], cheap to copy, used for lookups that do
/// not need to keep the symbol alive beyond the current call.
#[derive(Clone, Copy)]
pub struct SymbolRef<'a> {
    data: &'a Arc<SymbolData>,
}

impl<'a> SymbolRef<'a> {
    pub fn name(&self) -> &str {
        &self.data.name
    }

    pub fn arity(&self) -> usize {
        self.data.arity
    }

    pub fn protect(&self) -> Symbol {
        Symbol {
            data: self.data.clone(),
        }
    }
}

#[derive(Hash, PartialEq, Eq, Clone)]
struct SymbolKey {
    name: Box<str>,
    arity: usize,
}

/// The interning table behind component C2.
///
/// The pool itself holds one strong [`Arc`] per interned symbol; a symbol's
/// "reference count" in the specification's sense is therefore
/// `Arc::strong_count(..) - 1` (everything beyond the pool's own copy). A
/// symbol is only actually dropped by [`SymbolPool::sweep`], never as a side
/// effect of the last external handle going away — matching "symbols ...
/// released only when reference count reaches zero during an explicit
/// sweep".
pub struct SymbolPool {
    table: HashMap<SymbolKey, Arc<SymbolData>>,
    prefixes: HashMap<Box<str>, Arc<AtomicU64>>,
    hits: u64,
    misses: u64,
}

impl SymbolPool {
    pub fn new() -> Self {
        SymbolPool {
            table: HashMap::new(),
            prefixes: HashMap::new(),
            hits: 0,
            misses: 0,
        }
    }

    /// Interns `(name, arity)`, optionally registering its numeric suffix
    /// against any matching registered prefix.
    pub fn create(&mut self, name: &str, arity: usize, check_for_registered_prefix: bool) -> Symbol {
        let key = SymbolKey {
            name: name.into(),
            arity,
        };

        let data = if let Some(existing) = self.table.get(&key) {
            self.hits += 1;
            existing.clone()
        } else {
            self.misses += 1;
            trace!("interning new function symbol {name}/{arity}");
            let data = Arc::new(SymbolData {
                name: name.into(),
                arity,
                creation_hook: parking_lot::Mutex::new(None),
                deletion_hook: parking_lot::Mutex::new(None),
            });
            self.table.insert(key, data.clone());
            data
        };

        if check_for_registered_prefix {
            self.bump_matching_prefix(name);
        }

        Symbol { data }
    }

    fn bump_matching_prefix(&self, name: &str) {
        for (prefix, counter) in &self.prefixes {
            if let Some(digits) = name.strip_prefix(prefix.as_ref()) {
                if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
                    if let Ok(value) = digits.parse::<u64>() {
                        counter.fetch_max(value + 1, Ordering::SeqCst);
                    }
                }
            }
        }
    }

    /// Returns a shared counter guaranteed to exceed the numeric suffix of
    /// every symbol named `prefix·digits` interned so far.
    pub fn register_prefix(&mut self, prefix: &str) -> Arc<AtomicU64> {
        let mut start = 0u64;
        for key in self.table.keys() {
            if let Some(digits) = key.name.strip_prefix(prefix) {
                if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
                    if let Ok(value) = digits.parse::<u64>() {
                        start = start.max(value + 1);
                    }
                }
            }
        }

        self.prefixes
            .entry(prefix.into())
            .or_insert_with(|| Arc::new(AtomicU64::new(start)))
            .clone()
    }

    pub fn deregister(&mut self, prefix: &str) {
        self.prefixes.remove(prefix);
    }

    /// Removes every symbol with no external holders. Must be called while
    /// the process holds the exclusive lock.
    pub fn sweep(&mut self) {
        let before = self.table.len();
        self.table.retain(|_, data| Arc::strong_count(data) > 1);
        trace!(
            "symbol pool sweep removed {} of {} symbols",
            before - self.table.len(),
            before
        );
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl Default for SymbolPool {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SymbolPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "symbol pool: {} symbols, {} hits, {} misses ({:.1}% hit rate)",
            self.table.len(),
            self.hits,
            self.misses,
            100.0 * self.hits as f64 / (self.hits + self.misses).max(1) as f64
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn create_is_canonical() {
        let mut pool = SymbolPool::new();
        let a = pool.create("f", 2, false);
        let b = pool.create("f", 2, false);
        assert_eq!(a, b);

        let c = pool.create("f", 1, false);
        assert_ne!(a, c);
    }

    #[test_log::test]
    fn prefix_monotonicity() {
        let mut pool = SymbolPool::new();
        pool.create("x1", 0, true);
        pool.create("x7", 0, true);
        pool.create("x3", 0, true);

        let counter = pool.register_prefix("x");
        assert!(counter.load(Ordering::SeqCst) >= 8);
    }

    #[test_log::test]
    fn sweep_removes_unreferenced_symbols() {
        let mut pool = SymbolPool::new();
        {
            let _f = pool.create("f", 1, false);
            assert_eq!(pool.len(), 1);
            pool.sweep();
            assert_eq!(pool.len(), 1, "still referenced, must survive sweep");
        }
        pool.sweep();
        assert_eq!(pool.len(), 0, "no references left, must be swept");
    }
}
