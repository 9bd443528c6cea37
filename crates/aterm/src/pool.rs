//! The public façade: a process-wide [`GlobalTermPool`] singleton plus a
//! per-thread [`ThreadTermPool`], mirroring the split `aterm_pool.rs`/
//! `global_aterm_pool.rs` make in the teacher crate between `THREAD_TERM_POOL`
//! and `GLOBAL_TERM_POOL`.

use std::cell::Cell;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use log::debug;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::error::ATermError;
use crate::error::Result;
use crate::gc;
use crate::lock::BfGuarded;
use crate::lock::SharedMutex;
use crate::root_set::Markable;
use crate::root_set::RootSet;
use crate::root_set::SharedContainerProtectionSet;
use crate::root_set::SharedProtectionSet;
use crate::storage::Storages;
use crate::symbol::Symbol;
use crate::symbol::SymbolPool;
use crate::term::ATerm;
use crate::term::ATermRef;
use crate::term::RawTerm;

pub(crate) const INT_TAG_NAME: &str = "Int-tag";
pub(crate) const LIST_CONS_NAME: &str = "List-cons";
pub(crate) const EMPTY_LIST_NAME: &str = "Empty-list";

const INITIAL_THRESHOLD: usize = 10_000;

struct Bootstrap {
    int_tag: Symbol,
    list_cons: Symbol,
    empty_list_symbol: Symbol,
    empty_list_term: RawTerm,
}

/// The process-wide term pool. Every field is synchronized at the
/// granularity it actually needs: `mutex` arbitrates shared (creating,
/// reading) vs. exclusive (collecting) access to the storages and root set
/// (§4.1), `symbols` and `root_set` get their own small locks since they are
/// touched independently of term creation, and the countdown
/// counters/GC-enabled flag are plain atomics so reading or decrementing
/// them never contends with anything else. There is deliberately no single
/// lock wrapping the whole struct: `storages` is itself internally
/// synchronized per storage (see `crate::storage`), so two threads creating
/// terms of different arities run fully concurrently under `mutex`'s shared
/// mode, per §5.
pub(crate) struct GlobalTermPool {
    pub(crate) mutex: Arc<SharedMutex>,
    symbols: Mutex<SymbolPool>,
    pub(crate) storages: Storages,
    root_set: Mutex<RootSet>,
    bootstrap: Bootstrap,
    until_collection: AtomicUsize,
    until_resize: AtomicUsize,
    gc_enabled: AtomicBool,
}

impl GlobalTermPool {
    fn new() -> Self {
        let mutex = Arc::new(SharedMutex::new());
        let mut symbols = SymbolPool::new();
        let storages = Storages::new();

        // The three distinguished symbols are registered before any term
        // storage is used, so any thread touching the pool for the first
        // time observes them already present (§9 "Global state").
        let int_tag = symbols.create(INT_TAG_NAME, 0, false);
        let list_cons = symbols.create(LIST_CONS_NAME, 2, false);
        let empty_list_symbol = symbols.create(EMPTY_LIST_NAME, 0, false);
        let empty_list_term = storages.create_appl(&empty_list_symbol.data, &[]);

        debug!("bootstrapped global term pool");

        GlobalTermPool {
            mutex,
            symbols: Mutex::new(symbols),
            storages,
            root_set: Mutex::new(RootSet::new()),
            bootstrap: Bootstrap {
                int_tag,
                list_cons,
                empty_list_symbol,
                empty_list_term,
            },
            until_collection: AtomicUsize::new(INITIAL_THRESHOLD),
            until_resize: AtomicUsize::new(INITIAL_THRESHOLD),
            gc_enabled: AtomicBool::new(true),
        }
    }

    pub(crate) fn int_tag(&self) -> Symbol {
        self.bootstrap.int_tag.clone()
    }

    pub(crate) fn list_cons(&self) -> Symbol {
        self.bootstrap.list_cons.clone()
    }

    pub(crate) fn empty_list_symbol(&self) -> Symbol {
        self.bootstrap.empty_list_symbol.clone()
    }

    pub(crate) fn empty_list_term(&self) -> RawTerm {
        self.bootstrap.empty_list_term
    }

    pub(crate) fn symbols(&self) -> &Mutex<SymbolPool> {
        &self.symbols
    }

    pub(crate) fn root_set(&self) -> &Mutex<RootSet> {
        &self.root_set
    }

    /// Called after a successful term creation; decrements the
    /// collection/resize countdowns and reports whether a collection cycle
    /// is now due (the caller defers the actual run until it is no longer
    /// inside a recursive creation, see [`with_creation_guard`]). Takes
    /// `&self`: the counters are atomics, so concurrent creators on
    /// different storages never block each other here either.
    pub(crate) fn note_creation(&self) -> bool {
        if !self.gc_enabled.load(Ordering::Relaxed) {
            return false;
        }

        let due = self
            .until_collection
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                if v == 0 {
                    None
                } else {
                    Some(v - 1)
                }
            })
            .is_err();

        let _ = self
            .until_resize
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                if v == 0 {
                    None
                } else {
                    Some(v - 1)
                }
            });

        due
    }

    pub(crate) fn reset_countdowns(&self) {
        let capacity = self.storages.total_len().max(INITIAL_THRESHOLD);
        self.until_collection.store(capacity, Ordering::Relaxed);
        self.until_resize.store(capacity, Ordering::Relaxed);
    }

    pub(crate) fn set_gc_enabled(&self, enabled: bool) {
        self.gc_enabled.store(enabled, Ordering::Relaxed);
    }
}

pub(crate) static GLOBAL_TERM_POOL: Lazy<GlobalTermPool> = Lazy::new(GlobalTermPool::new);

pub(crate) struct ThreadTermPool {
    index: usize,
    terms: SharedProtectionSet,
    containers: SharedContainerProtectionSet,
    mutex: Arc<SharedMutex>,
    creation_depth: Cell<usize>,
    deferred_collection: Cell<bool>,
}

impl ThreadTermPool {
    fn new() -> Self {
        let mutex = GLOBAL_TERM_POOL.mutex.clone();
        let (index, terms, containers) = GLOBAL_TERM_POOL.root_set().lock().register_thread(&mutex);
        ThreadTermPool {
            index,
            terms,
            containers,
            mutex,
            creation_depth: Cell::new(0),
            deferred_collection: Cell::new(false),
        }
    }

    pub(crate) fn protect_term(&self, raw: RawTerm) -> usize {
        self.terms.mutate(|set| set.protect(raw))
    }

    pub(crate) fn unprotect_term(&self, root: usize) {
        self.terms.mutate(|set| {
            set.unprotect(root);
        });
    }

    pub(crate) fn protect_container(&self, markable: Arc<dyn Markable + Send + Sync>) -> usize {
        self.containers.mutate(|set| set.protect(markable))
    }

    pub(crate) fn unprotect_container(&self, root: usize) {
        self.containers.mutate(|set| {
            set.unprotect(root);
        });
    }

    pub(crate) fn new_protected_container<C: Markable + Send + Sync + 'static>(&self, initial: C) -> Arc<BfGuarded<C>> {
        Arc::new(BfGuarded::new(self.mutex.clone(), initial))
    }

    fn enter_creation(&self) {
        self.creation_depth.set(self.creation_depth.get() + 1);
    }

    /// Returns `true` if this was the outermost creation and a deferred
    /// collection should now run.
    fn exit_creation(&self) -> bool {
        let depth = self.creation_depth.get() - 1;
        self.creation_depth.set(depth);
        if depth == 0 {
            self.deferred_collection.replace(false)
        } else {
            false
        }
    }

    fn defer_collection(&self) {
        self.deferred_collection.set(true);
    }
}

impl Drop for ThreadTermPool {
    fn drop(&mut self) {
        GLOBAL_TERM_POOL.root_set().lock().deregister_thread(self.index);
    }
}

thread_local! {
    static THREAD_TERM_POOL: ThreadTermPool = ThreadTermPool::new();
}

pub(crate) fn with_thread_pool<R>(f: impl FnOnce(&ThreadTermPool) -> R) -> R {
    THREAD_TERM_POOL.with(f)
}

/// Runs `body`, which is assumed to perform exactly one top-level term
/// creation (itself possibly recursive), and defers any collection request
/// raised during it until the outermost call returns (§4.5 "When to
/// collect").
fn with_creation_guard<R>(body: impl FnOnce() -> R) -> R {
    with_thread_pool(|tp| tp.enter_creation());
    let result = body();
    let should_collect = with_thread_pool(|tp| tp.exit_creation());
    if should_collect {
        gc::collect();
    }
    result
}

fn note_creation_and_maybe_defer() {
    let due = GLOBAL_TERM_POOL.note_creation();
    if due {
        with_thread_pool(|tp| tp.defer_collection());
    }
}

/// A thread-facing handle to the term pool. Constructing one has no
/// additional effect beyond the implicit lazy initialization every public
/// function already performs; it exists for API parity with the teacher
/// crate's `TermPool`, for callers that prefer a method-call style.
pub struct TermPool {
    _private: (),
}

impl TermPool {
    pub fn new() -> Self {
        // Touch the thread pool so construction observably initializes it.
        with_thread_pool(|_| {});
        TermPool { _private: () }
    }

    pub fn get_function_symbol(&self, name: &str, arity: usize) -> Symbol {
        get_function_symbol(name, arity)
    }

    pub fn get_int_term(&self, value: u64) -> ATerm {
        get_int_term(value)
    }

    pub fn get_term(&self, symbol: &Symbol) -> Result<ATerm> {
        get_term(symbol)
    }

    pub fn get_applied_term(&self, symbol: &Symbol, children: &[ATermRef<'_>]) -> Result<ATerm> {
        get_applied_term(symbol, children)
    }

    pub fn empty_list(&self) -> ATerm {
        empty_list()
    }

    pub fn collect(&self) {
        collect()
    }
}

impl Default for TermPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Interns a function symbol, without registering any numeric-suffix prefix
/// bump.
pub fn get_function_symbol(name: &str, arity: usize) -> Symbol {
    GLOBAL_TERM_POOL.symbols().lock().create(name, arity, false)
}

/// Interns a function symbol, bumping any registered prefix counter that
/// matches `name`'s `prefix·digits` decomposition.
pub fn get_function_symbol_with_prefix_check(name: &str, arity: usize) -> Symbol {
    GLOBAL_TERM_POOL.symbols().lock().create(name, arity, true)
}

/// Returns the term for integer `value`, creating it if necessary. Holds the
/// process's shared lock for the duration of creation (§4.1, §4.3): any
/// number of threads may be inside this function, or `get_term`/
/// `get_applied_term`, at once, each serialized only against its own
/// storage (§5), not against each other.
pub fn get_int_term(value: u64) -> ATerm {
    with_creation_guard(|| {
        let raw = {
            let _shared = GLOBAL_TERM_POOL.mutex.lock_shared();
            let int_tag = GLOBAL_TERM_POOL.int_tag().data.clone();
            GLOBAL_TERM_POOL.storages.ints.create(&int_tag, value)
        };
        note_creation_and_maybe_defer();
        ATerm::from_raw(raw)
    })
}

/// Returns the (necessarily nullary) term for `symbol`.
pub fn get_term(symbol: &Symbol) -> Result<ATerm> {
    if symbol.arity() != 0 {
        return Err(ATermError::ArityMismatch {
            symbol: symbol.name().to_string(),
            expected: symbol.arity(),
            actual: 0,
        });
    }

    Ok(with_creation_guard(|| {
        let raw = {
            let _shared = GLOBAL_TERM_POOL.mutex.lock_shared();
            GLOBAL_TERM_POOL.storages.create_appl(&symbol.data, &[])
        };
        note_creation_and_maybe_defer();
        ATerm::from_raw(raw)
    }))
}

/// Returns the applied term `symbol(children...)`, creating it if necessary.
pub fn get_applied_term(symbol: &Symbol, children: &[ATermRef<'_>]) -> Result<ATerm> {
    if children.len() != symbol.arity() {
        return Err(ATermError::ArityMismatch {
            symbol: symbol.name().to_string(),
            expected: symbol.arity(),
            actual: children.len(),
        });
    }

    let raws: Vec<RawTerm> = children.iter().map(|c| c.raw).collect();

    Ok(with_creation_guard(|| {
        let raw = {
            let _shared = GLOBAL_TERM_POOL.mutex.lock_shared();
            GLOBAL_TERM_POOL.storages.create_appl(&symbol.data, &raws)
        };
        note_creation_and_maybe_defer();
        ATerm::from_raw(raw)
    }))
}

/// Returns the empty list constant.
pub fn empty_list() -> ATerm {
    let raw = GLOBAL_TERM_POOL.empty_list_term();
    ATerm::from_raw(raw)
}

/// Returns the `List-cons` function symbol.
pub fn list_cons_symbol() -> Symbol {
    GLOBAL_TERM_POOL.list_cons()
}

/// Returns the distinguished `Int-tag` function symbol every integer term is
/// tagged with.
pub fn int_tag_symbol() -> Symbol {
    GLOBAL_TERM_POOL.int_tag()
}

/// Returns the distinguished `Empty-list` (nullary) function symbol.
pub fn empty_list_symbol() -> Symbol {
    GLOBAL_TERM_POOL.empty_list_symbol()
}

/// Registers `callback` to run whenever a term with `symbol`'s identity is
/// first inserted into its storage.
pub fn add_creation_hook(symbol: &Symbol, callback: crate::symbol::CreationHook) {
    *symbol.data.creation_hook.lock() = Some(callback);
}

/// Registers `callback` to run whenever a term with `symbol`'s identity is
/// reclaimed by the sweep phase.
pub fn add_deletion_hook(symbol: &Symbol, callback: crate::symbol::DeletionHook) {
    *symbol.data.deletion_hook.lock() = Some(callback);
}

/// Returns a counter guaranteed to exceed the numeric suffix of every symbol
/// named `prefix·digits` interned so far; future `create` calls with
/// `check_prefix = true` keep it ahead of newly interned suffixes too.
pub fn register_prefix(prefix: &str) -> Arc<AtomicU64> {
    GLOBAL_TERM_POOL.symbols().lock().register_prefix(prefix)
}

/// Drops the shared counter previously returned by `register_prefix`.
pub fn deregister_prefix(prefix: &str) {
    GLOBAL_TERM_POOL.symbols().lock().deregister(prefix);
}

/// Requests a collection cycle now. If called while the current thread is
/// inside a recursive term creation, the request is deferred until that
/// creation's outermost call returns.
pub fn collect() {
    let depth_is_zero = with_thread_pool(|tp| tp.creation_depth.get() == 0);
    if depth_is_zero {
        gc::collect();
    } else {
        with_thread_pool(|tp| tp.defer_collection());
    }
}

/// Enables or disables automatic collection on creation thresholds. A
/// manual `collect()` call always runs mark, sweep and resize regardless of
/// this flag; disabling only suppresses the automatic threshold-triggered
/// path in [`note_creation_and_maybe_defer`], per §4.5 "Collection may be
/// globally disabled".
pub fn enable_garbage_collection(enabled: bool) {
    GLOBAL_TERM_POOL.set_gc_enabled(enabled);
}

/// Returns the total number of terms currently stored across every arity
/// storage, including the integer and dynamic storages.
pub fn term_count() -> usize {
    GLOBAL_TERM_POOL.storages.total_len()
}
