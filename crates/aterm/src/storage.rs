//! Per-arity hash-consed term storages (component C3).
//!
//! Grounded on `aterm_pool_storage.h` in the reference material: one storage
//! per small arity `0..=7`, one for integer terms, one "dynamic" storage for
//! arity `>= 8`. Every storage is a hash-consing set plus a block allocator
//! that hands out stable addresses; a term's identity *is* its address.
//!
//! Lookup is split from allocation: a lightweight owned [`TermKey`] is built
//! first and probed against the hash-consing table, so a duplicate request
//! never allocates a slot. This trades a little memory (the key duplicates
//! the symbol pointer and child pointers already present in the slab-resident
//! term) for never needing speculative allocation, which the original's
//! custom transparent-hashed `unordered_set` achieves a different way.
//!
//! Each storage below is internally synchronized by its own `Mutex` rather
//! than relying on a single lock over the whole pool: per §5, "insertion is
//! serialized by per-storage synchronization but runs concurrently across
//! storages under a shared lock" — callers only need to hold the process's
//! shared lock (`SharedMutex::lock_shared`) while creating a term, and two
//! threads creating distinct terms in different storages never contend on
//! each other.

use std::collections::HashMap;
use std::mem::MaybeUninit;
use std::ptr::NonNull;
use std::sync::Arc;

use ahash::AHashMap;
use log::trace;
use parking_lot::Mutex;

use crate::error::ATermError;
use crate::error::Result;
use crate::symbol::DeletionHook;
use crate::symbol::SymbolData;
use crate::term::RawTerm;
use crate::term::TermHeader;
use crate::term::TermKind;

const BLOCK_SIZE: usize = 1024;
pub(crate) const MAX_SMALL_ARITY: usize = 7;

/// A simple slab (block) allocator: slots are handed out from fixed-size
/// blocks and returned to a free list on `dealloc`, never moved. A block's
/// backing storage (`Box<[MaybeUninit<T>]>`) never reallocates, so addresses
/// handed out remain valid for as long as the allocator lives.
pub(crate) struct SlabAllocator<T> {
    blocks: Vec<Box<[MaybeUninit<T>]>>,
    free: Vec<NonNull<MaybeUninit<T>>>,
    live: usize,
}

unsafe impl<T: Send> Send for SlabAllocator<T> {}

impl<T> SlabAllocator<T> {
    fn new() -> Self {
        SlabAllocator {
            blocks: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    fn grow(&mut self) {
        let mut block: Box<[MaybeUninit<T>]> = (0..BLOCK_SIZE).map(|_| MaybeUninit::uninit()).collect();
        for slot in block.iter_mut() {
            self.free.push(NonNull::from(slot));
        }
        self.blocks.push(block);
    }

    pub(crate) fn alloc(&mut self, value: T) -> NonNull<T> {
        if self.free.is_empty() {
            self.grow();
        }
        let slot = self.free.pop().expect("just grew the free list");
        unsafe {
            let ptr = slot.as_ptr();
            (*ptr).write(value);
            self.live += 1;
            NonNull::new_unchecked((*ptr).as_mut_ptr())
        }
    }

    /// # Safety
    /// `ptr` must have been returned by `alloc` on `self` and not already
    /// freed.
    pub(crate) unsafe fn dealloc(&mut self, ptr: NonNull<T>) {
        std::ptr::drop_in_place(ptr.as_ptr());
        self.free.push(ptr.cast());
        self.live -= 1;
    }

    pub(crate) fn len(&self) -> usize {
        self.live
    }
}

/// The payload of an integer term: just the header plus the value.
#[repr(C)]
pub(crate) struct IntTerm {
    pub(crate) header: TermHeader,
    pub(crate) value: u64,
}

/// The payload of an arity-`N` applied term.
#[repr(C)]
pub(crate) struct AppliedTerm<const N: usize> {
    pub(crate) header: TermHeader,
    pub(crate) args: [RawTerm; N],
}

/// The payload of a dynamic (arity >= 8) applied term.
#[repr(C)]
pub(crate) struct DynamicTerm {
    pub(crate) header: TermHeader,
    pub(crate) args: Box<[RawTerm]>,
}

/// Returns the arity of any term, dispatching on its header's kind and
/// function symbol.
pub(crate) fn arity_of(term: RawTerm) -> usize {
    match term.header().kind {
        TermKind::Int => 0,
        TermKind::Applied => term.symbol().arity(),
    }
}

/// Returns the `index`th child of an applied term, routing to the correctly
/// typed slot via the symbol's arity.
pub(crate) fn child_at(term: RawTerm, index: usize) -> RawTerm {
    let arity = term.symbol().arity();
    unsafe {
        if arity <= MAX_SMALL_ARITY {
            macro_rules! arm {
                ($n:literal) => {
                    if arity == $n {
                        let ptr = term.0.as_ptr() as *const AppliedTerm<$n>;
                        return (*ptr).args[index];
                    }
                };
            }
            arm!(0);
            arm!(1);
            arm!(2);
            arm!(3);
            arm!(4);
            arm!(5);
            arm!(6);
            arm!(7);
            unreachable!("arity <= MAX_SMALL_ARITY covers 0..=7")
        } else {
            let ptr = term.0.as_ptr() as *const DynamicTerm;
            (*ptr).args[index]
        }
    }
}

/// Uniform operations every arity-specific storage exposes to the collection
/// orchestrator (component C5), so `gc.rs` can iterate all of them without
/// knowing their concrete arity. Every method takes `&self`: each storage
/// guards its own table and allocator behind an internal `Mutex`, so the
/// orchestrator (already holding the process's exclusive lock while it calls
/// these) never needs `&mut` access to `Storages` itself.
pub(crate) trait StorageOps: Send + Sync {
    fn len(&self) -> usize;
    /// Pushes the children of `term` (which must belong to this storage) onto
    /// `worklist`, for use while marking.
    fn mark_children(&self, term: RawTerm, worklist: &mut Vec<RawTerm>);
    /// Sweeps unmarked entries, firing deletion hooks, and clears marks on
    /// survivors. Returns the number of entries reclaimed.
    fn sweep(&self) -> usize;
    fn verify_mark(&self) -> Result<()>;
    /// Every term identity currently stored, for building the "still present"
    /// set `verify_sweep` checks children against.
    fn entries(&self) -> Vec<RawTerm>;
}

/// A hash-consed storage specialized for applied terms of exactly arity `N`.
pub(crate) struct TermStorage<const N: usize> {
    inner: Mutex<TermStorageInner<N>>,
}

struct TermStorageInner<const N: usize> {
    table: HashMap<TermKeyN<N>, RawTerm, ahash::RandomState>,
    allocator: SlabAllocator<AppliedTerm<N>>,
}

#[derive(Clone)]
struct TermKeyN<const N: usize> {
    symbol: Arc<SymbolData>,
    args: [RawTerm; N],
}

impl<const N: usize> PartialEq for TermKeyN<N> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.symbol, &other.symbol) && self.args == other.args
    }
}
impl<const N: usize> Eq for TermKeyN<N> {}

impl<const N: usize> std::hash::Hash for TermKeyN<N> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.symbol) as usize).hash(state);
        self.args.hash(state);
    }
}

impl<const N: usize> TermStorage<N> {
    fn new() -> Self {
        TermStorage {
            inner: Mutex::new(TermStorageInner {
                table: HashMap::default(),
                allocator: SlabAllocator::new(),
            }),
        }
    }

    /// Looks up or inserts the term `symbol(args...)`. `symbol.arity()` must
    /// equal `N`; callers (the `Storages` facade) check this before
    /// dispatching here. Locks only this storage's own table; a concurrent
    /// `create` on a different arity (or the integer/dynamic storage) never
    /// waits on this one.
    pub(crate) fn create(&self, symbol: &Arc<SymbolData>, args: [RawTerm; N]) -> RawTerm {
        let key = TermKeyN {
            symbol: symbol.clone(),
            args,
        };

        let raw = {
            let mut inner = self.inner.lock();
            if let Some(existing) = inner.table.get(&key) {
                return *existing;
            }

            let ptr = inner.allocator.alloc(AppliedTerm {
                header: TermHeader {
                    symbol: symbol.clone(),
                    mark: std::cell::UnsafeCell::new(false),
                    kind: TermKind::Applied,
                },
                args,
            });
            let raw = RawTerm(ptr.cast());
            inner.table.insert(key, raw);
            raw
        };

        // Fired after releasing this storage's lock: a creation hook that
        // itself constructs a term of the same arity must not deadlock on
        // re-entering this mutex.
        if let Some(hook) = symbol.creation_hook.lock().as_ref() {
            hook(crate::term::ATermRef::new(raw));
        }

        raw
    }

    pub(crate) fn verify_mark_impl(&self) -> Result<()> {
        let inner = self.inner.lock();
        for raw in inner.table.values() {
            if raw.is_marked() {
                for i in 0..N {
                    if !crate::storage::child_at(*raw, i).is_marked() {
                        return Err(ATermError::InvariantViolation(format!(
                            "marked term's child {i} is not marked (arity {N})"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

impl<const N: usize> StorageOps for TermStorage<N> {
    fn len(&self) -> usize {
        self.inner.lock().table.len()
    }

    fn mark_children(&self, term: RawTerm, worklist: &mut Vec<RawTerm>) {
        let ptr = term.0.as_ptr() as *const AppliedTerm<N>;
        let args = unsafe { &(*ptr).args };
        for child in args {
            worklist.push(*child);
        }
    }

    fn sweep(&self) -> usize {
        let mut inner = self.inner.lock();
        let mut reclaimed = 0;
        inner.table.retain(|_, raw| {
            if raw.is_marked() {
                unsafe { raw.set_mark(false) };
                true
            } else {
                if let Some(hook) = raw.symbol().deletion_hook.lock().as_ref() {
                    fire_deletion_hook(hook, *raw);
                }
                let ptr = NonNull::new(raw.0.as_ptr() as *mut AppliedTerm<N>).unwrap();
                unsafe { inner.allocator.dealloc(ptr) };
                reclaimed += 1;
                false
            }
        });
        reclaimed
    }

    fn verify_mark(&self) -> Result<()> {
        self.verify_mark_impl()
    }

    fn entries(&self) -> Vec<RawTerm> {
        self.inner.lock().table.values().copied().collect()
    }
}

fn fire_deletion_hook(hook: &DeletionHook, raw: RawTerm) {
    hook(crate::term::ATermRef::new(raw));
}

/// Storage for integer terms: keyed directly on the `u64` value, since there
/// is exactly one distinguished `Int-tag` symbol.
pub(crate) struct IntStorage {
    inner: Mutex<IntStorageInner>,
}

struct IntStorageInner {
    table: AHashMap<u64, RawTerm>,
    allocator: SlabAllocator<IntTerm>,
}

impl IntStorage {
    fn new() -> Self {
        IntStorage {
            inner: Mutex::new(IntStorageInner {
                table: AHashMap::new(),
                allocator: SlabAllocator::new(),
            }),
        }
    }

    pub(crate) fn create(&self, int_tag: &Arc<SymbolData>, value: u64) -> RawTerm {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner.table.get(&value) {
            return *existing;
        }

        let ptr = inner.allocator.alloc(IntTerm {
            header: TermHeader {
                symbol: int_tag.clone(),
                mark: std::cell::UnsafeCell::new(false),
                kind: TermKind::Int,
            },
            value,
        });
        let raw = RawTerm(ptr.cast());
        inner.table.insert(value, raw);
        raw
    }
}

impl StorageOps for IntStorage {
    fn len(&self) -> usize {
        self.inner.lock().table.len()
    }

    fn mark_children(&self, _term: RawTerm, _worklist: &mut Vec<RawTerm>) {
        // Integer terms have no children.
    }

    fn sweep(&self) -> usize {
        let mut inner = self.inner.lock();
        let mut reclaimed = 0;
        inner.table.retain(|_, raw| {
            if raw.is_marked() {
                unsafe { raw.set_mark(false) };
                true
            } else {
                let ptr = NonNull::new(raw.0.as_ptr() as *mut IntTerm).unwrap();
                unsafe { inner.allocator.dealloc(ptr) };
                reclaimed += 1;
                false
            }
        });
        reclaimed
    }

    fn verify_mark(&self) -> Result<()> {
        Ok(())
    }

    fn entries(&self) -> Vec<RawTerm> {
        self.inner.lock().table.values().copied().collect()
    }
}

/// Storage for applied terms of arity `>= 8`. Args are stored out-of-line in
/// a boxed slice rather than inline, trading a little indirection for not
/// needing a dynamically sized slab slot type.
pub(crate) struct DynamicStorage {
    inner: Mutex<DynamicStorageInner>,
}

struct DynamicStorageInner {
    table: HashMap<DynamicKey, RawTerm, ahash::RandomState>,
    allocator: SlabAllocator<DynamicTerm>,
}

#[derive(Clone)]
struct DynamicKey {
    symbol: Arc<SymbolData>,
    args: Box<[RawTerm]>,
}

impl PartialEq for DynamicKey {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.symbol, &other.symbol) && self.args == other.args
    }
}
impl Eq for DynamicKey {}
impl std::hash::Hash for DynamicKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.symbol) as usize).hash(state);
        self.args.hash(state);
    }
}

impl DynamicStorage {
    fn new() -> Self {
        DynamicStorage {
            inner: Mutex::new(DynamicStorageInner {
                table: HashMap::default(),
                allocator: SlabAllocator::new(),
            }),
        }
    }

    pub(crate) fn create(&self, symbol: &Arc<SymbolData>, args: &[RawTerm]) -> RawTerm {
        let key = DynamicKey {
            symbol: symbol.clone(),
            args: args.into(),
        };

        let raw = {
            let mut inner = self.inner.lock();
            if let Some(existing) = inner.table.get(&key) {
                return *existing;
            }

            let ptr = inner.allocator.alloc(DynamicTerm {
                header: TermHeader {
                    symbol: symbol.clone(),
                    mark: std::cell::UnsafeCell::new(false),
                    kind: TermKind::Applied,
                },
                args: args.into(),
            });
            let raw = RawTerm(ptr.cast());
            inner.table.insert(key, raw);
            raw
        };

        if let Some(hook) = symbol.creation_hook.lock().as_ref() {
            hook(crate::term::ATermRef::new(raw));
        }

        raw
    }
}

impl StorageOps for DynamicStorage {
    fn len(&self) -> usize {
        self.inner.lock().table.len()
    }

    fn mark_children(&self, term: RawTerm, worklist: &mut Vec<RawTerm>) {
        let ptr = term.0.as_ptr() as *const DynamicTerm;
        let args = unsafe { &(*ptr).args };
        worklist.extend(args.iter().copied());
    }

    fn sweep(&self) -> usize {
        let mut inner = self.inner.lock();
        let mut reclaimed = 0;
        inner.table.retain(|_, raw| {
            if raw.is_marked() {
                unsafe { raw.set_mark(false) };
                true
            } else {
                if let Some(hook) = raw.symbol().deletion_hook.lock().as_ref() {
                    fire_deletion_hook(hook, *raw);
                }
                let ptr = NonNull::new(raw.0.as_ptr() as *mut DynamicTerm).unwrap();
                unsafe { inner.allocator.dealloc(ptr) };
                reclaimed += 1;
                false
            }
        });
        reclaimed
    }

    fn verify_mark(&self) -> Result<()> {
        let inner = self.inner.lock();
        for raw in inner.table.values() {
            if raw.is_marked() {
                let ptr = raw.0.as_ptr() as *const DynamicTerm;
                let args = unsafe { &(*ptr).args };
                if args.iter().any(|child| !child.is_marked()) {
                    return Err(ATermError::InvariantViolation(
                        "marked dynamic term has an unmarked child".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    fn entries(&self) -> Vec<RawTerm> {
        self.inner.lock().table.values().copied().collect()
    }
}

macro_rules! small_storages {
    ($($field:ident => $n:literal),+ $(,)?) => {
        /// The C3 facade: one storage per small arity, one integer storage,
        /// and the dynamic (arity >= 8) storage.
        pub(crate) struct Storages {
            $(pub(crate) $field: TermStorage<$n>,)+
            pub(crate) ints: IntStorage,
            pub(crate) dynamic: DynamicStorage,
        }

        impl Storages {
            pub(crate) fn new() -> Self {
                Storages {
                    $($field: TermStorage::new(),)+
                    ints: IntStorage::new(),
                    dynamic: DynamicStorage::new(),
                }
            }

            /// Every storage as a trait object, for uniform GC traversal.
            /// Each storage arbitrates its own internal mutation, so a shared
            /// `&self` suffices here even while sweeping.
            pub(crate) fn all(&self) -> Vec<&dyn StorageOps> {
                let mut all: Vec<&dyn StorageOps> = vec![$(&self.$field,)+];
                all.push(&self.ints);
                all.push(&self.dynamic);
                all
            }

            pub(crate) fn total_len(&self) -> usize {
                self.all().iter().map(|s| s.len()).sum()
            }
        }
    };
}

small_storages!(
    arity0 => 0, arity1 => 1, arity2 => 2, arity3 => 3,
    arity4 => 4, arity5 => 5, arity6 => 6, arity7 => 7,
);

impl Storages {
    /// Dispatches creation of an applied term to the right arity-specific
    /// storage (or the dynamic one for arity >= 8). Takes `&self`: callers
    /// only need the process's shared lock held for the duration, per §4.3
    /// ("all take a shared lock on §4.1 for their duration").
    pub(crate) fn create_appl(&self, symbol: &Arc<SymbolData>, args: &[RawTerm]) -> RawTerm {
        trace!("creating applied term {}/{}", symbol.name(), symbol.arity());
        match args.len() {
            0 => self.arity0.create(symbol, []),
            1 => self.arity1.create(symbol, [args[0]]),
            2 => self.arity2.create(symbol, [args[0], args[1]]),
            3 => self.arity3.create(symbol, [args[0], args[1], args[2]]),
            4 => self.arity4.create(symbol, [args[0], args[1], args[2], args[3]]),
            5 => self
                .arity5
                .create(symbol, [args[0], args[1], args[2], args[3], args[4]]),
            6 => self.arity6.create(
                symbol,
                [args[0], args[1], args[2], args[3], args[4], args[5]],
            ),
            7 => self.arity7.create(
                symbol,
                [args[0], args[1], args[2], args[3], args[4], args[5], args[6]],
            ),
            _ => self.dynamic.create(symbol, args),
        }
    }

    pub(crate) fn mark_children(&self, term: RawTerm, worklist: &mut Vec<RawTerm>) {
        if term.header().kind == crate::term::TermKind::Int {
            return;
        }

        let arity = crate::storage::arity_of(term);
        match arity {
            0 => self.arity0.mark_children(term, worklist),
            1 => self.arity1.mark_children(term, worklist),
            2 => self.arity2.mark_children(term, worklist),
            3 => self.arity3.mark_children(term, worklist),
            4 => self.arity4.mark_children(term, worklist),
            5 => self.arity5.mark_children(term, worklist),
            6 => self.arity6.mark_children(term, worklist),
            7 => self.arity7.mark_children(term, worklist),
            _ => self.dynamic.mark_children(term, worklist),
        }
    }

    /// Asserts that every term still present after a sweep has all of its
    /// children also present, i.e. that sweep never reclaimed a slot some
    /// survivor still references (§4.3 "Verification hooks").
    pub(crate) fn verify_sweep(&self) -> Result<()> {
        let present: std::collections::HashSet<RawTerm> =
            self.all().into_iter().flat_map(|s| s.entries()).collect();

        for term in &present {
            let mut children = Vec::new();
            self.mark_children(*term, &mut children);
            for child in children {
                if !present.contains(&child) {
                    return Err(ATermError::InvariantViolation(format!(
                        "surviving term at {:p} references a child not present after sweep",
                        term.0.as_ptr()
                    )));
                }
            }
        }
        Ok(())
    }
}
