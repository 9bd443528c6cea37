//! Root set and protection registry (component C4).
//!
//! Grounded on `global_aterm_pool.rs`: the global pool keeps one slot per
//! thread for that thread's protected-term set and one for its protected
//! containers (`Vec<Option<..>>`, so a thread's slot can be vacated on
//! thread exit without shifting every other thread's index). Marking walks
//! every occupied slot.

use std::sync::Arc;

use aterm_utilities::ProtectionSet;
use log::trace;

use crate::lock::BfGuarded;
use crate::lock::SharedMutex;
use crate::term::RawTerm;

/// A term protection set shared between its owning thread and the collector.
pub(crate) type SharedProtectionSet = Arc<BfGuarded<ProtectionSet<RawTerm>>>;

/// A container protection set shared the same way.
pub(crate) type SharedContainerProtectionSet = Arc<BfGuarded<ProtectionSet<Arc<dyn Markable + Send + Sync>>>>;

/// Anything that can be registered in a thread's container protection set:
/// the protected container adapters of `crate::container`.
pub trait Markable {
    /// Pushes every term identity reachable through `self` onto `worklist`.
    fn mark(&self, worklist: &mut Vec<RawTerm>);
    fn size(&self) -> usize;
}

/// The process-wide registry of per-thread root sets.
pub(crate) struct RootSet {
    term_sets: Vec<Option<SharedProtectionSet>>,
    container_sets: Vec<Option<SharedContainerProtectionSet>>,
}

impl RootSet {
    pub(crate) fn new() -> Self {
        RootSet {
            term_sets: Vec::new(),
            container_sets: Vec::new(),
        }
    }

    /// Registers a new thread, returning the slot index it was given along
    /// with fresh protection sets for it to use.
    pub(crate) fn register_thread(
        &mut self,
        mutex: &Arc<SharedMutex>,
    ) -> (usize, SharedProtectionSet, SharedContainerProtectionSet) {
        let terms: SharedProtectionSet = Arc::new(BfGuarded::new(mutex.clone(), ProtectionSet::new()));
        let containers: SharedContainerProtectionSet =
            Arc::new(BfGuarded::new(mutex.clone(), ProtectionSet::new()));

        let index = match self.term_sets.iter().position(|slot| slot.is_none()) {
            Some(index) => index,
            None => {
                self.term_sets.push(None);
                self.container_sets.push(None);
                self.term_sets.len() - 1
            }
        };

        self.term_sets[index] = Some(terms.clone());
        self.container_sets[index] = Some(containers.clone());
        trace!("registered thread root set at slot {index}");
        (index, terms, containers)
    }

    pub(crate) fn deregister_thread(&mut self, index: usize) {
        self.term_sets[index] = None;
        self.container_sets[index] = None;
        trace!("deregistered thread root set at slot {index}");
    }

    /// Pushes every live root term onto `worklist`. Must be called while the
    /// caller holds the exclusive lock, which guarantees no other thread is
    /// concurrently mutating its own protection sets.
    pub(crate) fn mark_all(&self, worklist: &mut Vec<RawTerm>) {
        for terms in self.term_sets.iter().flatten() {
            for (term, _) in terms.read().iter() {
                worklist.push(*term);
            }
        }

        for containers in self.container_sets.iter().flatten() {
            for (container, _) in containers.read().iter() {
                container.mark(worklist);
            }
        }
    }

    pub(crate) fn protection_set_size(&self) -> usize {
        self.term_sets
            .iter()
            .flatten()
            .map(|set| set.read().len())
            .sum()
    }
}

impl Default for RootSet {
    fn default() -> Self {
        Self::new()
    }
}
