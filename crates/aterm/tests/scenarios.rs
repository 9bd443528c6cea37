//! End-to-end scenarios exercising the term pool through its public API.
//!
//! The pool is one process-wide singleton shared by every test in this
//! binary, and several scenarios check exact before/after term counts or
//! flip the global `gc_enabled` switch; each such test takes
//! [`aterm_utilities::lock_global`] for its duration so it runs exclusively
//! of every other test here, the same serialization discipline the teacher
//! crate's `global_guard` module exists for.

use aterm::add_deletion_hook;
use aterm::collect;
use aterm::empty_list;
use aterm::enable_garbage_collection;
use aterm::get_applied_term;
use aterm::get_function_symbol;
use aterm::get_function_symbol_with_prefix_check;
use aterm::get_int_term;
use aterm::get_term;
use aterm::list_cons_symbol;
use aterm::register_prefix;
use aterm::term_count;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[test_log::test]
fn s1_repeated_construction_is_canonical_across_collection() {
    let f = get_function_symbol("s1-f", 2);
    let a = get_int_term(9001);
    let b = get_int_term(9002);

    let t1 = get_applied_term(&f, &[a.borrow(), b.borrow()]).unwrap();
    let t2 = get_applied_term(&f, &[a.borrow(), b.borrow()]).unwrap();
    assert_eq!(t1, t2);

    collect();

    let t3 = get_applied_term(&f, &[a.borrow(), b.borrow()]).unwrap();
    assert_eq!(t1, t3);
}

#[test_log::test]
fn s2_integer_terms_are_canonical_and_additive() {
    let _guard = aterm_utilities::lock_global();
    let before = term_count();

    let zero = get_int_term(100_000);
    let one = get_int_term(100_001);
    let two = get_int_term(100_002);
    let one_again = get_int_term(100_001);

    assert_eq!(one, one_again);
    assert_ne!(zero, two);
    assert_eq!(term_count(), before + 3);
}

#[test_log::test]
fn s3_dropping_a_list_reclaims_its_cons_nodes() {
    let _guard = aterm_utilities::lock_global();
    let list_cons = list_cons_symbol();
    let tail = empty_list();

    let elem0 = get_int_term(1_000_000);
    let elem1 = get_int_term(1_000_001);
    let elem2 = get_int_term(1_000_002);

    let list2 = get_applied_term(&list_cons, &[elem2.borrow(), tail.borrow()]).unwrap();
    let list1 = get_applied_term(&list_cons, &[elem1.borrow(), list2.borrow()]).unwrap();
    let list0 = get_applied_term(&list_cons, &[elem0.borrow(), list1.borrow()]).unwrap();

    let before = term_count();
    drop(list0);
    drop(list1);
    drop(list2);
    drop(elem0);
    drop(elem1);
    drop(elem2);

    collect();

    // The three cons cells and three integer payloads are gone; nothing else
    // in the pool shrank as a side effect.
    assert_eq!(term_count(), before - 6);
    aterm::verify_sweep().unwrap();
}

#[test_log::test]
fn s4_deletion_hook_fires_exactly_once_on_reclamation() {
    let g = get_function_symbol("s4-g", 1);
    let fire_count = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(std::sync::Mutex::new(None));

    {
        let fire_count = fire_count.clone();
        let seen = seen.clone();
        add_deletion_hook(
            &g,
            Arc::new(move |term| {
                fire_count.fetch_add(1, Ordering::SeqCst);
                *seen.lock().unwrap() = Some(format!("{term}"));
            }),
        );
    }

    let h = get_int_term(42);
    let term = get_applied_term(&g, &[h.borrow()]).unwrap();
    let expected_repr = format!("{term}");
    drop(term);
    drop(h);

    collect();

    assert_eq!(fire_count.load(Ordering::SeqCst), 1);
    assert_eq!(seen.lock().unwrap().as_deref(), Some(expected_repr.as_str()));
}

#[test_log::test]
fn s5_concurrent_construction_of_the_same_term_is_deduplicated() {
    let f = get_function_symbol("s5-f", 2);
    let a = get_int_term(7_000_001);
    let b = get_int_term(7_000_002);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let f = f.clone();
            let a = a.clone();
            let b = b.clone();
            std::thread::spawn(move || {
                let mut last = None;
                for _ in 0..10_000 {
                    let t = get_applied_term(&f, &[a.borrow(), b.borrow()]).unwrap();
                    last = Some(t);
                }
                last.unwrap()
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for pair in results.windows(2) {
        assert_eq!(pair[0], pair[1]);
    }
}

#[test_log::test]
fn s6_registered_prefix_counter_exceeds_every_interned_suffix() {
    get_function_symbol_with_prefix_check("s6-prefix1", 0);
    get_function_symbol_with_prefix_check("s6-prefix7", 0);
    get_function_symbol_with_prefix_check("s6-prefix3", 0);

    let counter = register_prefix("s6-prefix");
    assert!(counter.load(Ordering::SeqCst) >= 8);
}

#[test_log::test]
fn disabling_automatic_collection_does_not_block_a_manual_collect() {
    let _guard = aterm_utilities::lock_global();
    enable_garbage_collection(false);

    let marker = get_function_symbol("s-disabled-gc", 1);
    let payload = get_int_term(31_415_926);
    let term = get_applied_term(&marker, &[payload.borrow()]).unwrap();
    drop(term);
    drop(payload);

    let before = term_count();
    // `enable_garbage_collection(false)` only suppresses the automatic,
    // threshold-triggered cycle; an explicit `collect()` still marks and
    // sweeps.
    collect();
    assert_eq!(term_count(), before - 2);

    enable_garbage_collection(true);
}

#[test_log::test]
fn nullary_symbol_arity_mismatch_surfaces_as_an_error() {
    let binary = get_function_symbol("s-arity-mismatch", 2);
    let err = get_term(&binary).unwrap_err();
    assert!(matches!(err, aterm::ATermError::ArityMismatch { expected: 2, actual: 0, .. }));
}
