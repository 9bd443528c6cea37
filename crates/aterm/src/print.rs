//! Term display.
//!
//! Grounded on `aterm.rs`'s `Display`/`Debug` impls for `ATermRef`/`ATerm`:
//! printing delegates to a single shared routine so `{}` and `{:?}` agree.
//! There is no FFI pretty-printer to call out to here, so this renders the
//! plain `name(arg, arg, ...)` notation directly from the term's own
//! structure, recursing into children depth-first.

use std::fmt;

use crate::term::RawTerm;
use crate::term::TermKind;

pub(crate) fn fmt_term(raw: RawTerm, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if raw.header().kind == TermKind::Int {
        let ptr = raw.0.as_ptr() as *const crate::storage::IntTerm;
        return write!(f, "{}", unsafe { (*ptr).value });
    }

    write!(f, "{}", raw.symbol().name())?;

    let arity = crate::storage::arity_of(raw);
    if arity == 0 {
        return Ok(());
    }

    write!(f, "(")?;
    for index in 0..arity {
        if index > 0 {
            write!(f, ", ")?;
        }
        fmt_term(crate::storage::child_at(raw, index), f)?;
    }
    write!(f, ")")
}

#[cfg(test)]
mod tests {
    use crate::pool::get_applied_term;
    use crate::pool::get_function_symbol;
    use crate::pool::get_int_term;

    #[test_log::test]
    fn displays_nullary_and_applied_terms() {
        let c = get_function_symbol("c", 0);
        let term = get_applied_term(&c, &[]).unwrap();
        assert_eq!(format!("{term}"), "c");

        let f = get_function_symbol("f", 2);
        let a = get_int_term(1);
        let term = get_applied_term(&f, &[term.borrow(), a.borrow()]).unwrap();
        assert_eq!(format!("{term}"), "f(c, 1)");
    }
}
