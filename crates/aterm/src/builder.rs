//! Non-recursive term construction (§6 "Non-recursive term transformation").
//!
//! Grounded on `term_builder.rs`: rather than recursing the host call stack
//! (which overflows once terms get deep), a [`TermBuilder`] keeps its own
//! explicit stack of "visit this subterm" and "rebuild from these already-
//! visited children" frames.

use crate::error::Result;
use crate::symbol::Symbol;
use crate::term::ATerm;
use crate::term::ATermRef;

enum Frame {
    Visit(ATerm),
    Construct(Symbol, usize),
}

/// Rebuilds subterms bottom-up without recursion. Reusable across many
/// [`TermBuilder::evaluate`] calls so its scratch stacks are only allocated
/// once.
#[derive(Default)]
pub struct TermBuilder {
    frames: Vec<Frame>,
    results: Vec<ATerm>,
}

impl TermBuilder {
    pub fn new() -> Self {
        TermBuilder::default()
    }

    /// Rewrites `term` bottom-up. For every subterm, `rewrite` is asked
    /// first; if it returns `Some(replacement)`, that replacement is used
    /// as-is (its own children are not visited). If it returns `None`, every
    /// child is visited in turn and the node is rebuilt with the same
    /// function symbol applied to the (possibly rewritten) children.
    pub fn evaluate(
        &mut self,
        term: ATermRef<'_>,
        mut rewrite: impl FnMut(ATermRef<'_>) -> Option<ATerm>,
    ) -> Result<ATerm> {
        self.frames.clear();
        self.results.clear();

        self.frames.push(Frame::Visit(term.protect()));

        while let Some(frame) = self.frames.pop() {
            match frame {
                Frame::Visit(current) => {
                    if let Some(replacement) = rewrite(current.borrow()) {
                        self.results.push(replacement);
                        continue;
                    }

                    let symbol = current.symbol();
                    let arity = symbol.arity();
                    self.frames.push(Frame::Construct(symbol, arity));
                    // Push children back-to-front so they are visited, and
                    // therefore pushed onto `self.results`, in argument order.
                    for child in current.arguments().rev() {
                        self.frames.push(Frame::Visit(child.protect()));
                    }
                }
                Frame::Construct(symbol, arity) => {
                    let start = self.results.len() - arity;
                    let children: Vec<ATerm> = self.results.split_off(start);
                    let refs: Vec<ATermRef<'_>> = children.iter().map(|c| c.borrow()).collect();
                    let rebuilt = crate::pool::get_applied_term(&symbol, &refs)?;
                    self.results.push(rebuilt);
                }
            }
        }

        Ok(self.results.pop().expect("evaluate always produces exactly one result"))
    }
}

/// Convenience wrapper over [`TermBuilder::evaluate`] for one-off rewrites.
pub fn apply(term: ATermRef<'_>, rewrite: impl FnMut(ATermRef<'_>) -> Option<ATerm>) -> Result<ATerm> {
    TermBuilder::new().evaluate(term, rewrite)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::get_function_symbol;
    use crate::pool::get_int_term;

    #[test_log::test]
    fn apply_rebuilds_bottom_up() {
        let f = get_function_symbol("f", 2);
        let a = get_int_term(1);
        let b = get_int_term(2);
        let term = crate::pool::get_applied_term(&f, &[a.borrow(), b.borrow()]).unwrap();

        let rewritten = apply(term.borrow(), |t| {
            if t.symbol().arity() == 0 && t.symbol().name() == crate::pool::INT_TAG_NAME {
                Some(get_int_term(t.as_int() + 10))
            } else {
                None
            }
        })
        .unwrap();

        let mut args = rewritten.arguments();
        assert_eq!(args.next().unwrap().as_int(), 11);
        assert_eq!(args.next().unwrap().as_int(), 12);
    }
}
