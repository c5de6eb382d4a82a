//! Lambda capture and the implicit row variable.
//!
//! A native closure passed where the protocol expects a function is invoked
//! exactly once, immediately, with freshly allocated placeholder variable
//! terms; its return value becomes the captured body. The closure is never
//! re-invoked per compile.
//!
//! A plain term passed in the same position is scanned for the implicit row
//! placeholder (`r::row()`); if it occurs anywhere in the subtree, the whole
//! expression is wrapped as a one-parameter function so point-free row
//! expressions compose correctly as lambdas.

use std::sync::atomic::{AtomicU64, Ordering};

use super::ast::Term;

// Raw placeholder ids come from a process-wide counter so concurrently built
// queries never collide; `build` renumbers them 1..n per compile.
static NEXT_VAR_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn fresh_var_id() -> u64 {
    NEXT_VAR_ID.fetch_add(1, Ordering::Relaxed)
}

/// Wrap a term as a lambda if it uses the implicit row variable.
pub(crate) fn func_wrap(term: Term) -> Term {
    if term.has_implicit() {
        Term::func(vec![fresh_var_id()], term)
    } else {
        term
    }
}

/// Anything acceptable where the protocol expects a function: a closure of
/// one or two parameters, or a plain expression (implicit-row style or a
/// constant). The marker parameter `M` keeps the impls coherent; callers
/// never name it.
pub trait FuncArg<M> {
    fn into_func_term(self) -> Term;
}

/// Marker for plain expression arguments.
pub struct ValueArg;
/// Marker for one-parameter closures.
pub struct UnaryClosure;
/// Marker for two-parameter closures.
pub struct BinaryClosure;

impl<T: Into<Term>> FuncArg<ValueArg> for T {
    fn into_func_term(self) -> Term {
        func_wrap(self.into())
    }
}

impl<F, T> FuncArg<UnaryClosure> for F
where
    F: FnOnce(Term) -> T,
    T: Into<Term>,
{
    fn into_func_term(self) -> Term {
        let param = fresh_var_id();
        let body = self(Term::var(param)).into();
        Term::func(vec![param], body)
    }
}

impl<F, T> FuncArg<BinaryClosure> for F
where
    F: FnOnce(Term, Term) -> T,
    T: Into<Term>,
{
    fn into_func_term(self) -> Term {
        let a = fresh_var_id();
        let b = fresh_var_id();
        let body = self(Term::var(a), Term::var(b)).into();
        Term::func(vec![a, b], body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reql::r;
    use crate::reql::terms::TermKind;

    #[test]
    fn test_closure_captured_once() {
        use std::cell::Cell;
        let calls = Cell::new(0);
        let term = r::table("t").filter(|row: Term| {
            calls.set(calls.get() + 1);
            row.get_field("a").eq(1)
        });
        assert_eq!(calls.get(), 1);
        // Compiling twice must not re-invoke the closure.
        term.build().unwrap();
        term.build().unwrap();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_implicit_row_wrapped_as_lambda() {
        let implicit = r::table("t").filter(r::row().get_field("age").gt(21));
        let explicit = r::table("t").filter(|row: Term| row.get_field("age").gt(21));
        // The implicit form becomes FUNC(...) just like the explicit one.
        assert_eq!(implicit.args()[1].kind(), TermKind::Func);
        assert_eq!(explicit.args()[1].kind(), TermKind::Func);
    }

    #[test]
    fn test_implicit_scan_covers_optargs() {
        let term = r::expr(1).opt("default", r::row().get_field("x"));
        assert!(term.has_implicit());
        let wrapped = func_wrap(term);
        assert_eq!(wrapped.kind(), TermKind::Func);
    }

    #[test]
    fn test_plain_expression_passes_through() {
        let term = r::table("t").filter(r::expr(true));
        assert_eq!(term.args()[1].kind(), TermKind::Datum);
    }

    #[test]
    fn test_binary_closure() {
        let term = r::table("t").reduce(|a: Term, b: Term| a.add(b));
        assert_eq!(term.args()[1].kind(), TermKind::Func);
    }
}
