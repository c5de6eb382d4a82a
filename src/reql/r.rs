//! Top-level query constructors, conventionally used as `r::...`.
//!
//! ```rust,ignore
//! use photondb_driver::r;
//!
//! let q = r::db("blog").table("posts").filter(r::row().get_field("draft").not());
//! ```

use super::ast::Term;
use super::datum::Datum;
use super::func::FuncArg;
use super::terms::TermKind;

/// Wrap a native value as an expression. Terms pass through unchanged via
/// `Into`; sequences become array-construction nodes, mappings become
/// object-construction nodes, scalars become literal leaves.
pub fn expr(value: impl Into<Term>) -> Term {
    value.into()
}

/// The implicit row variable placeholder.
pub fn row() -> Term {
    Term::node(TermKind::ImplicitVar, vec![])
}

pub fn db(name: impl Into<Term>) -> Term {
    Term::node(TermKind::Db, vec![name.into()])
}

/// Reference a table in the connection's default database.
pub fn table(name: impl Into<Term>) -> Term {
    Term::node(TermKind::Table, vec![name.into()])
}

pub fn db_create(name: impl Into<Term>) -> Term {
    Term::node(TermKind::DbCreate, vec![name.into()])
}

pub fn db_drop(name: impl Into<Term>) -> Term {
    Term::node(TermKind::DbDrop, vec![name.into()])
}

pub fn db_list() -> Term {
    Term::node(TermKind::DbList, vec![])
}

pub fn table_create(name: impl Into<Term>) -> Term {
    Term::node(TermKind::TableCreate, vec![name.into()])
}

pub fn table_drop(name: impl Into<Term>) -> Term {
    Term::node(TermKind::TableDrop, vec![name.into()])
}

pub fn table_list() -> Term {
    Term::node(TermKind::TableList, vec![])
}

/// Server-side JavaScript evaluation.
pub fn js(source: impl Into<Term>) -> Term {
    Term::node(TermKind::Javascript, vec![source.into()])
}

/// Raise a runtime error with the given message.
pub fn error(message: impl Into<Term>) -> Term {
    Term::node(TermKind::Error, vec![message.into()])
}

pub fn branch(
    test: impl Into<Term>,
    true_branch: impl Into<Term>,
    false_branch: impl Into<Term>,
) -> Term {
    Term::node(
        TermKind::Branch,
        vec![test.into(), true_branch.into(), false_branch.into()],
    )
}

/// Apply a function to arguments: `r::do_(vec![arg], f)`.
pub fn do_<M>(args: Vec<Term>, f: impl FuncArg<M>) -> Term {
    let mut all = vec![f.into_func_term()];
    all.extend(args);
    Term::node(TermKind::Funcall, all)
}

pub fn asc(key: impl Into<Term>) -> Term {
    Term::node(TermKind::Asc, vec![key.into()])
}

pub fn desc(key: impl Into<Term>) -> Term {
    Term::node(TermKind::Desc, vec![key.into()])
}

/// Null literal, handy for optarg values and defaults.
pub fn null() -> Term {
    Term::datum(Datum::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_constructors_build() {
        for term in [
            db("d"),
            table("t"),
            db_list(),
            table_list(),
            db_create("d"),
            table_drop("t"),
            branch(expr(true), expr(1), expr(2)),
            asc("k"),
        ] {
            term.build().unwrap();
        }
    }

    #[test]
    fn test_do_wraps_function_first() {
        let term = do_(vec![expr(1)], |x: Term| x.add(1));
        assert_eq!(term.kind(), TermKind::Funcall);
        assert_eq!(term.args().len(), 2);
        assert_eq!(term.args()[0].kind(), TermKind::Func);
    }

    #[test]
    fn test_row_is_implicit() {
        assert!(row().get_field("a").has_implicit());
        assert!(!expr(1).has_implicit());
    }
}
