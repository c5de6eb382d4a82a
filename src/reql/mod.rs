//! Query language: AST, expression builder, and printing.
//!
//! A query is an immutable tree of [`Term`] nodes built through the fluent
//! API on `Term` and the root constructors in [`r`]. Compilation walks the
//! tree into a wire `Term` message; printing reconstructs a readable
//! expression string and can overlay caret annotations from a server
//! backtrace.
//!
//! # Architecture
//!
//! 1. **Kinds layer** (`terms.rs`): the closed operator enumeration and its
//!    per-kind behavior table (wire tag, arity, print style)
//! 2. **AST layer** (`ast.rs`): `Term` nodes, literal wrapping, arity
//!    validation, compilation to the wire format
//! 3. **Capture layer** (`func.rs`): one-time symbolic invocation of native
//!    closures and the implicit row variable rewrite
//! 4. **Display layer** (`print.rs`): query printing and caret annotation

pub mod ast;
pub mod datum;
pub mod func;
pub mod print;
pub mod r;
pub mod terms;

pub use ast::Term;
pub use datum::Datum;
pub use func::FuncArg;
pub use print::{print_carets, print_query, Frame};
pub use terms::{Arity, TermKind};
