//! Query pretty-printing and error caret annotation.
//!
//! [`print_query`] reconstructs a human-readable expression string from the
//! AST; [`print_carets`] renders a second line that is byte-for-byte aligned
//! with the first, all spaces except carets under the subexpression a server
//! backtrace points at. Alignment holds by construction: both outputs come
//! from a single rendering pass that records the span of the located subtree.

use std::collections::{BTreeMap, HashMap};

use super::ast::{Repr, Term};
use super::datum::Datum;
use super::terms::{Arity, ComposeStyle, TermKind};

/// One step in a backtrace path: a positional argument index or a named
/// option key.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Pos(i64),
    Opt(String),
}

/// Render the query as a readable expression string.
pub fn print_query(term: &Term) -> String {
    Printer::default().render(term, None).0
}

/// Render the caret line for a backtrace: spaces everywhere except `^` under
/// the characters of the erroring subexpression.
pub fn print_carets(term: &Term, frames: &[Frame]) -> String {
    let (text, span) = Printer::default().render(term, Some(frames));
    let (start, end) = match span {
        Some(span) => span,
        // Unlocatable path: no carets rather than a misaligned guess.
        None => (0, 0),
    };
    text.chars()
        .enumerate()
        .map(|(i, c)| {
            if i >= start && i < end {
                '^'
            } else if c == '\n' {
                c
            } else {
                ' '
            }
        })
        .collect()
}

#[derive(Default)]
struct Printer {
    out: String,
    span: Option<(usize, usize)>,
    var_names: HashMap<u64, u64>,
    next_var: u64,
}

impl Printer {
    fn render(mut self, term: &Term, frames: Option<&[Frame]>) -> (String, Option<(usize, usize)>) {
        self.write_term(term, frames);
        (self.out, self.span)
    }

    fn len(&self) -> usize {
        self.out.chars().count()
    }

    fn push(&mut self, text: &str) {
        self.out.push_str(text);
    }

    fn mark_from(&mut self, start: usize) {
        self.span = Some((start, self.len()));
    }

    fn var_name(&mut self, raw: u64) -> String {
        let next = &mut self.next_var;
        let id = *self.var_names.entry(raw).or_insert_with(|| {
            *next += 1;
            *next
        });
        format!("var_{}", id)
    }

    /// Write one term; `path` is the remaining backtrace path if the
    /// erroring subtree lies within this term.
    fn write_term(&mut self, term: &Term, path: Option<&[Frame]>) {
        let start = self.len();
        let here = matches!(path, Some([]));
        let path = if here { None } else { path };

        match term.repr() {
            Repr::Datum { value, .. } => self.write_datum(value),
            Repr::Var { id, .. } => {
                let name = self.var_name(*id);
                self.push(&name);
            }
            Repr::Func { params, body, .. } => {
                self.push("(");
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    let name = self.var_name(*param);
                    self.push(&name);
                }
                self.push(") => ");
                // On the wire the body is the function's second argument.
                self.write_term(body, descend_pos(path, 1));
            }
            Repr::Op {
                kind,
                args,
                optargs,
            } => match kind.compose_style() {
                ComposeStyle::Special if *kind == TermKind::ImplicitVar => self.push("r.row"),
                ComposeStyle::Array => {
                    self.push("[");
                    for (i, item) in args.iter().enumerate() {
                        if i > 0 {
                            self.push(", ");
                        }
                        self.write_term(item, descend_pos(path, i as i64));
                    }
                    self.push("]");
                }
                ComposeStyle::Object => self.write_object(optargs, path),
                ComposeStyle::Prefix => self.write_prefix(*kind, args, optargs, path),
                ComposeStyle::Method => self.write_method(*kind, args, optargs, path),
                ComposeStyle::OptReceiver => {
                    if args.len() == max_arity(kind.arity()) {
                        self.write_method(*kind, args, optargs, path);
                    } else {
                        self.write_prefix(*kind, args, optargs, path);
                    }
                }
                ComposeStyle::Special => self.write_prefix(*kind, args, optargs, path),
            },
        }

        if here {
            self.mark_from(start);
        }
    }

    fn write_datum(&mut self, datum: &Datum) {
        let text = datum.to_string();
        self.push(&text);
    }

    /// A literal receiver prints as `r.expr(...)` so method chains read
    /// naturally; literals in argument position print bare.
    fn write_receiver(&mut self, term: &Term, path: Option<&[Frame]>) {
        if let Repr::Datum { .. } = term.repr() {
            let start = self.len();
            let here = matches!(path, Some([]));
            self.push("r.expr(");
            self.write_term(term, None);
            self.push(")");
            if here {
                self.mark_from(start);
            }
        } else {
            self.write_term(term, path);
        }
    }

    fn write_prefix(
        &mut self,
        kind: TermKind,
        args: &[Term],
        optargs: &BTreeMap<String, Term>,
        path: Option<&[Frame]>,
    ) {
        self.push("r.");
        self.push(kind.method_name());
        self.push("(");
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.write_term(arg, descend_pos(path, i as i64));
        }
        self.write_optargs(optargs, path, !args.is_empty());
        self.push(")");
    }

    fn write_method(
        &mut self,
        kind: TermKind,
        args: &[Term],
        optargs: &BTreeMap<String, Term>,
        path: Option<&[Frame]>,
    ) {
        if args.is_empty() {
            // Degenerate (should not arise for method kinds); print prefix form.
            self.write_prefix(kind, args, optargs, path);
            return;
        }

        // A POS frame that stops at the receiver slot marks the method
        // application itself, not the receiver subtree.
        let marks_application = matches!(path, Some([Frame::Pos(0)]));
        let receiver_path = match path {
            Some([Frame::Pos(0), rest @ ..]) if !rest.is_empty() => Some(rest),
            _ => None,
        };

        self.write_receiver(&args[0], receiver_path);
        self.push(".");
        let tail_start = self.len();
        self.push(kind.method_name());
        self.push("(");
        for (i, arg) in args.iter().skip(1).enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.write_term(arg, descend_pos(path, i as i64 + 1));
        }
        self.write_optargs(optargs, path, args.len() > 1);
        self.push(")");
        if marks_application {
            self.mark_from(tail_start);
        }
    }

    fn write_object(&mut self, optargs: &BTreeMap<String, Term>, path: Option<&[Frame]>) {
        self.push("{");
        for (i, (key, value)) in optargs.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.push(key);
            self.push(": ");
            self.write_term(value, descend_opt(path, key));
        }
        self.push("}");
    }

    fn write_optargs(
        &mut self,
        optargs: &BTreeMap<String, Term>,
        path: Option<&[Frame]>,
        leading_comma: bool,
    ) {
        if optargs.is_empty() {
            return;
        }
        if leading_comma {
            self.push(", ");
        }
        self.push("{");
        for (i, (key, value)) in optargs.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.push(key);
            self.push(": ");
            self.write_term(value, descend_opt(path, key));
        }
        self.push("}");
    }
}

fn descend_pos<'a>(path: Option<&'a [Frame]>, index: i64) -> Option<&'a [Frame]> {
    match path {
        Some([Frame::Pos(i), rest @ ..]) if *i == index => Some(rest),
        _ => None,
    }
}

fn descend_opt<'a>(path: Option<&'a [Frame]>, key: &str) -> Option<&'a [Frame]> {
    match path {
        Some([Frame::Opt(k), rest @ ..]) if k == key => Some(rest),
        _ => None,
    }
}

fn max_arity(arity: Arity) -> usize {
    match arity {
        Arity::Exact(n) => n,
        Arity::Between(_, max) => max,
        Arity::AtLeast(_) => usize::MAX,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reql::r;
    use crate::reql::Term;

    #[test]
    fn test_print_method_chain() {
        let q = r::table("t").get("k");
        assert_eq!(print_query(&q), "r.table(\"t\").get(\"k\")");
    }

    #[test]
    fn test_print_db_table() {
        let q = r::db("test").table("users").count();
        assert_eq!(print_query(&q), "r.db(\"test\").table(\"users\").count()");
    }

    #[test]
    fn test_print_datum_receiver() {
        let q = r::expr(1).add("x");
        assert_eq!(print_query(&q), "r.expr(1).add(\"x\")");
    }

    #[test]
    fn test_print_array_and_object() {
        let q: Term = r::expr(serde_json::json!([1, {"a": true}]));
        assert_eq!(print_query(&q), "[1, {a: true}]");
    }

    #[test]
    fn test_print_optargs() {
        let q = r::table("t").opt("useOutdated", true);
        assert_eq!(print_query(&q), "r.table(\"t\", {use_outdated: true})");
    }

    #[test]
    fn test_print_lambda() {
        let q = r::table("t").filter(|row: Term| row.get_field("a").eq(1));
        assert_eq!(
            print_query(&q),
            "r.table(\"t\").filter((var_1) => var_1.get_field(\"a\").eq(1))"
        );
    }

    #[test]
    fn test_print_implicit_row() {
        let q = r::table("t").filter(r::row().get_field("a"));
        assert_eq!(
            print_query(&q),
            "r.table(\"t\").filter((var_1) => r.row.get_field(\"a\"))"
        );
    }

    #[test]
    fn test_carets_under_argument() {
        let q = r::expr(1).add("x");
        //        r.expr(1).add("x")
        let carets = print_carets(&q, &[Frame::Pos(1)]);
        assert_eq!(carets.len(), print_query(&q).len());
        assert_eq!(carets, "              ^^^ ");
    }

    #[test]
    fn test_carets_method_application() {
        // A path stopping at the receiver slot marks the applied method.
        let q = r::expr(1).add("x");
        let text = print_query(&q);
        let carets = print_carets(&q, &[Frame::Pos(0)]);
        assert_eq!(text, "r.expr(1).add(\"x\")");
        assert_eq!(carets, "          ^^^^^^^^");
    }

    #[test]
    fn test_carets_whole_query() {
        let q = r::table("t").get("k");
        let carets = print_carets(&q, &[]);
        assert_eq!(carets, "^".repeat(print_query(&q).chars().count()));
    }

    #[test]
    fn test_carets_into_optarg() {
        let q = r::table("t").opt("useOutdated", true);
        let text = print_query(&q);
        let carets = print_carets(&q, &[Frame::Opt("use_outdated".into())]);
        assert_eq!(text.chars().count(), carets.chars().count());
        let start = text.find("true").unwrap();
        let expected: String = text
            .chars()
            .enumerate()
            .map(|(i, _)| if i >= start && i < start + 4 { '^' } else { ' ' })
            .collect();
        assert_eq!(carets, expected);
    }

    #[test]
    fn test_unlocatable_path_yields_no_carets() {
        let q = r::table("t").get("k");
        let carets = print_carets(&q, &[Frame::Pos(7)]);
        assert!(carets.chars().all(|c| c == ' '));
    }
}
