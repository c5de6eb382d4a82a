//! Query AST: immutable `Term` nodes and the fluent expression API.
//!
//! A query is a tree of [`Term`] nodes. Each operator node has a
//! [`TermKind`], positional arguments (child terms) and named optional
//! arguments; literal leaves wrap a primitive [`Datum`], and function nodes
//! carry captured lambda bodies.
//!
//! Terms are immutable after construction: every fluent method wraps the
//! receiver as a child of a new node, so subtrees can be freely shared and
//! reused across `run` calls. Sharing is by `Arc`, making composition cheap.
//!
//! # Example
//!
//! Building `r.table("users").filter(|row| row.get_field("age").eq(25))`:
//!
//! ```rust,ignore
//! use photondb_driver::r;
//!
//! let query = r::table("users").filter(|row: Term| row.get_field("age").eq(25));
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::datum::Datum;
use super::func::FuncArg;
use super::terms::TermKind;
use crate::error::{Error, Result};
use crate::wire::schema;
use crate::wire::{Value, WireMessage};

/// Driver-level option names are written lowerCamelCase; the wire wants
/// lower_snake_case. Unrecognized names pass through unchanged.
const OPT_NAME_TABLE: &[(&str, &str)] = &[
    ("useOutdated", "use_outdated"),
    ("primaryKey", "primary_key"),
    ("cacheSize", "cache_size"),
    ("nonAtomic", "non_atomic"),
    ("leftBound", "left_bound"),
    ("rightBound", "right_bound"),
    ("returnVals", "return_vals"),
    ("noReply", "noreply"),
];

pub(crate) fn translate_opt_name(name: &str) -> &str {
    OPT_NAME_TABLE
        .iter()
        .find(|(driver, _)| *driver == name)
        .map(|(_, wire)| *wire)
        .unwrap_or(name)
}

/// One node of the query AST.
#[derive(Debug, Clone)]
pub struct Term {
    repr: Arc<Repr>,
}

#[derive(Debug)]
pub(crate) enum Repr {
    /// A primitive literal leaf. Arrays and objects never appear here; they
    /// are normalized to MAKE_ARRAY / MAKE_OBJ nodes at wrap time.
    Datum {
        value: Datum,
        optargs: BTreeMap<String, Term>,
    },
    /// An operator node.
    Op {
        kind: TermKind,
        args: Vec<Term>,
        optargs: BTreeMap<String, Term>,
    },
    /// A lambda parameter placeholder.
    Var {
        id: u64,
        optargs: BTreeMap<String, Term>,
    },
    /// A captured lambda: the native closure was invoked exactly once at
    /// construction time with placeholder vars, never re-invoked.
    Func {
        params: Vec<u64>,
        body: Term,
        optargs: BTreeMap<String, Term>,
    },
}

impl Term {
    pub(crate) fn from_repr(repr: Repr) -> Self {
        Self {
            repr: Arc::new(repr),
        }
    }

    pub(crate) fn repr(&self) -> &Repr {
        &self.repr
    }

    /// Wrap a primitive datum as a leaf. Composite datums are normalized into
    /// construction nodes so subexpressions keep their own backtrace frames.
    pub fn datum(datum: Datum) -> Self {
        match datum {
            Datum::Array(items) => Term::from_repr(Repr::Op {
                kind: TermKind::MakeArray,
                args: items.into_iter().map(Term::datum).collect(),
                optargs: BTreeMap::new(),
            }),
            Datum::Object(entries) => Term::from_repr(Repr::Op {
                kind: TermKind::MakeObj,
                args: Vec::new(),
                optargs: entries
                    .into_iter()
                    .map(|(k, v)| (k, Term::datum(v)))
                    .collect(),
            }),
            primitive => Term::from_repr(Repr::Datum {
                value: primitive,
                optargs: BTreeMap::new(),
            }),
        }
    }

    pub(crate) fn var(id: u64) -> Self {
        Term::from_repr(Repr::Var {
            id,
            optargs: BTreeMap::new(),
        })
    }

    pub(crate) fn func(params: Vec<u64>, body: Term) -> Self {
        Term::from_repr(Repr::Func {
            params,
            body,
            optargs: BTreeMap::new(),
        })
    }

    /// Construct an operator node, validating arity at call time.
    pub fn op(kind: TermKind, args: Vec<Term>) -> Result<Self> {
        let arity = kind.arity();
        if !arity.accepts(args.len()) {
            return Err(Error::Driver(format!(
                "{} expects {} argument(s), got {}",
                kind.name(),
                arity,
                args.len()
            )));
        }
        Ok(Term::node(kind, args))
    }

    /// Internal constructor for fluent methods whose signatures already pin
    /// the argument count. `build` re-validates every node before sending.
    pub(crate) fn node(kind: TermKind, args: Vec<Term>) -> Self {
        Term::from_repr(Repr::Op {
            kind,
            args,
            optargs: BTreeMap::new(),
        })
    }

    /// Operator kind of this node.
    pub fn kind(&self) -> TermKind {
        match &*self.repr {
            Repr::Datum { .. } => TermKind::Datum,
            Repr::Op { kind, .. } => *kind,
            Repr::Var { .. } => TermKind::Var,
            Repr::Func { .. } => TermKind::Func,
        }
    }

    pub(crate) fn args(&self) -> &[Term] {
        match &*self.repr {
            Repr::Op { args, .. } => args,
            _ => &[],
        }
    }

    pub(crate) fn optargs(&self) -> &BTreeMap<String, Term> {
        match &*self.repr {
            Repr::Datum { optargs, .. }
            | Repr::Op { optargs, .. }
            | Repr::Var { optargs, .. }
            | Repr::Func { optargs, .. } => optargs,
        }
    }

    /// Attach a named option, translating the driver-level name to its wire
    /// spelling. A null value drops the option rather than sending it. The
    /// value is an ordinary expression; a `Term` passed here is always an
    /// option value, never a positional argument. Every node shape carries
    /// options, literal leaves included; whether an option makes sense on a
    /// given operation is the server's call.
    pub fn opt(&self, name: &str, value: impl Into<Term>) -> Term {
        let value = value.into();
        if let Repr::Datum {
            value: Datum::Null, ..
        } = &*value.repr
        {
            return self.clone();
        }
        let key = translate_opt_name(name).to_string();
        let with = |optargs: &BTreeMap<String, Term>| {
            let mut optargs = optargs.clone();
            optargs.insert(key.clone(), value.clone());
            optargs
        };
        let repr = match &*self.repr {
            Repr::Datum { value: v, optargs } => Repr::Datum {
                value: v.clone(),
                optargs: with(optargs),
            },
            Repr::Op {
                kind,
                args,
                optargs,
            } => Repr::Op {
                kind: *kind,
                args: args.clone(),
                optargs: with(optargs),
            },
            Repr::Var { id, optargs } => Repr::Var {
                id: *id,
                optargs: with(optargs),
            },
            Repr::Func {
                params,
                body,
                optargs,
            } => Repr::Func {
                params: params.clone(),
                body: body.clone(),
                optargs: with(optargs),
            },
        };
        Term::from_repr(repr)
    }

    /// True if the implicit row placeholder occurs anywhere in this subtree,
    /// positional args and named options both. The scan does not descend into
    /// captured lambda bodies: those resolve their own row variable.
    pub(crate) fn has_implicit(&self) -> bool {
        match &*self.repr {
            Repr::Op {
                kind,
                args,
                optargs,
            } => {
                *kind == TermKind::ImplicitVar
                    || args.iter().any(Term::has_implicit)
                    || optargs.values().any(Term::has_implicit)
            }
            Repr::Datum { optargs, .. }
            | Repr::Var { optargs, .. }
            | Repr::Func { optargs, .. } => optargs.values().any(Term::has_implicit),
        }
    }

    /// Compile into a wire `Term` message.
    ///
    /// Re-validates the arity of every node, and renumbers lambda variables
    /// 1..n in first-use order so wire ids are small, deterministic per
    /// query, and never leak across compiles.
    pub fn build(&self) -> Result<WireMessage> {
        let mut scope = VarScope::default();
        self.build_with(&mut scope)
    }

    fn build_with(&self, scope: &mut VarScope) -> Result<WireMessage> {
        let mut msg = WireMessage::new(&schema::TERM);
        let optargs = match &*self.repr {
            Repr::Datum { value, optargs } => {
                msg.set(1, Value::Enum(TermKind::Datum.to_wire()));
                msg.set(2, Value::Message(value.to_wire()));
                optargs
            }
            Repr::Var { id, optargs } => {
                msg.set(1, Value::Enum(TermKind::Var.to_wire()));
                let mapped = scope.resolve(*id);
                msg.push(
                    3,
                    Value::Message(Term::datum(Datum::Number(mapped as f64)).build_with(scope)?),
                );
                optargs
            }
            Repr::Func {
                params,
                body,
                optargs,
            } => {
                let ids: Vec<u64> = params.iter().map(|p| scope.resolve(*p)).collect();
                msg.set(1, Value::Enum(TermKind::Func.to_wire()));
                let params_term = Term::datum(Datum::Array(
                    ids.into_iter().map(|id| Datum::Number(id as f64)).collect(),
                ));
                msg.push(3, Value::Message(params_term.build_with(scope)?));
                msg.push(3, Value::Message(body.build_with(scope)?));
                optargs
            }
            Repr::Op {
                kind,
                args,
                optargs,
            } => {
                let arity = kind.arity();
                if !arity.accepts(args.len()) {
                    return Err(Error::Driver(format!(
                        "{} expects {} argument(s), got {}",
                        kind.name(),
                        arity,
                        args.len()
                    )));
                }
                msg.set(1, Value::Enum(kind.to_wire()));
                for arg in args {
                    msg.push(3, Value::Message(arg.build_with(scope)?));
                }
                optargs
            }
        };
        for (key, val) in optargs {
            let mut pair = WireMessage::new(&schema::TERM_ASSOC_PAIR);
            pair.set(1, Value::Str(key.clone()));
            pair.set(2, Value::Message(val.build_with(scope)?));
            msg.push(4, Value::Message(pair));
        }
        Ok(msg)
    }
}

/// Per-compile renumbering of lambda variable ids.
#[derive(Default)]
struct VarScope {
    map: HashMap<u64, u64>,
    next: u64,
}

impl VarScope {
    fn resolve(&mut self, raw: u64) -> u64 {
        let next = &mut self.next;
        *self.map.entry(raw).or_insert_with(|| {
            *next += 1;
            *next
        })
    }
}

// === Fluent expression API ===
//
// Methods whose signatures pin the argument count construct nodes directly;
// variadic entry points are re-checked by `build`.

impl Term {
    // Comparison

    pub fn eq(&self, other: impl Into<Term>) -> Term {
        Term::node(TermKind::Eq, vec![self.clone(), other.into()])
    }

    pub fn ne(&self, other: impl Into<Term>) -> Term {
        Term::node(TermKind::Ne, vec![self.clone(), other.into()])
    }

    pub fn lt(&self, other: impl Into<Term>) -> Term {
        Term::node(TermKind::Lt, vec![self.clone(), other.into()])
    }

    pub fn le(&self, other: impl Into<Term>) -> Term {
        Term::node(TermKind::Le, vec![self.clone(), other.into()])
    }

    pub fn gt(&self, other: impl Into<Term>) -> Term {
        Term::node(TermKind::Gt, vec![self.clone(), other.into()])
    }

    pub fn ge(&self, other: impl Into<Term>) -> Term {
        Term::node(TermKind::Ge, vec![self.clone(), other.into()])
    }

    // Logic

    pub fn not(&self) -> Term {
        Term::node(TermKind::Not, vec![self.clone()])
    }

    pub fn and(&self, other: impl Into<Term>) -> Term {
        Term::node(TermKind::All, vec![self.clone(), other.into()])
    }

    pub fn or(&self, other: impl Into<Term>) -> Term {
        Term::node(TermKind::Any, vec![self.clone(), other.into()])
    }

    // Math

    pub fn add(&self, other: impl Into<Term>) -> Term {
        Term::node(TermKind::Add, vec![self.clone(), other.into()])
    }

    pub fn sub(&self, other: impl Into<Term>) -> Term {
        Term::node(TermKind::Sub, vec![self.clone(), other.into()])
    }

    pub fn mul(&self, other: impl Into<Term>) -> Term {
        Term::node(TermKind::Mul, vec![self.clone(), other.into()])
    }

    pub fn div(&self, other: impl Into<Term>) -> Term {
        Term::node(TermKind::Div, vec![self.clone(), other.into()])
    }

    pub fn modulo(&self, other: impl Into<Term>) -> Term {
        Term::node(TermKind::Mod, vec![self.clone(), other.into()])
    }

    // Arrays and objects

    pub fn append(&self, value: impl Into<Term>) -> Term {
        Term::node(TermKind::Append, vec![self.clone(), value.into()])
    }

    pub fn slice(&self, start: impl Into<Term>, end: impl Into<Term>) -> Term {
        Term::node(TermKind::Slice, vec![self.clone(), start.into(), end.into()])
    }

    pub fn nth(&self, index: impl Into<Term>) -> Term {
        Term::node(TermKind::Nth, vec![self.clone(), index.into()])
    }

    /// Get an attribute by field name. This is an explicit method; a term is
    /// never itself callable.
    pub fn get_field(&self, name: impl Into<Term>) -> Term {
        Term::node(TermKind::GetField, vec![self.clone(), name.into()])
    }

    /// Shorthand for [`get_field`](Self::get_field).
    pub fn g(&self, name: impl Into<Term>) -> Term {
        self.get_field(name)
    }

    pub fn contains(&self, value: impl Into<Term>) -> Term {
        Term::node(TermKind::Contains, vec![self.clone(), value.into()])
    }

    pub fn pluck(&self, fields: Vec<Term>) -> Term {
        let mut args = vec![self.clone()];
        args.extend(fields);
        Term::node(TermKind::Pluck, args)
    }

    pub fn without(&self, fields: Vec<Term>) -> Term {
        let mut args = vec![self.clone()];
        args.extend(fields);
        Term::node(TermKind::Without, args)
    }

    pub fn merge(&self, other: impl Into<Term>) -> Term {
        Term::node(TermKind::Merge, vec![self.clone(), other.into()])
    }

    // Selection

    pub fn get(&self, key: impl Into<Term>) -> Term {
        Term::node(TermKind::Get, vec![self.clone(), key.into()])
    }

    pub fn between(&self, lower: impl Into<Term>, upper: impl Into<Term>) -> Term {
        Term::node(
            TermKind::Between,
            vec![self.clone(), lower.into(), upper.into()],
        )
    }

    // Transformations

    pub fn filter<M>(&self, predicate: impl FuncArg<M>) -> Term {
        Term::node(TermKind::Filter, vec![self.clone(), predicate.into_func_term()])
    }

    pub fn map<M>(&self, mapping: impl FuncArg<M>) -> Term {
        Term::node(TermKind::Map, vec![self.clone(), mapping.into_func_term()])
    }

    pub fn concat_map<M>(&self, mapping: impl FuncArg<M>) -> Term {
        Term::node(
            TermKind::ConcatMap,
            vec![self.clone(), mapping.into_func_term()],
        )
    }

    /// Variadic; fewer than one key is rejected at `build` time.
    pub fn order_by(&self, keys: Vec<Term>) -> Term {
        let mut args = vec![self.clone()];
        args.extend(keys);
        Term::node(TermKind::OrderBy, args)
    }

    pub fn distinct(&self) -> Term {
        Term::node(TermKind::Distinct, vec![self.clone()])
    }

    pub fn count(&self) -> Term {
        Term::node(TermKind::Count, vec![self.clone()])
    }

    pub fn union(&self, other: impl Into<Term>) -> Term {
        Term::node(TermKind::Union, vec![self.clone(), other.into()])
    }

    pub fn skip(&self, n: impl Into<Term>) -> Term {
        Term::node(TermKind::Skip, vec![self.clone(), n.into()])
    }

    pub fn limit(&self, n: impl Into<Term>) -> Term {
        Term::node(TermKind::Limit, vec![self.clone(), n.into()])
    }

    pub fn zip(&self) -> Term {
        Term::node(TermKind::Zip, vec![self.clone()])
    }

    // Aggregation

    pub fn reduce<M>(&self, reduction: impl FuncArg<M>) -> Term {
        Term::node(
            TermKind::Reduce,
            vec![self.clone(), reduction.into_func_term()],
        )
    }

    pub fn grouped_map_reduce<M1, M2, M3>(
        &self,
        grouping: impl FuncArg<M1>,
        mapping: impl FuncArg<M2>,
        reduction: impl FuncArg<M3>,
    ) -> Term {
        Term::node(
            TermKind::GroupedMapReduce,
            vec![
                self.clone(),
                grouping.into_func_term(),
                mapping.into_func_term(),
                reduction.into_func_term(),
            ],
        )
    }

    pub fn group_by(&self, attrs: impl Into<Term>, reduction: impl Into<Term>) -> Term {
        Term::node(
            TermKind::GroupBy,
            vec![self.clone(), attrs.into(), reduction.into()],
        )
    }

    // Joins

    pub fn inner_join<M>(&self, other: impl Into<Term>, predicate: impl FuncArg<M>) -> Term {
        Term::node(
            TermKind::InnerJoin,
            vec![self.clone(), other.into(), predicate.into_func_term()],
        )
    }

    pub fn outer_join<M>(&self, other: impl Into<Term>, predicate: impl FuncArg<M>) -> Term {
        Term::node(
            TermKind::OuterJoin,
            vec![self.clone(), other.into(), predicate.into_func_term()],
        )
    }

    pub fn eq_join(&self, field: impl Into<Term>, other: impl Into<Term>) -> Term {
        Term::node(
            TermKind::EqJoin,
            vec![self.clone(), field.into(), other.into()],
        )
    }

    // Types

    pub fn coerce_to(&self, type_name: impl Into<Term>) -> Term {
        Term::node(TermKind::CoerceTo, vec![self.clone(), type_name.into()])
    }

    pub fn type_of(&self) -> Term {
        Term::node(TermKind::TypeOf, vec![self.clone()])
    }

    // Writes

    pub fn insert(&self, document: impl Into<Term>) -> Term {
        Term::node(TermKind::Insert, vec![self.clone(), document.into()])
    }

    pub fn update<M>(&self, change: impl FuncArg<M>) -> Term {
        Term::node(TermKind::Update, vec![self.clone(), change.into_func_term()])
    }

    pub fn replace<M>(&self, replacement: impl FuncArg<M>) -> Term {
        Term::node(
            TermKind::Replace,
            vec![self.clone(), replacement.into_func_term()],
        )
    }

    pub fn delete(&self) -> Term {
        Term::node(TermKind::Delete, vec![self.clone()])
    }

    // Control flow

    pub fn for_each<M>(&self, write: impl FuncArg<M>) -> Term {
        Term::node(TermKind::ForEach, vec![self.clone(), write.into_func_term()])
    }

    /// Apply a function to this value: `FUNCALL(f, self)`.
    pub fn apply<M>(&self, f: impl FuncArg<M>) -> Term {
        Term::node(TermKind::Funcall, vec![f.into_func_term(), self.clone()])
    }

    // Table-level operations on a database term

    pub fn table(&self, name: impl Into<Term>) -> Term {
        Term::node(TermKind::Table, vec![self.clone(), name.into()])
    }

    pub fn table_create(&self, name: impl Into<Term>) -> Term {
        Term::node(TermKind::TableCreate, vec![self.clone(), name.into()])
    }

    pub fn table_drop(&self, name: impl Into<Term>) -> Term {
        Term::node(TermKind::TableDrop, vec![self.clone(), name.into()])
    }

    pub fn table_list(&self) -> Term {
        Term::node(TermKind::TableList, vec![self.clone()])
    }
}

// Literal wrapping: a Term passes through unchanged, native values become
// datum leaves (composites normalized to construction nodes), and closures
// are captured as lambdas via `FuncArg`.

impl From<Datum> for Term {
    fn from(datum: Datum) -> Self {
        Term::datum(datum)
    }
}

impl From<bool> for Term {
    fn from(v: bool) -> Self {
        Term::datum(Datum::Boolean(v))
    }
}

impl From<i32> for Term {
    fn from(v: i32) -> Self {
        Term::datum(Datum::Number(v as f64))
    }
}

impl From<i64> for Term {
    fn from(v: i64) -> Self {
        Term::datum(Datum::Number(v as f64))
    }
}

impl From<f64> for Term {
    fn from(v: f64) -> Self {
        Term::datum(Datum::Number(v))
    }
}

impl From<&str> for Term {
    fn from(v: &str) -> Self {
        Term::datum(Datum::String(v.to_string()))
    }
}

impl From<String> for Term {
    fn from(v: String) -> Self {
        Term::datum(Datum::String(v))
    }
}

impl From<serde_json::Value> for Term {
    fn from(v: serde_json::Value) -> Self {
        Term::datum(Datum::from(v))
    }
}

impl<T: Into<Term>> From<Vec<T>> for Term {
    fn from(items: Vec<T>) -> Self {
        Term::from_repr(Repr::Op {
            kind: TermKind::MakeArray,
            args: items.into_iter().map(Into::into).collect(),
            optargs: BTreeMap::new(),
        })
    }
}

impl From<&Term> for Term {
    fn from(t: &Term) -> Self {
        t.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reql::r;
    use crate::wire::schema::TERM;

    fn kind_of(msg: &WireMessage) -> i32 {
        msg.get_enum(1).unwrap().unwrap()
    }

    #[test]
    fn test_terms_are_immutable_shared() {
        let base = r::table("users");
        let a = base.count();
        let b = base.distinct();
        // The original is unchanged and both wrappers reference it.
        assert_eq!(base.kind(), TermKind::Table);
        assert_eq!(a.args()[0].kind(), TermKind::Table);
        assert_eq!(b.args()[0].kind(), TermKind::Table);
    }

    #[test]
    fn test_arity_error_names_both_counts() {
        let err = Term::op(TermKind::Get, vec![r::table("t")]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("GET"), "got: {}", msg);
        assert!(msg.contains("2"), "got: {}", msg);
        assert!(msg.contains("1"), "got: {}", msg);
    }

    #[test]
    fn test_variadic_arity_bounds() {
        assert!(Term::op(TermKind::Add, vec![r::expr(1)]).is_err());
        assert!(Term::op(TermKind::Add, vec![r::expr(1), r::expr(2), r::expr(3)]).is_ok());
        assert!(Term::op(TermKind::Table, vec![]).is_err());
        assert!(Term::op(
            TermKind::Table,
            vec![r::expr("a"), r::expr("b"), r::expr("c")]
        )
        .is_err());
    }

    #[test]
    fn test_build_revalidates_variadic_fluent() {
        // order_by with no keys is below the minimum arity.
        let term = r::table("t").order_by(vec![]);
        assert!(term.build().is_err());
    }

    #[test]
    fn test_opt_name_translation() {
        let term = r::table("t").opt("useOutdated", true);
        assert!(term.optargs().contains_key("use_outdated"));

        let term = r::table("t").opt("custom_opt", 1);
        assert!(term.optargs().contains_key("custom_opt"));
    }

    #[test]
    fn test_null_opt_dropped() {
        let term = r::table("t").opt("useOutdated", Datum::Null);
        assert!(term.optargs().is_empty());
    }

    #[test]
    fn test_term_as_trailing_value_is_positional() {
        // An AST node as the final positional argument stays positional.
        let term = r::table("t").get(r::expr("k"));
        assert_eq!(term.args().len(), 2);
        assert!(term.optargs().is_empty());
    }

    #[test]
    fn test_literal_wrapping_normalizes_composites() {
        let arr: Term = vec![1, 2, 3].into();
        assert_eq!(arr.kind(), TermKind::MakeArray);
        assert_eq!(arr.args().len(), 3);

        let obj = r::expr(serde_json::json!({"a": 1, "b": [true]}));
        assert_eq!(obj.kind(), TermKind::MakeObj);
        let optargs = obj.optargs();
        assert_eq!(optargs.len(), 2);
        assert_eq!(optargs["b"].kind(), TermKind::MakeArray);
    }

    #[test]
    fn test_datum_leaf_build() {
        let msg = r::expr(1.5).build().unwrap();
        assert_eq!(kind_of(&msg), TermKind::Datum.to_wire());
        let datum = msg.get_message(2).unwrap().unwrap();
        assert_eq!(Datum::from_wire(datum).unwrap(), Datum::Number(1.5));
    }

    #[test]
    fn test_build_compiles_args_and_optargs() {
        let term = r::table("t").opt("useOutdated", true);
        let msg = term.build().unwrap();
        assert_eq!(kind_of(&msg), TermKind::Table.to_wire());
        assert_eq!(msg.get_all(3).len(), 1);
        let pairs = msg.get_all(4);
        assert_eq!(pairs.len(), 1);
        match &pairs[0] {
            Value::Message(pair) => {
                assert_eq!(pair.get_str(1).unwrap(), Some("use_outdated"))
            }
            other => panic!("unexpected optarg value {:?}", other),
        }
    }

    #[test]
    fn test_build_wire_roundtrip() {
        let term = r::table("users").filter(|row: Term| row.get_field("age").gt(21));
        let msg = term.build().unwrap();
        let bytes = crate::wire::serialize(&msg).unwrap();
        let decoded = crate::wire::deserialize(&TERM, &bytes).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_var_renumbering_per_compile() {
        fn message(value: &Value) -> &WireMessage {
            match value {
                Value::Message(m) => m,
                other => panic!("expected message, got {:?}", other),
            }
        }

        let q = r::table("t").map(|x: Term| x.add(1));
        // Whatever the process-wide counter is at, compiled ids start at 1.
        // The parameter list compiles as a MAKE_ARRAY node over datum leaves.
        for _ in 0..2 {
            let msg = q.build().unwrap();
            let func = message(&msg.get_all(3)[1]);
            let params = message(&func.get_all(3)[0]);
            assert_eq!(
                params.get_enum(1).unwrap(),
                Some(TermKind::MakeArray.to_wire())
            );
            let elems = params.get_all(3);
            assert_eq!(elems.len(), 1);
            let id = message(&elems[0]).get_message(2).unwrap().unwrap();
            assert_eq!(Datum::from_wire(id).unwrap(), Datum::Number(1.0));
        }
    }

    #[test]
    fn test_opt_on_literal_reaches_wire() {
        let term = r::expr(1).opt("default", r::row().get_field("x"));
        assert!(term.optargs().contains_key("default"));
        assert!(term.has_implicit());

        let msg = term.build().unwrap();
        assert_eq!(kind_of(&msg), TermKind::Datum.to_wire());
        assert_eq!(msg.get_all(4).len(), 1);
        let plain = r::expr(1).build().unwrap();
        assert_ne!(
            crate::wire::serialize(&msg).unwrap(),
            crate::wire::serialize(&plain).unwrap()
        );
    }
}
