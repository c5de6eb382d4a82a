//! Query operator kinds and their per-kind behavior table.
//!
//! Every query operation is a [`TermKind`] whose discriminant is the wire
//! value of `Term.type`. There is no type hierarchy: one `Term` node type
//! carries a kind tag, and everything kind-specific (display name, argument
//! arity, print formatting) lives in the behavior table below.
//!
//! # Kind Categories
//!
//! - **Core data**: DATUM, MAKE_ARRAY, MAKE_OBJ
//! - **Variables**: VAR, IMPLICIT_VAR, FUNC
//! - **Database/table admin**: DB, DB_CREATE, DB_DROP, DB_LIST, TABLE_CREATE,
//!   TABLE_DROP, TABLE_LIST
//! - **Data access**: TABLE, GET, GET_FIELD, BETWEEN, NTH, SLICE
//! - **Comparison/logic**: EQ, NE, LT, LE, GT, GE, NOT, ANY, ALL
//! - **Math**: ADD, SUB, MUL, DIV, MOD
//! - **Transformations**: MAP, FILTER, CONCAT_MAP, ORDER_BY, DISTINCT, UNION,
//!   SKIP, LIMIT, ZIP
//! - **Aggregation**: REDUCE, COUNT, GROUPED_MAP_REDUCE, GROUP_BY
//! - **Joins**: INNER_JOIN, OUTER_JOIN, EQ_JOIN
//! - **Writes**: INSERT, UPDATE, REPLACE, DELETE
//! - **Control flow**: FUNCALL, BRANCH, FOR_EACH, ERROR, JAVASCRIPT

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum TermKind {
    Datum = 1,
    MakeArray = 2,
    MakeObj = 3,

    Var = 10,
    Javascript = 11,
    Error = 12,
    ImplicitVar = 13,

    Db = 14,
    Table = 15,
    Get = 16,

    Eq = 17,
    Ne = 18,
    Lt = 19,
    Le = 20,
    Gt = 21,
    Ge = 22,
    Not = 23,

    Add = 24,
    Sub = 25,
    Mul = 26,
    Div = 27,
    Mod = 28,

    Append = 29,
    Slice = 30,
    GetField = 31,
    Contains = 32,
    Pluck = 33,
    Without = 34,
    Merge = 35,
    Between = 36,

    Reduce = 37,
    Map = 38,
    Filter = 39,
    ConcatMap = 40,
    OrderBy = 41,
    Distinct = 42,
    Count = 43,
    Union = 44,
    Nth = 45,
    GroupedMapReduce = 46,
    GroupBy = 47,

    InnerJoin = 48,
    OuterJoin = 49,
    EqJoin = 50,

    CoerceTo = 51,
    TypeOf = 52,

    Update = 53,
    Delete = 54,
    Replace = 55,
    Insert = 56,

    DbCreate = 57,
    DbDrop = 58,
    DbList = 59,
    TableCreate = 60,
    TableDrop = 61,
    TableList = 62,

    Funcall = 64,
    Branch = 65,
    Any = 66,
    All = 67,
    ForEach = 68,
    Func = 69,

    Skip = 70,
    Limit = 71,
    Zip = 72,

    Asc = 73,
    Desc = 74,
}

/// Accepted positional argument count of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    Between(usize, usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(&self, count: usize) -> bool {
        match *self {
            Arity::Exact(n) => count == n,
            Arity::Between(min, max) => count >= min && count <= max,
            Arity::AtLeast(min) => count >= min,
        }
    }
}

impl std::fmt::Display for Arity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Arity::Exact(n) => write!(f, "{}", n),
            Arity::Between(min, max) => write!(f, "between {} and {}", min, max),
            Arity::AtLeast(min) => write!(f, "at least {}", min),
        }
    }
}

/// How a kind prints in query display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeStyle {
    /// `receiver.method(rest...)`; the first argument is the receiver.
    Method,
    /// `r.method(args...)`; no receiver.
    Prefix,
    /// Method form only when the optional leading receiver is present,
    /// i.e. when the argument count hits the arity maximum.
    OptReceiver,
    /// `[a, b, ...]`
    Array,
    /// `{k: v, ...}`
    Object,
    /// Handled structurally by the printer (DATUM, VAR, IMPLICIT_VAR, FUNC).
    Special,
}

impl TermKind {
    pub fn to_wire(self) -> i32 {
        self as i32
    }

    pub fn from_wire(value: i32) -> Option<Self> {
        use TermKind::*;
        Some(match value {
            1 => Datum,
            2 => MakeArray,
            3 => MakeObj,
            10 => Var,
            11 => Javascript,
            12 => Error,
            13 => ImplicitVar,
            14 => Db,
            15 => Table,
            16 => Get,
            17 => Eq,
            18 => Ne,
            19 => Lt,
            20 => Le,
            21 => Gt,
            22 => Ge,
            23 => Not,
            24 => Add,
            25 => Sub,
            26 => Mul,
            27 => Div,
            28 => Mod,
            29 => Append,
            30 => Slice,
            31 => GetField,
            32 => Contains,
            33 => Pluck,
            34 => Without,
            35 => Merge,
            36 => Between,
            37 => Reduce,
            38 => Map,
            39 => Filter,
            40 => ConcatMap,
            41 => OrderBy,
            42 => Distinct,
            43 => Count,
            44 => Union,
            45 => Nth,
            46 => GroupedMapReduce,
            47 => GroupBy,
            48 => InnerJoin,
            49 => OuterJoin,
            50 => EqJoin,
            51 => CoerceTo,
            52 => TypeOf,
            53 => Update,
            54 => Delete,
            55 => Replace,
            56 => Insert,
            57 => DbCreate,
            58 => DbDrop,
            59 => DbList,
            60 => TableCreate,
            61 => TableDrop,
            62 => TableList,
            64 => Funcall,
            65 => Branch,
            66 => Any,
            67 => All,
            68 => ForEach,
            69 => Func,
            70 => Skip,
            71 => Limit,
            72 => Zip,
            73 => Asc,
            74 => Desc,
            _ => return None,
        })
    }

    /// Wire-style display name, used in error messages.
    pub fn name(self) -> &'static str {
        use TermKind::*;
        match self {
            Datum => "DATUM",
            MakeArray => "MAKE_ARRAY",
            MakeObj => "MAKE_OBJ",
            Var => "VAR",
            Javascript => "JAVASCRIPT",
            Error => "ERROR",
            ImplicitVar => "IMPLICIT_VAR",
            Db => "DB",
            Table => "TABLE",
            Get => "GET",
            Eq => "EQ",
            Ne => "NE",
            Lt => "LT",
            Le => "LE",
            Gt => "GT",
            Ge => "GE",
            Not => "NOT",
            Add => "ADD",
            Sub => "SUB",
            Mul => "MUL",
            Div => "DIV",
            Mod => "MOD",
            Append => "APPEND",
            Slice => "SLICE",
            GetField => "GET_FIELD",
            Contains => "CONTAINS",
            Pluck => "PLUCK",
            Without => "WITHOUT",
            Merge => "MERGE",
            Between => "BETWEEN",
            Reduce => "REDUCE",
            Map => "MAP",
            Filter => "FILTER",
            ConcatMap => "CONCAT_MAP",
            OrderBy => "ORDER_BY",
            Distinct => "DISTINCT",
            Count => "COUNT",
            Union => "UNION",
            Nth => "NTH",
            GroupedMapReduce => "GROUPED_MAP_REDUCE",
            GroupBy => "GROUP_BY",
            InnerJoin => "INNER_JOIN",
            OuterJoin => "OUTER_JOIN",
            EqJoin => "EQ_JOIN",
            CoerceTo => "COERCE_TO",
            TypeOf => "TYPE_OF",
            Update => "UPDATE",
            Delete => "DELETE",
            Replace => "REPLACE",
            Insert => "INSERT",
            DbCreate => "DB_CREATE",
            DbDrop => "DB_DROP",
            DbList => "DB_LIST",
            TableCreate => "TABLE_CREATE",
            TableDrop => "TABLE_DROP",
            TableList => "TABLE_LIST",
            Funcall => "FUNCALL",
            Branch => "BRANCH",
            Any => "ANY",
            All => "ALL",
            ForEach => "FOR_EACH",
            Func => "FUNC",
            Skip => "SKIP",
            Limit => "LIMIT",
            Zip => "ZIP",
            Asc => "ASC",
            Desc => "DESC",
        }
    }

    /// Name used when printing the kind in expression form.
    pub fn method_name(self) -> &'static str {
        use TermKind::*;
        match self {
            Datum => "expr",
            MakeArray => "expr",
            MakeObj => "expr",
            Var => "var",
            Javascript => "js",
            Error => "error",
            ImplicitVar => "row",
            Db => "db",
            Table => "table",
            Get => "get",
            Eq => "eq",
            Ne => "ne",
            Lt => "lt",
            Le => "le",
            Gt => "gt",
            Ge => "ge",
            Not => "not",
            Add => "add",
            Sub => "sub",
            Mul => "mul",
            Div => "div",
            Mod => "mod",
            Append => "append",
            Slice => "slice",
            GetField => "get_field",
            Contains => "contains",
            Pluck => "pluck",
            Without => "without",
            Merge => "merge",
            Between => "between",
            Reduce => "reduce",
            Map => "map",
            Filter => "filter",
            ConcatMap => "concat_map",
            OrderBy => "order_by",
            Distinct => "distinct",
            Count => "count",
            Union => "union",
            Nth => "nth",
            GroupedMapReduce => "grouped_map_reduce",
            GroupBy => "group_by",
            InnerJoin => "inner_join",
            OuterJoin => "outer_join",
            EqJoin => "eq_join",
            CoerceTo => "coerce_to",
            TypeOf => "type_of",
            Update => "update",
            Delete => "delete",
            Replace => "replace",
            Insert => "insert",
            DbCreate => "db_create",
            DbDrop => "db_drop",
            DbList => "db_list",
            TableCreate => "table_create",
            TableDrop => "table_drop",
            TableList => "table_list",
            Funcall => "do",
            Branch => "branch",
            Any => "or",
            All => "and",
            ForEach => "for_each",
            Func => "fn",
            Skip => "skip",
            Limit => "limit",
            Zip => "zip",
            Asc => "asc",
            Desc => "desc",
        }
    }

    /// Accepted positional argument count.
    pub fn arity(self) -> Arity {
        use Arity::{AtLeast, Exact};
        use TermKind::*;
        match self {
            Datum => Exact(0),
            MakeArray => AtLeast(0),
            MakeObj => Exact(0),
            Var => Exact(1),
            Javascript => Exact(1),
            Error => Exact(1),
            ImplicitVar => Exact(0),
            Db => Exact(1),
            Table => Arity::Between(1, 2),
            Get => Exact(2),
            Eq | Ne | Lt | Le | Gt | Ge => AtLeast(2),
            Not => Exact(1),
            Add | Sub | Mul | Div => AtLeast(2),
            Mod => Exact(2),
            Append => Exact(2),
            Slice => Exact(3),
            GetField => Exact(2),
            Contains => AtLeast(2),
            Pluck | Without => AtLeast(2),
            Merge => Exact(2),
            Between => Exact(3),
            Reduce => Exact(2),
            Map => Exact(2),
            Filter => Exact(2),
            ConcatMap => Exact(2),
            OrderBy => AtLeast(2),
            Distinct => Exact(1),
            Count => Arity::Between(1, 2),
            Union => AtLeast(2),
            Nth => Exact(2),
            GroupedMapReduce => Exact(4),
            GroupBy => Exact(3),
            InnerJoin | OuterJoin | EqJoin => Exact(3),
            CoerceTo => Exact(2),
            TypeOf => Exact(1),
            Update => Exact(2),
            Delete => Exact(1),
            Replace => Exact(2),
            Insert => Exact(2),
            DbCreate | DbDrop => Exact(1),
            DbList => Exact(0),
            TableCreate | TableDrop => Arity::Between(1, 2),
            TableList => Arity::Between(0, 1),
            Funcall => AtLeast(1),
            Branch => Exact(3),
            Any | All => AtLeast(1),
            ForEach => Exact(2),
            Func => Exact(2),
            Skip | Limit => Exact(2),
            Zip => Exact(1),
            Asc | Desc => Exact(1),
        }
    }

    /// Print formatting rule.
    pub fn compose_style(self) -> ComposeStyle {
        use ComposeStyle::*;
        use TermKind::*;
        match self {
            Datum | Var | ImplicitVar | Func => Special,
            MakeArray => Array,
            MakeObj => Object,
            Db | DbCreate | DbDrop | DbList | Javascript | Error | Branch | Funcall | Asc
            | Desc => Prefix,
            Table | TableCreate | TableDrop | TableList => OptReceiver,
            _ => Method,
        }
    }
}

impl std::fmt::Display for TermKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
