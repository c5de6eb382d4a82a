//! Static descriptors for the protocol message set.
//!
//! Field tags here are the wire contract: they are stable forever and never
//! reused for a different type. `Query` tags 4 and 5 were used by earlier
//! protocol revisions and stay reserved.

use super::message::{FieldDescriptor, FieldKind, MessageDescriptor};

/// `Datum.AssocPair`: one key/value entry of an object datum.
pub static DATUM_ASSOC_PAIR: MessageDescriptor = MessageDescriptor {
    name: "Datum.AssocPair",
    fields: &[
        FieldDescriptor {
            tag: 1,
            name: "key",
            kind: FieldKind::String,
            repeated: false,
        },
        FieldDescriptor {
            tag: 2,
            name: "val",
            kind: FieldKind::Message(&DATUM),
            repeated: false,
        },
    ],
};

/// `Datum`: a tagged scalar/array/object value.
pub static DATUM: MessageDescriptor = MessageDescriptor {
    name: "Datum",
    fields: &[
        FieldDescriptor {
            tag: 1,
            name: "type",
            kind: FieldKind::Enum,
            repeated: false,
        },
        FieldDescriptor {
            tag: 2,
            name: "r_bool",
            kind: FieldKind::Bool,
            repeated: false,
        },
        FieldDescriptor {
            tag: 3,
            name: "r_num",
            kind: FieldKind::Double,
            repeated: false,
        },
        FieldDescriptor {
            tag: 4,
            name: "r_str",
            kind: FieldKind::String,
            repeated: false,
        },
        FieldDescriptor {
            tag: 5,
            name: "r_array",
            kind: FieldKind::Message(&DATUM),
            repeated: true,
        },
        FieldDescriptor {
            tag: 6,
            name: "r_object",
            kind: FieldKind::Message(&DATUM_ASSOC_PAIR),
            repeated: true,
        },
    ],
};

/// `Term.AssocPair`: one named optional argument of a term.
pub static TERM_ASSOC_PAIR: MessageDescriptor = MessageDescriptor {
    name: "Term.AssocPair",
    fields: &[
        FieldDescriptor {
            tag: 1,
            name: "key",
            kind: FieldKind::String,
            repeated: false,
        },
        FieldDescriptor {
            tag: 2,
            name: "val",
            kind: FieldKind::Message(&TERM),
            repeated: false,
        },
    ],
};

/// `Term`: one node of a compiled query tree.
pub static TERM: MessageDescriptor = MessageDescriptor {
    name: "Term",
    fields: &[
        FieldDescriptor {
            tag: 1,
            name: "type",
            kind: FieldKind::Enum,
            repeated: false,
        },
        FieldDescriptor {
            tag: 2,
            name: "datum",
            kind: FieldKind::Message(&DATUM),
            repeated: false,
        },
        FieldDescriptor {
            tag: 3,
            name: "args",
            kind: FieldKind::Message(&TERM),
            repeated: true,
        },
        FieldDescriptor {
            tag: 4,
            name: "optargs",
            kind: FieldKind::Message(&TERM_ASSOC_PAIR),
            repeated: true,
        },
    ],
};

/// `Query.AssocPair`: one global optional argument of a query.
pub static QUERY_ASSOC_PAIR: MessageDescriptor = MessageDescriptor {
    name: "Query.AssocPair",
    fields: &[
        FieldDescriptor {
            tag: 1,
            name: "key",
            kind: FieldKind::String,
            repeated: false,
        },
        FieldDescriptor {
            tag: 2,
            name: "val",
            kind: FieldKind::Message(&TERM),
            repeated: false,
        },
    ],
};

/// `Query`: one client-to-server message.
pub static QUERY: MessageDescriptor = MessageDescriptor {
    name: "Query",
    fields: &[
        FieldDescriptor {
            tag: 1,
            name: "type",
            kind: FieldKind::Enum,
            repeated: false,
        },
        FieldDescriptor {
            tag: 2,
            name: "query",
            kind: FieldKind::Message(&TERM),
            repeated: false,
        },
        FieldDescriptor {
            tag: 3,
            name: "token",
            kind: FieldKind::String,
            repeated: false,
        },
        // Tags 4-5 reserved.
        FieldDescriptor {
            tag: 6,
            name: "global_optargs",
            kind: FieldKind::Message(&QUERY_ASSOC_PAIR),
            repeated: true,
        },
    ],
};

/// `Frame`: one step in a backtrace path.
pub static FRAME: MessageDescriptor = MessageDescriptor {
    name: "Frame",
    fields: &[
        FieldDescriptor {
            tag: 1,
            name: "type",
            kind: FieldKind::Enum,
            repeated: false,
        },
        FieldDescriptor {
            tag: 2,
            name: "pos",
            kind: FieldKind::Int64,
            repeated: false,
        },
        FieldDescriptor {
            tag: 3,
            name: "opt",
            kind: FieldKind::String,
            repeated: false,
        },
    ],
};

/// `Backtrace`: the path from the query root to an erroring subterm.
pub static BACKTRACE: MessageDescriptor = MessageDescriptor {
    name: "Backtrace",
    fields: &[FieldDescriptor {
        tag: 1,
        name: "frames",
        kind: FieldKind::Message(&FRAME),
        repeated: true,
    }],
};

/// `Response`: one server-to-client message.
pub static RESPONSE: MessageDescriptor = MessageDescriptor {
    name: "Response",
    fields: &[
        FieldDescriptor {
            tag: 1,
            name: "type",
            kind: FieldKind::Enum,
            repeated: false,
        },
        FieldDescriptor {
            tag: 2,
            name: "token",
            kind: FieldKind::String,
            repeated: false,
        },
        FieldDescriptor {
            tag: 3,
            name: "response",
            kind: FieldKind::Message(&DATUM),
            repeated: true,
        },
        FieldDescriptor {
            tag: 4,
            name: "backtrace",
            kind: FieldKind::Message(&BACKTRACE),
            repeated: false,
        },
    ],
};

/// Wire values of `Datum.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum DatumType {
    Null = 1,
    Bool = 2,
    Num = 3,
    Str = 4,
    Array = 5,
    Object = 6,
}

impl DatumType {
    pub fn from_wire(value: i32) -> Option<Self> {
        match value {
            1 => Some(DatumType::Null),
            2 => Some(DatumType::Bool),
            3 => Some(DatumType::Num),
            4 => Some(DatumType::Str),
            5 => Some(DatumType::Array),
            6 => Some(DatumType::Object),
            _ => None,
        }
    }
}

/// Wire values of `Query.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum QueryType {
    Start = 1,
    Continue = 2,
    Stop = 3,
}

impl QueryType {
    pub fn from_wire(value: i32) -> Option<Self> {
        match value {
            1 => Some(QueryType::Start),
            2 => Some(QueryType::Continue),
            3 => Some(QueryType::Stop),
            _ => None,
        }
    }
}

/// Wire values of `Response.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ResponseType {
    SuccessAtom = 1,
    SuccessSequence = 2,
    SuccessPartial = 3,
    ClientError = 16,
    CompileError = 17,
    RuntimeError = 18,
}

impl ResponseType {
    pub fn from_wire(value: i32) -> Option<Self> {
        match value {
            1 => Some(ResponseType::SuccessAtom),
            2 => Some(ResponseType::SuccessSequence),
            3 => Some(ResponseType::SuccessPartial),
            16 => Some(ResponseType::ClientError),
            17 => Some(ResponseType::CompileError),
            18 => Some(ResponseType::RuntimeError),
            _ => None,
        }
    }
}

/// Wire values of `Frame.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum FrameType {
    Pos = 1,
    Opt = 2,
}

impl FrameType {
    pub fn from_wire(value: i32) -> Option<Self> {
        match value {
            1 => Some(FrameType::Pos),
            2 => Some(FrameType::Opt),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_tags_are_stable() {
        assert_eq!(QUERY.field_by_name("token").unwrap().tag, 3);
        assert_eq!(QUERY.field_by_name("global_optargs").unwrap().tag, 6);
        assert!(QUERY.field(4).is_none());
        assert!(QUERY.field(5).is_none());
        assert_eq!(RESPONSE.field_by_name("response").unwrap().tag, 3);
        assert_eq!(TERM.field_by_name("optargs").unwrap().tag, 4);
        assert_eq!(DATUM.field_by_name("r_object").unwrap().tag, 6);
    }

    #[test]
    fn test_enum_wire_values() {
        assert_eq!(ResponseType::SuccessAtom as i32, 1);
        assert_eq!(ResponseType::ClientError as i32, 16);
        assert_eq!(ResponseType::RuntimeError as i32, 18);
        assert_eq!(ResponseType::from_wire(17), Some(ResponseType::CompileError));
        assert_eq!(ResponseType::from_wire(99), None);
        assert_eq!(QueryType::Stop as i32, 3);
        assert_eq!(FrameType::from_wire(2), Some(FrameType::Opt));
    }
}
