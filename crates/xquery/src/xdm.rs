//! Query values: atomic values, node references and sequences.

use crate::error::{Error, ErrorCode};
use std::cmp::Ordering;
use std::fmt;
use xqdb_core::NodeProxy;

#[derive(Debug, Clone, PartialEq)]
pub enum AtomicValue {
    String(String),
    /// Atomized node content; compares as a number against numbers.
    Untyped(String),
    Integer(i64),
    Double(f64),
    Boolean(bool),
}

impl AtomicValue {
    fn as_number(&self) -> Option<f64> {
        match self {
            AtomicValue::Integer(i) => Some(*i as f64),
            AtomicValue::Double(d) => Some(*d),
            _ => None,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            AtomicValue::String(_) => "xs:string",
            AtomicValue::Untyped(_) => "xs:untypedAtomic",
            AtomicValue::Integer(_) => "xs:integer",
            AtomicValue::Double(_) => "xs:double",
            AtomicValue::Boolean(_) => "xs:boolean",
        }
    }

    /// Orders two values the way a general comparison does. `None` means
    /// the values are unordered (NaN involved).
    pub fn compare(&self, other: &AtomicValue) -> Result<Option<Ordering>, Error> {
        use AtomicValue as A;
        match (self, other) {
            (A::String(a) | A::Untyped(a), A::String(b) | A::Untyped(b)) => Ok(Some(a.cmp(b))),
            (A::Boolean(a), A::Boolean(b)) => Ok(Some(a.cmp(b))),
            (A::Untyped(s), n) if n.as_number().is_some() => {
                Ok(untyped_number(s)?.partial_cmp(&n.as_number().unwrap_or(f64::NAN)))
            }
            (n, A::Untyped(s)) if n.as_number().is_some() => {
                Ok(n.as_number().unwrap_or(f64::NAN).partial_cmp(&untyped_number(s)?))
            }
            (A::Integer(a), A::Integer(b)) => Ok(Some(a.cmp(b))),
            (a, b) => match (a.as_number(), b.as_number()) {
                (Some(x), Some(y)) => Ok(x.partial_cmp(&y)),
                _ => Err(Error::dynamic(
                    ErrorCode::XPTY0004,
                    format!("cannot compare {} with {}", a.type_name(), b.type_name()),
                )),
            },
        }
    }
}

fn untyped_number(s: &str) -> Result<f64, Error> {
    s.trim()
        .parse::<f64>()
        .map_err(|_| Error::dynamic(ErrorCode::XPTY0004, format!("cannot convert '{s}' to a number")))
}

impl fmt::Display for AtomicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AtomicValue::String(s) | AtomicValue::Untyped(s) => f.write_str(s),
            AtomicValue::Integer(i) => write!(f, "{i}"),
            AtomicValue::Double(d) if d.is_nan() => f.write_str("NaN"),
            AtomicValue::Double(d) => write!(f, "{d}"),
            AtomicValue::Boolean(b) => write!(f, "{b}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Node(NodeProxy),
    Atomic(AtomicValue),
}

pub type Sequence = Vec<Item>;

impl Item {
    pub fn as_node(&self) -> Option<&NodeProxy> {
        match self {
            Item::Node(node) => Some(node),
            Item::Atomic(_) => None,
        }
    }

    /// Atomized value. Node content is not held in memory, so a node
    /// atomizes to the uri of its document.
    pub fn atomize(&self) -> AtomicValue {
        match self {
            Item::Node(node) => AtomicValue::Untyped(node_label(node)),
            Item::Atomic(value) => value.clone(),
        }
    }
}

fn node_label(node: &NodeProxy) -> String {
    if node.is_document_node() {
        node.doc().uri()
    } else {
        format!("{}#{}", node.doc().uri(), node.node_id().get())
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::Node(node) => f.write_str(&node_label(node)),
            Item::Atomic(value) => value.fmt(f),
        }
    }
}

impl From<AtomicValue> for Item {
    fn from(value: AtomicValue) -> Self {
        Item::Atomic(value)
    }
}

impl From<NodeProxy> for Item {
    fn from(node: NodeProxy) -> Self {
        Item::Node(node)
    }
}

impl From<bool> for Item {
    fn from(b: bool) -> Self {
        Item::Atomic(AtomicValue::Boolean(b))
    }
}

impl From<i64> for Item {
    fn from(i: i64) -> Self {
        Item::Atomic(AtomicValue::Integer(i))
    }
}

impl From<&str> for Item {
    fn from(s: &str) -> Self {
        Item::Atomic(AtomicValue::String(s.to_owned()))
    }
}

/// Effective boolean value of a sequence.
pub fn effective_boolean_value(seq: &[Item]) -> Result<bool, Error> {
    match seq {
        [] => Ok(false),
        [Item::Node(_), ..] => Ok(true),
        [Item::Atomic(value)] => Ok(match value {
            AtomicValue::Boolean(b) => *b,
            AtomicValue::String(s) | AtomicValue::Untyped(s) => !s.is_empty(),
            AtomicValue::Integer(i) => *i != 0,
            AtomicValue::Double(d) => *d != 0.0 && !d.is_nan(),
        }),
        _ => Err(Error::dynamic(
            ErrorCode::FORG0006,
            "effective boolean value is not defined for a sequence of two or more atomic values",
        )),
    }
}
