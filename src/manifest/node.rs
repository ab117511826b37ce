//! Tagged tree used to merge override fragments onto a workload

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use super::OverlayError;

/// A leaf value
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Integer(i64),
    Unsigned(u64),
    Float(f64),
    String(String),
}

/// A node of a workload tree, explicitly typed so merging never needs to
/// inspect values at runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum Node {
    Null,
    Scalar(Scalar),
    Sequence(Vec<Node>),
    Map(BTreeMap<String, Node>),
}

impl Node {
    fn kind(&self) -> &'static str {
        match self {
            Node::Null => "null",
            Node::Scalar(_) => "scalar",
            Node::Sequence(_) => "sequence",
            Node::Map(_) => "map",
        }
    }

    /// Merge `fragment` onto `self`
    ///
    /// Scalars and sequences present in the fragment replace the base value,
    /// maps merge key by key, and null or absent fragment fields keep the base.
    /// `path` is the dotted location of `self`, used in error messages.
    pub fn merge(self, fragment: Node, path: &str) -> Result<Node, OverlayError> {
        match (self, fragment) {
            (base, Node::Null) => Ok(base),
            (Node::Null, over) => Ok(over),
            (Node::Scalar(_), Node::Scalar(over)) => Ok(Node::Scalar(over)),
            (Node::Sequence(_), Node::Sequence(over)) => Ok(Node::Sequence(over)),
            (Node::Map(mut base), Node::Map(over)) => {
                for (key, value) in over {
                    let child_path = if path.is_empty() {
                        key.clone()
                    } else {
                        format!("{path}.{key}")
                    };
                    let merged = match base.remove(&key) {
                        Some(existing) => existing.merge(value, &child_path)?,
                        None => value,
                    };
                    base.insert(key, merged);
                }
                Ok(Node::Map(base))
            }
            (base, over) => Err(OverlayError::InvalidOverride {
                path: if path.is_empty() { "<root>".to_string() } else { path.to_string() },
                reason: format!("cannot override a {} with a {}", base.kind(), over.kind()),
            }),
        }
    }
}

impl From<Value> for Node {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Node::Null,
            Value::Bool(b) => Node::Scalar(Scalar::Bool(b)),
            Value::Number(n) => Node::Scalar(number_to_scalar(&n)),
            Value::String(s) => Node::Scalar(Scalar::String(s)),
            Value::Array(items) => Node::Sequence(items.into_iter().map(Node::from).collect()),
            Value::Object(map) => Node::Map(map.into_iter().map(|(k, v)| (k, Node::from(v))).collect()),
        }
    }
}

impl From<Node> for Value {
    fn from(node: Node) -> Self {
        match node {
            Node::Null => Value::Null,
            Node::Scalar(Scalar::Bool(b)) => Value::Bool(b),
            Node::Scalar(Scalar::Integer(i)) => Value::Number(i.into()),
            Node::Scalar(Scalar::Unsigned(u)) => Value::Number(u.into()),
            Node::Scalar(Scalar::Float(f)) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
            Node::Scalar(Scalar::String(s)) => Value::String(s),
            Node::Sequence(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            Node::Map(map) => Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect()),
        }
    }
}

fn number_to_scalar(n: &Number) -> Scalar {
    if let Some(i) = n.as_i64() {
        Scalar::Integer(i)
    } else if let Some(u) = n.as_u64() {
        Scalar::Unsigned(u)
    } else {
        Scalar::Float(n.as_f64().unwrap_or_default())
    }
}
