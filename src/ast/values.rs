use crate::ast::{Primitive, Type};
use crate::error::{MapError, MapResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// A runtime value flowing through a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Timestamp(DateTime<Utc>),
    /// An instance of an entity (or closure container) with named fields.
    Record {
        type_name: String,
        fields: BTreeMap<String, Value>,
    },
    List(Vec<Value>),
}

impl Value {
    /// Build a record from `(field, value)` pairs.
    pub fn record<I, K>(type_name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Value::Record {
            type_name: type_name.into(),
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Read a field from a record.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Record { fields, .. } => fields.get(name),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Dynamic type of this value. Null and empty lists report `Unit` element types.
    pub fn runtime_type(&self) -> Type {
        match self {
            Value::Null => Type::Unit,
            Value::Bool(_) => Type::bool(),
            Value::Int(_) => Type::int(),
            Value::Float(_) => Type::float(),
            Value::String(_) => Type::string(),
            Value::Timestamp(_) => Type::timestamp(),
            Value::Record { type_name, .. } => Type::entity(type_name.clone()),
            Value::List(items) => Type::list(
                items
                    .iter()
                    .find(|v| !v.is_null())
                    .map(Value::runtime_type)
                    .unwrap_or(Type::Unit),
            ),
        }
    }

    /// Convert a scalar to another primitive, widening or parsing as needed.
    pub fn convert_to(&self, target: Primitive) -> Option<Value> {
        match (self, target) {
            (Value::Null, _) => Some(Value::Null),
            (Value::Bool(b), Primitive::Bool) => Some(Value::Bool(*b)),
            (Value::Bool(b), Primitive::Int) => Some(Value::Int(*b as i64)),
            (Value::Bool(b), Primitive::String) => Some(Value::String(b.to_string())),
            (Value::Int(n), Primitive::Int) => Some(Value::Int(*n)),
            (Value::Int(n), Primitive::Float) => Some(Value::Float(*n as f64)),
            (Value::Int(n), Primitive::Bool) => Some(Value::Bool(*n != 0)),
            (Value::Int(n), Primitive::String) => Some(Value::String(n.to_string())),
            (Value::Float(n), Primitive::Float) => Some(Value::Float(*n)),
            (Value::Float(n), Primitive::Int) if n.is_finite() => Some(Value::Int(n.round() as i64)),
            (Value::Float(n), Primitive::String) => Some(Value::String(n.to_string())),
            (Value::String(s), Primitive::String) => Some(Value::String(s.clone())),
            (Value::String(s), Primitive::Int) => s.trim().parse().ok().map(Value::Int),
            (Value::String(s), Primitive::Float) => s.trim().parse().ok().map(Value::Float),
            (Value::String(s), Primitive::Bool) => s.trim().parse().ok().map(Value::Bool),
            (Value::String(s), Primitive::Timestamp) => DateTime::parse_from_rfc3339(s.trim())
                .ok()
                .map(|t| Value::Timestamp(t.with_timezone(&Utc))),
            (Value::Timestamp(t), Primitive::Timestamp) => Some(Value::Timestamp(*t)),
            (Value::Timestamp(t), Primitive::String) => Some(Value::String(t.to_rfc3339())),
            _ => None,
        }
    }

    /// Convert to a declared type. Only primitive targets change the value.
    pub fn coerce_to(&self, ty: &Type) -> MapResult<Value> {
        match ty {
            Type::Primitive(p) => self
                .convert_to(*p)
                .ok_or_else(|| MapError::conversion(self.runtime_type(), ty)),
            _ => Ok(self.clone()),
        }
    }

    /// Ordering between comparable scalars. Nulls sort first; mixed numbers compare as floats.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Null, _) => Some(Ordering::Less),
            (_, Value::Null) => Some(Ordering::Greater),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
            Value::Record { type_name, fields } => {
                write!(f, "{} {{", type_name)?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, " {}: {}", k, v)?;
                }
                write!(f, " }}")
            }
            Value::List(items) => {
                write!(f, "[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Value::Timestamp(t)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}
