use serde::{Deserialize, Serialize};

/// Scalar types with a direct value representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Primitive {
    Bool,
    Int,
    Float,
    String,
    Timestamp,
}

impl std::fmt::Display for Primitive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Primitive::Bool => write!(f, "bool"),
            Primitive::Int => write!(f, "int"),
            Primitive::Float => write!(f, "float"),
            Primitive::String => write!(f, "string"),
            Primitive::Timestamp => write!(f, "timestamp"),
        }
    }
}

/// Static type of an expression node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Primitive(Primitive),
    /// A named record type that may participate in a type map.
    Entity(String),
    /// A compiler-synthesized container holding values captured at query-build time.
    Closure(String),
    /// A lazy query over elements of the inner type.
    Query(Box<Type>),
    /// A materialized, non-lazy sequence.
    List(Box<Type>),
    /// Absence of a value (statements, unknown).
    Unit,
}

impl Type {
    pub fn bool() -> Self {
        Type::Primitive(Primitive::Bool)
    }

    pub fn int() -> Self {
        Type::Primitive(Primitive::Int)
    }

    pub fn float() -> Self {
        Type::Primitive(Primitive::Float)
    }

    pub fn string() -> Self {
        Type::Primitive(Primitive::String)
    }

    pub fn timestamp() -> Self {
        Type::Primitive(Primitive::Timestamp)
    }

    pub fn entity(name: impl Into<String>) -> Self {
        Type::Entity(name.into())
    }

    pub fn closure(name: impl Into<String>) -> Self {
        Type::Closure(name.into())
    }

    pub fn query(element: Type) -> Self {
        Type::Query(Box::new(element))
    }

    pub fn list(element: Type) -> Self {
        Type::List(Box::new(element))
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, Type::Primitive(_))
    }

    /// Types copied by value. Strings are primitive but not value types.
    pub fn is_value_type(&self) -> bool {
        matches!(
            self,
            Type::Primitive(Primitive::Bool | Primitive::Int | Primitive::Float | Primitive::Timestamp)
        )
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Type::Primitive(Primitive::String))
    }

    pub fn is_lazy(&self) -> bool {
        matches!(self, Type::Query(_))
    }

    /// Lazy queries and lists are both enumerable; strings are not.
    pub fn is_enumerable(&self) -> bool {
        matches!(self, Type::Query(_) | Type::List(_))
    }

    pub fn is_closure(&self) -> bool {
        matches!(self, Type::Closure(_))
    }

    /// Element type of a query or list.
    pub fn element_type(&self) -> Option<&Type> {
        match self {
            Type::Query(inner) | Type::List(inner) => Some(inner),
            _ => None,
        }
    }

    /// Entity name, if this is an entity type.
    pub fn entity_name(&self) -> Option<&str> {
        match self {
            Type::Entity(name) => Some(name),
            _ => None,
        }
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Primitive(p) => write!(f, "{}", p),
            Type::Entity(name) => write!(f, "{}", name),
            Type::Closure(name) => write!(f, "<closure {}>", name),
            Type::Query(inner) => write!(f, "Query<{}>", inner),
            Type::List(inner) => write!(f, "List<{}>", inner),
            Type::Unit => write!(f, "()"),
        }
    }
}
