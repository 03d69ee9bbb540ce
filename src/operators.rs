//! Sequence operator catalog.
//!
//! Every combinator the query surface understands is listed once in [`CATALOG`],
//! together with its overload signatures. Reducer reattachment looks up the
//! "same operator, one parameter fewer" here instead of searching at call time.

use crate::ast::{Expr, Type};
use crate::error::{MapError, MapResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;

/// A combinator on the sequence surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeqOp {
    Where,
    Select,
    OrderBy,
    OrderByDescending,
    Skip,
    Take,
    Distinct,
    Count,
    LongCount,
    Any,
    All,
    First,
    FirstOrDefault,
    Single,
    SingleOrDefault,
    Last,
    LastOrDefault,
    ElementAt,
    Sum,
    Min,
    Max,
    Average,
    Contains,
}

/// Role of one argument in an overload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// The sequence the operator runs over. Always first.
    Source,
    /// A lambda returning bool.
    Predicate,
    /// A lambda projecting each element.
    Selector,
    /// A plain value (count, index, needle).
    Scalar,
}

/// What an operator produces, relative to its input sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Same element type, still a sequence.
    Sequence,
    /// A sequence of the selector's result type.
    Reshape,
    Int,
    Bool,
    Float,
    /// One element of the sequence.
    Element,
    /// An element, or the selector's result when one is given.
    Aggregate,
}

#[derive(Debug)]
pub struct OperatorInfo {
    pub op: SeqOp,
    pub name: &'static str,
    pub overloads: &'static [&'static [ArgKind]],
    pub shape: Shape,
}

use ArgKind::*;

const SRC: &[ArgKind] = &[Source];
const SRC_PRED: &[ArgKind] = &[Source, Predicate];
const SRC_SEL: &[ArgKind] = &[Source, Selector];
const SRC_SCALAR: &[ArgKind] = &[Source, Scalar];

macro_rules! op {
    ($op:ident, [$($o:expr),+], $shape:ident) => {
        OperatorInfo {
            op: SeqOp::$op,
            name: stringify!($op),
            overloads: &[$($o),+],
            shape: Shape::$shape,
        }
    };
}

/// The operator table.
pub static CATALOG: &[OperatorInfo] = &[
    op!(Where, [SRC_PRED], Sequence),
    op!(Select, [SRC_SEL], Reshape),
    op!(OrderBy, [SRC_SEL], Sequence),
    op!(OrderByDescending, [SRC_SEL], Sequence),
    op!(Skip, [SRC_SCALAR], Sequence),
    op!(Take, [SRC_SCALAR], Sequence),
    op!(Distinct, [SRC], Sequence),
    op!(Count, [SRC, SRC_PRED], Int),
    op!(LongCount, [SRC, SRC_PRED], Int),
    op!(Any, [SRC, SRC_PRED], Bool),
    op!(All, [SRC_PRED], Bool),
    op!(First, [SRC, SRC_PRED], Element),
    op!(FirstOrDefault, [SRC, SRC_PRED], Element),
    op!(Single, [SRC, SRC_PRED], Element),
    op!(SingleOrDefault, [SRC, SRC_PRED], Element),
    op!(Last, [SRC, SRC_PRED], Element),
    op!(LastOrDefault, [SRC, SRC_PRED], Element),
    op!(ElementAt, [SRC_SCALAR], Element),
    op!(Sum, [SRC, SRC_SEL], Aggregate),
    op!(Min, [SRC, SRC_SEL], Aggregate),
    op!(Max, [SRC, SRC_SEL], Aggregate),
    op!(Average, [SRC, SRC_SEL], Float),
    op!(Contains, [SRC_SCALAR], Bool),
];

static BY_OP: LazyLock<HashMap<SeqOp, &'static OperatorInfo>> =
    LazyLock::new(|| CATALOG.iter().map(|info| (info.op, info)).collect());

static BY_NAME: LazyLock<HashMap<String, &'static OperatorInfo>> = LazyLock::new(|| {
    CATALOG
        .iter()
        .map(|info| (info.name.to_ascii_lowercase(), info))
        .collect()
});

impl SeqOp {
    /// The per-element projection step.
    pub const RESHAPE: SeqOp = SeqOp::Select;
    /// The predicate filter step.
    pub const FILTER: SeqOp = SeqOp::Where;

    pub fn info(self) -> &'static OperatorInfo {
        // Every variant has a catalog row; see `test_catalog_covers_every_operator`.
        BY_OP[&self]
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    /// Case-insensitive lookup by operator name.
    pub fn from_name(name: &str) -> Option<SeqOp> {
        BY_NAME.get(&name.to_ascii_lowercase()).map(|info| info.op)
    }

    /// Collapses a sequence to a scalar or a single element.
    pub fn is_reducer(self) -> bool {
        !matches!(self.info().shape, Shape::Sequence | Shape::Reshape)
    }

    /// Signature of the overload taking `arity` arguments (source included).
    pub fn overload(self, arity: usize) -> Option<&'static [ArgKind]> {
        self.info().overloads.iter().copied().find(|o| o.len() == arity)
    }

    /// The overload taking `arity` arguments has a predicate in second position.
    pub fn takes_predicate(self, arity: usize) -> bool {
        arity >= 2
            && self
                .overload(arity)
                .is_some_and(|sig| sig.get(1) == Some(&ArgKind::Predicate))
    }

    /// The same operator with one parameter fewer.
    pub fn predicate_free_sibling(self, arity: usize) -> MapResult<&'static [ArgKind]> {
        arity
            .checked_sub(1)
            .and_then(|n| self.overload(n))
            .ok_or_else(|| MapError::unsupported_reducer(self.name(), arity.saturating_sub(1)))
    }

    /// Static result type of applying this operator to `source` with `extra` arguments.
    pub fn result_type(self, source: &Type, extra: &[Expr]) -> Type {
        let element = source.element_type().cloned().unwrap_or(Type::Unit);
        let selector = extra.first().and_then(|e| match e {
            Expr::Lambda(l) => Some(l.body.ty()),
            _ => None,
        });
        match self.info().shape {
            Shape::Sequence => match source {
                Type::Query(_) | Type::List(_) => source.clone(),
                _ => Type::query(element),
            },
            Shape::Reshape => Type::query(selector.unwrap_or(Type::Unit)),
            Shape::Int => Type::int(),
            Shape::Bool => Type::bool(),
            Shape::Float => Type::float(),
            Shape::Element => element,
            Shape::Aggregate => selector.unwrap_or(element),
        }
    }
}

impl std::fmt::Display for SeqOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: &[SeqOp] = &[
        SeqOp::Where,
        SeqOp::Select,
        SeqOp::OrderBy,
        SeqOp::OrderByDescending,
        SeqOp::Skip,
        SeqOp::Take,
        SeqOp::Distinct,
        SeqOp::Count,
        SeqOp::LongCount,
        SeqOp::Any,
        SeqOp::All,
        SeqOp::First,
        SeqOp::FirstOrDefault,
        SeqOp::Single,
        SeqOp::SingleOrDefault,
        SeqOp::Last,
        SeqOp::LastOrDefault,
        SeqOp::ElementAt,
        SeqOp::Sum,
        SeqOp::Min,
        SeqOp::Max,
        SeqOp::Average,
        SeqOp::Contains,
    ];

    #[test]
    fn test_catalog_covers_every_operator() {
        assert_eq!(CATALOG.len(), ALL.len());
        for op in ALL {
            assert_eq!(op.info().op, *op);
            assert_eq!(SeqOp::from_name(op.name()), Some(*op));
        }
    }

    #[test]
    fn test_reducers() {
        assert!(SeqOp::Count.is_reducer());
        assert!(SeqOp::First.is_reducer());
        assert!(SeqOp::Average.is_reducer());
        assert!(!SeqOp::Where.is_reducer());
        assert!(!SeqOp::Select.is_reducer());
        assert!(!SeqOp::Take.is_reducer());
    }

    #[test]
    fn test_predicate_free_sibling() {
        assert_eq!(SeqOp::Any.predicate_free_sibling(2).unwrap(), &[ArgKind::Source]);
        assert_eq!(
            SeqOp::All.predicate_free_sibling(2),
            Err(MapError::unsupported_reducer("All", 1))
        );
    }

    #[test]
    fn test_takes_predicate_distinguishes_selectors() {
        assert!(SeqOp::Count.takes_predicate(2));
        assert!(!SeqOp::Count.takes_predicate(1));
        assert!(!SeqOp::Sum.takes_predicate(2));
        assert!(!SeqOp::ElementAt.takes_predicate(2));
    }

    #[test]
    fn test_from_name_is_case_insensitive() {
        assert_eq!(SeqOp::from_name("firstordefault"), Some(SeqOp::FirstOrDefault));
        assert_eq!(SeqOp::from_name("GroupBy"), None);
    }
}
