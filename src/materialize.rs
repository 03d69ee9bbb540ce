//! Result materialization.
//!
//! Decides how a translated query is executed for a requested result type:
//!
//! - **Projection**: a list of destination elements. The query stays lazy and
//!   the destination projection is composed onto it.
//! - **Passthrough**: any other list when the query has no reducer. The caller
//!   already shaped the elements; they are copied without mapping.
//! - **Reducer**: everything else. A reducer is neutralized, the projection is
//!   composed, and the reducer is reapplied on top. Plain scalars are executed
//!   and handed to the object mapper.

use crate::ast::{Expr, Type, Value};
use crate::config::MemberPath;
use crate::engine::{Execution, QueryProvider, Queryable};
use crate::error::{MapError, MapResult};
use crate::mapper::ObjectMapper;
use crate::projection::{ProjectionBuilder, compose};
use crate::provider::Inspector;
use crate::reducer::{find_element_operator, replace_element_operator};
use crate::translate::Parameters;
use std::sync::Arc;

/// Which strategy a result type selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Projection,
    Passthrough,
    Reducer,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Projection => write!(f, "projection"),
            Strategy::Passthrough => write!(f, "passthrough"),
            Strategy::Reducer => write!(f, "reducer"),
        }
    }
}

pub struct Materializer<'a> {
    pub source: &'a Arc<dyn QueryProvider>,
    pub source_element: &'a Type,
    pub dest_element: &'a Type,
    pub projections: &'a dyn ProjectionBuilder,
    pub mapper: &'a dyn ObjectMapper,
    pub parameters: &'a Parameters,
    pub expand: &'a [MemberPath],
    pub inspector: &'a dyn Inspector,
}

impl Materializer<'_> {
    /// Pick the strategy for `result_type` over the translated `source_ast`.
    pub fn strategy(&self, source_ast: &Expr, result_type: &Type) -> Strategy {
        if result_type.is_string() || !result_type.is_enumerable() {
            return Strategy::Reducer;
        }
        if result_type.element_type() == Some(self.dest_element) {
            return Strategy::Projection;
        }
        let has_reducer =
            source_ast.contains_node(&|e| matches!(e, Expr::Call { op, .. } if op.is_reducer()));
        if !result_type.is_lazy() && !has_reducer {
            Strategy::Passthrough
        } else {
            Strategy::Reducer
        }
    }

    pub fn materialize(&self, source_ast: Expr, result_type: &Type) -> MapResult<Execution> {
        let strategy = self.strategy(&source_ast, result_type);
        tracing::debug!("Materializing {} via {} strategy", result_type, strategy);
        let result = match strategy {
            Strategy::Projection => self.project(source_ast)?,
            Strategy::Passthrough => self.passthrough(source_ast)?,
            Strategy::Reducer => self.reduce(source_ast, result_type)?,
        };
        coerce(result, result_type)
    }

    fn project(&self, source_ast: Expr) -> MapResult<Execution> {
        let descriptor = self.projections.get_projection(
            self.source_element,
            self.dest_element,
            self.parameters,
            self.expand,
        )?;
        let query = Queryable::new(source_ast, Arc::clone(self.source))
            .then(|expr| compose(expr, &descriptor));
        self.inspector
            .on_source_result(query.expr(), &Execution::Lazy(query.clone()));
        Ok(Execution::Lazy(query))
    }

    fn passthrough(&self, source_ast: Expr) -> MapResult<Execution> {
        let raw = self.source.execute(&source_ast)?;
        let result = Execution::Value(raw.clone());
        self.inspector.on_source_result(&source_ast, &result);
        let items = match raw {
            Value::List(items) => items,
            Value::Null => Vec::new(),
            other => vec![other],
        };
        Ok(Execution::Value(Value::List(items)))
    }

    fn reduce(&self, source_ast: Expr, result_type: &Type) -> MapResult<Execution> {
        let found = find_element_operator(&source_ast, self.source_element);
        let source_result_type = source_ast.ty();
        let replacement = replace_element_operator(source_ast, found.candidate.as_ref());

        let Some(neutralized) = replacement.neutralized else {
            let raw = self.source.execute(&replacement.expr)?;
            self.inspector
                .on_source_result(&replacement.expr, &Execution::Value(raw.clone()));
            let mapped = self.mapper.map(raw, &source_result_type, result_type)?;
            return Ok(Execution::Value(mapped));
        };

        // Primitive results are not mappable on their own; map the elements instead.
        let (source, destination) = if &source_result_type == result_type {
            (self.source_element.clone(), self.dest_element.clone())
        } else {
            (source_result_type, result_type.clone())
        };
        tracing::debug!(
            "Reapplying {} after projecting {} to {}",
            neutralized.op(),
            source,
            destination
        );
        let descriptor =
            self.projections
                .get_projection(&source, &destination, self.parameters, self.expand)?;
        let composed = compose(replacement.expr, &descriptor);

        let signature = neutralized.reapply_signature()?;
        let op = neutralized.op();
        let args = vec![composed];
        if args.len() != signature.len() {
            return Err(MapError::unsupported_reducer(op.name(), args.len()));
        }
        let final_ast = Expr::Call {
            op,
            args,
            ty: result_type.clone(),
        };

        let raw = self.source.execute(&final_ast)?;
        let result = Execution::Value(raw);
        self.inspector.on_source_result(&final_ast, &result);
        Ok(result)
    }
}

/// Convert value types whose runtime type differs from the request; otherwise
/// check that the result is assignable as-is.
pub fn coerce(result: Execution, result_type: &Type) -> MapResult<Execution> {
    match result {
        Execution::Lazy(query) => {
            let element = query.element_type();
            match result_type.element_type() {
                Some(want) if want == element || *want == Type::Unit => Ok(Execution::Lazy(query)),
                _ => Err(MapError::conversion(query.expr().ty(), result_type)),
            }
        }
        Execution::Value(value) => {
            if result_type.is_value_type() && value.runtime_type() != *result_type {
                return value.coerce_to(result_type).map(Execution::Value);
            }
            if assignable(&value, result_type) {
                Ok(Execution::Value(value))
            } else {
                Err(MapError::conversion(value.runtime_type(), result_type))
            }
        }
    }
}

fn assignable(value: &Value, ty: &Type) -> bool {
    match (value, ty) {
        (_, Type::Unit) | (Value::Null, _) => true,
        (Value::List(items), Type::List(elem) | Type::Query(elem)) => {
            items.iter().all(|v| assignable(v, elem))
        }
        (Value::Record { type_name, .. }, Type::Entity(name)) => type_name == name,
        (v, t) => v.runtime_type() == *t,
    }
}
