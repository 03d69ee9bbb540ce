//! Query providers and the lazy query handle.
//!
//! A [`QueryProvider`] executes expression trees. A [`Queryable`] pairs an
//! expression with the provider that will run it, and defers all work until it
//! is enumerated or a terminal operator is executed.

mod memory;

pub use memory::InMemoryProvider;

use crate::ast::{Expr, Type, Value};
use crate::error::{MapError, MapResult};
use std::sync::Arc;

/// Observes a failure before it is returned to the caller. Cannot suppress it.
pub type ExceptionHandler = Arc<dyn Fn(&MapError) + Send + Sync>;

/// Receives the materialized elements each time a query is enumerated.
pub type EnumerationHandler = Arc<dyn Fn(&[Value]) + Send + Sync>;

/// Result of executing an expression for a requested result type.
#[derive(Clone)]
pub enum Execution {
    /// A further lazy query; nothing has been evaluated yet.
    Lazy(Queryable),
    /// A materialized value (scalar, element or list).
    Value(Value),
}

impl Execution {
    /// Materialize, enumerating lazy results.
    pub fn into_value(self) -> MapResult<Value> {
        match self {
            Execution::Lazy(query) => query.to_list().map(Value::List),
            Execution::Value(v) => Ok(v),
        }
    }

    pub fn is_lazy(&self) -> bool {
        matches!(self, Execution::Lazy(_))
    }
}

impl std::fmt::Debug for Execution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Execution::Lazy(q) => write!(f, "Lazy({})", q.expr()),
            Execution::Value(v) => write!(f, "Value({})", v),
        }
    }
}

/// Executes expression trees.
pub trait QueryProvider: Send + Sync {
    /// Execute eagerly. Sequence-typed expressions materialize to [`Value::List`].
    fn execute(&self, expr: &Expr) -> MapResult<Value>;

    /// Execute for a requested result type. Providers may keep sequence results lazy.
    fn execute_as(&self, expr: &Expr, _result_type: &Type) -> MapResult<Execution> {
        self.execute(expr).map(Execution::Value)
    }
}

/// A lazily evaluated query bound to its provider.
#[derive(Clone)]
pub struct Queryable {
    expr: Expr,
    element: Type,
    provider: Arc<dyn QueryProvider>,
    on_enumerate: Option<EnumerationHandler>,
    on_error: Option<ExceptionHandler>,
}

impl Queryable {
    pub fn new(expr: Expr, provider: Arc<dyn QueryProvider>) -> Self {
        let element = expr.ty().element_type().cloned().unwrap_or(Type::Unit);
        Self {
            expr,
            element,
            provider,
            on_enumerate: None,
            on_error: None,
        }
    }

    /// A query over every element of `element` in `provider`.
    pub fn root(element: Type, provider: Arc<dyn QueryProvider>) -> Self {
        Self::new(Expr::root(element), provider)
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn element_type(&self) -> &Type {
        &self.element
    }

    pub fn provider(&self) -> &Arc<dyn QueryProvider> {
        &self.provider
    }

    pub fn on_enumerate(mut self, handler: EnumerationHandler) -> Self {
        self.on_enumerate = Some(handler);
        self
    }

    pub fn on_error(mut self, handler: ExceptionHandler) -> Self {
        self.on_error = Some(handler);
        self
    }

    /// Same provider and handlers over a different expression.
    pub fn with_expr(&self, expr: Expr) -> Self {
        let element = expr.ty().element_type().cloned().unwrap_or(Type::Unit);
        Self {
            expr,
            element,
            provider: Arc::clone(&self.provider),
            on_enumerate: self.on_enumerate.clone(),
            on_error: self.on_error.clone(),
        }
    }

    /// Extend the pipeline without executing it.
    pub fn then(&self, build: impl FnOnce(Expr) -> Expr) -> Self {
        self.with_expr(build(self.expr.clone()))
    }

    /// Build a terminal expression and execute it eagerly.
    pub fn execute(&self, build: impl FnOnce(Expr) -> Expr) -> MapResult<Value> {
        let expr = build(self.expr.clone());
        let ty = expr.ty();
        self.observe(
            self.provider
                .execute_as(&expr, &ty)
                .and_then(Execution::into_value),
        )
    }

    /// Enumerate the query.
    pub fn to_list(&self) -> MapResult<Vec<Value>> {
        let result_type = Type::list(self.element.clone());
        let value = self.observe(
            self.provider
                .execute_as(&self.expr, &result_type)
                .and_then(Execution::into_value),
        )?;
        let items = match value {
            Value::List(items) => items,
            Value::Null => Vec::new(),
            other => vec![other],
        };
        if let Some(handler) = &self.on_enumerate {
            handler(&items);
        }
        Ok(items)
    }

    fn observe<T>(&self, result: MapResult<T>) -> MapResult<T> {
        if let (Err(e), Some(handler)) = (&result, &self.on_error) {
            handler(e);
        }
        result
    }
}

impl std::fmt::Debug for Queryable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queryable")
            .field("expr", &self.expr.to_string())
            .field("element", &self.element)
            .finish()
    }
}
