//! The mapping query provider.
//!
//! [`MappingProvider`] accepts queries written against a destination element
//! type, translates them to the source shape and executes them on the source
//! provider. Every execution goes through one failure boundary: the configured
//! exception handler sees each error once, and the error is returned unchanged.

use crate::ast::{Expr, Type, Value};
use crate::config::{MapperConfig, MemberPath};
use crate::engine::{EnumerationHandler, ExceptionHandler, Execution, QueryProvider, Queryable};
use crate::error::{MapError, MapResult};
use crate::mapper::{ConfigMapper, ObjectMapper};
use crate::materialize::Materializer;
use crate::projection::{ConfigProjectionBuilder, ProjectionBuilder};
use crate::translate::{Parameters, Translator};
use crate::visit::{ExprTransform, Hooks};
use std::sync::Arc;

/// Diagnostic side channel. Every method defaults to doing nothing.
pub trait Inspector: Send + Sync {
    /// Before translation, with the requested result type and the destination query.
    fn on_start(&self, _result_type: &Type, _expr: &Expr) {}

    /// After the source query or source result is obtained.
    fn on_source_result(&self, _expr: &Expr, _result: &Execution) {}

    /// After the destination result is computed.
    fn on_dest_result(&self, _result: &Execution) {}
}

/// An inspector that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopInspector;

impl Inspector for NoopInspector {}

/// Executes destination-shaped queries against a source-shaped provider.
pub struct MappingProvider {
    config: Arc<MapperConfig>,
    source: Queryable,
    dest_element: Type,
    before: Hooks,
    after: Hooks,
    parameters: Parameters,
    expand: Vec<MemberPath>,
    exception_handler: ExceptionHandler,
    inspector: Arc<dyn Inspector>,
    projections: Arc<dyn ProjectionBuilder>,
    mapper: Arc<dyn ObjectMapper>,
    enumeration_handler: Option<EnumerationHandler>,
}

impl MappingProvider {
    /// Start building a provider mapping `source` elements to `dest_element`.
    pub fn builder(
        config: Arc<MapperConfig>,
        source: Queryable,
        dest_element: Type,
    ) -> MappingProviderBuilder {
        MappingProviderBuilder {
            config,
            source,
            dest_element,
            before: Vec::new(),
            after: Vec::new(),
            parameters: Parameters::new(),
            expand: Vec::new(),
            exception_handler: None,
            inspector: None,
            projections: None,
            mapper: None,
            enumeration_handler: None,
        }
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    pub fn source(&self) -> &Queryable {
        &self.source
    }

    pub fn dest_element(&self) -> &Type {
        &self.dest_element
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// The destination-shaped query root.
    pub fn dest_root(&self) -> Expr {
        Expr::root(self.dest_element.clone())
    }

    /// A lazy query over every destination element.
    pub fn query(self: &Arc<Self>) -> Queryable {
        self.create_query(self.dest_root())
    }

    /// Wrap a destination expression in a lazy handle that executes through this provider.
    pub fn create_query(self: &Arc<Self>, expr: Expr) -> Queryable {
        let provider: Arc<dyn QueryProvider> = Arc::clone(self) as Arc<dyn QueryProvider>;
        let query = Queryable::new(expr, provider);
        match &self.enumeration_handler {
            Some(handler) => query.on_enumerate(Arc::clone(handler)),
            None => query,
        }
    }

    /// Translate a destination expression into its source form without executing it.
    pub fn translate(&self, expr: Expr) -> MapResult<Expr> {
        Translator {
            config: &self.config,
            source_root: self.source.expr(),
            source_element: self.source.element_type(),
            dest_element: &self.dest_element,
            before: &self.before,
            after: &self.after,
            parameters: &self.parameters,
        }
        .translate(expr)
    }

    fn run(&self, expr: &Expr, result_type: &Type) -> MapResult<Execution> {
        self.inspector.on_start(result_type, expr);
        let source_ast = self.translate(expr.clone())?;

        let materializer = Materializer {
            source: self.source.provider(),
            source_element: self.source.element_type(),
            dest_element: &self.dest_element,
            projections: self.projections.as_ref(),
            mapper: self.mapper.as_ref(),
            parameters: &self.parameters,
            expand: &self.expand,
            inspector: self.inspector.as_ref(),
        };
        let result = materializer.materialize(source_ast, result_type)?;
        self.inspector.on_dest_result(&result);
        Ok(result)
    }

    /// The failure boundary: observe, then return the same error.
    fn guarded<T>(&self, result: MapResult<T>) -> MapResult<T> {
        if let Err(e) = &result {
            tracing::warn!("Query mapping failed: {}", e);
            (self.exception_handler)(e);
        }
        result
    }
}

impl QueryProvider for MappingProvider {
    fn execute(&self, expr: &Expr) -> MapResult<Value> {
        let result_type = expr.ty();
        let result_type = match result_type {
            Type::Query(elem) => Type::List(elem),
            other => other,
        };
        self.guarded(
            self.run(expr, &result_type)
                .and_then(Execution::into_value),
        )
    }

    /// Lazy results carry the exception handler so that failures during their
    /// later enumeration are observed too.
    fn execute_as(&self, expr: &Expr, result_type: &Type) -> MapResult<Execution> {
        Ok(match self.guarded(self.run(expr, result_type))? {
            Execution::Lazy(query) => {
                Execution::Lazy(query.on_error(Arc::clone(&self.exception_handler)))
            }
            value => value,
        })
    }
}

impl std::fmt::Debug for MappingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappingProvider")
            .field("source", &self.source)
            .field("dest_element", &self.dest_element)
            .field("before", &self.before.len())
            .field("after", &self.after.len())
            .field("parameters", &self.parameters)
            .field("expand", &self.expand)
            .finish()
    }
}

/// Builder for [`MappingProvider`]. Unset collaborators get defaults on `build`.
pub struct MappingProviderBuilder {
    config: Arc<MapperConfig>,
    source: Queryable,
    dest_element: Type,
    before: Hooks,
    after: Hooks,
    parameters: Parameters,
    expand: Vec<MemberPath>,
    exception_handler: Option<ExceptionHandler>,
    inspector: Option<Arc<dyn Inspector>>,
    projections: Option<Arc<dyn ProjectionBuilder>>,
    mapper: Option<Arc<dyn ObjectMapper>>,
    enumeration_handler: Option<EnumerationHandler>,
}

impl MappingProviderBuilder {
    /// Add a transform run before translation. Hooks run in insertion order.
    pub fn before_hook(mut self, hook: Arc<dyn ExprTransform>) -> Self {
        self.before.push(hook);
        self
    }

    /// Add a transform run after translation.
    pub fn after_hook(mut self, hook: Arc<dyn ExprTransform>) -> Self {
        self.after.push(hook);
        self
    }

    /// Values that override captured ones by name.
    pub fn parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn parameter(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.to_string(), value.into());
        self
    }

    /// Request eager expansion of a member path.
    pub fn expand(mut self, path: MemberPath) -> Self {
        if !self.expand.contains(&path) {
            self.expand.push(path);
        }
        self
    }

    pub fn exception_handler(mut self, handler: ExceptionHandler) -> Self {
        self.exception_handler = Some(handler);
        self
    }

    pub fn inspector(mut self, inspector: Arc<dyn Inspector>) -> Self {
        self.inspector = Some(inspector);
        self
    }

    pub fn projection_builder(mut self, builder: Arc<dyn ProjectionBuilder>) -> Self {
        self.projections = Some(builder);
        self
    }

    pub fn mapper(mut self, mapper: Arc<dyn ObjectMapper>) -> Self {
        self.mapper = Some(mapper);
        self
    }

    /// Called with the elements every time a query from this provider is enumerated.
    pub fn enumeration_handler(mut self, handler: EnumerationHandler) -> Self {
        self.enumeration_handler = Some(handler);
        self
    }

    pub fn build(self) -> MappingProvider {
        let config = self.config;
        MappingProvider {
            projections: self
                .projections
                .unwrap_or_else(|| Arc::new(ConfigProjectionBuilder::new(Arc::clone(&config)))),
            mapper: self
                .mapper
                .unwrap_or_else(|| Arc::new(ConfigMapper::new(Arc::clone(&config)))),
            exception_handler: self.exception_handler.unwrap_or_else(|| Arc::new(|_: &MapError| {})),
            inspector: self.inspector.unwrap_or_else(|| Arc::new(NoopInspector)),
            config,
            source: self.source,
            dest_element: self.dest_element,
            before: self.before,
            after: self.after,
            parameters: self.parameters,
            expand: self.expand,
            enumeration_handler: self.enumeration_handler,
        }
    }

    /// Build and wrap in an `Arc`, ready for [`MappingProvider::query`].
    pub fn build_shared(self) -> Arc<MappingProvider> {
        Arc::new(self.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Lambda;
    use crate::config::{MemberSource, TypeMap};
    use crate::engine::InMemoryProvider;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn employee() -> Type {
        Type::entity("Employee")
    }

    fn dto() -> Type {
        Type::entity("EmployeeDto")
    }

    fn builder() -> MappingProviderBuilder {
        let config = Arc::new(
            MapperConfig::new()
                .entity(
                    "Employee",
                    [("Id", Type::int()), ("FullName", Type::string()), ("Age", Type::int())],
                )
                .entity(
                    "EmployeeDto",
                    [("Id", Type::int()), ("Name", Type::string()), ("Age", Type::int())],
                )
                .map(
                    TypeMap::new("Employee", "EmployeeDto")
                        .map_member("Name", MemberSource::member("FullName")),
                ),
        );
        let data = InMemoryProvider::new().collection(
            "Employee",
            vec![Value::record(
                "Employee",
                [("Id", Value::Int(1)), ("FullName", "Ann".into()), ("Age", Value::Int(30))],
            )],
        );
        let source = Queryable::root(employee(), Arc::new(data));
        MappingProvider::builder(config, source, dto())
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Inspector for Recorder {
        fn on_start(&self, result_type: &Type, _expr: &Expr) {
            self.events.lock().unwrap().push(format!("start {}", result_type));
        }

        fn on_source_result(&self, expr: &Expr, _result: &Execution) {
            self.events.lock().unwrap().push(format!("source {}", expr));
        }

        fn on_dest_result(&self, result: &Execution) {
            self.events.lock().unwrap().push(format!("dest {:?}", result));
        }
    }

    #[test]
    fn test_inspector_sees_three_points() {
        let recorder = Arc::new(Recorder::default());
        let provider = builder().inspector(recorder.clone()).build();
        let expr = Expr::root(dto()).count();
        provider.execute(&expr).unwrap();
        let events = recorder.events.lock().unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], "start int");
        assert!(events[1].starts_with("source Root(Employee).Select("));
        assert_eq!(events[2], "dest Value(1)");
    }

    #[test]
    fn test_inspector_sees_lazy_projection() {
        let recorder = Arc::new(Recorder::default());
        let provider = builder().inspector(recorder.clone()).build();
        let expr = Expr::root(dto())
            .filter(Lambda::with("d", dto(), |d| d.member("Age", Type::int()).gt(Expr::constant(18))));
        let result = provider.execute_as(&expr, &Type::list(dto())).unwrap();
        assert!(matches!(result, Execution::Lazy(_)));

        let events = recorder.events.lock().unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], "start List<EmployeeDto>");
        assert!(events[1].starts_with("source Root(Employee).Where(d => (d.Age > 18)).Select("));
        assert!(events[2].starts_with("dest Lazy(Root(Employee).Where(d => (d.Age > 18)).Select("));
    }

    #[test]
    fn test_inspector_sees_passthrough() {
        let recorder = Arc::new(Recorder::default());
        let provider = builder().inspector(recorder.clone()).build();
        let expr = Expr::root(dto()).select(Lambda::with("d", dto(), |d| d.member("Name", Type::string())));
        let result = provider.execute_as(&expr, &Type::list(Type::string())).unwrap();
        assert!(matches!(result, Execution::Value(_)));

        let events = recorder.events.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                "start List<string>".to_string(),
                "source Root(Employee).Select(d => d.FullName)".to_string(),
                "dest Value([\"Ann\"])".to_string(),
            ]
        );
    }

    #[test]
    fn test_handler_called_once_and_error_returned() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let provider = builder()
            .exception_handler(Arc::new(move |_: &MapError| {
                seen.fetch_add(1, Ordering::SeqCst);
            }))
            .build();
        let expr = Expr::root(dto())
            .filter(Lambda::with("d", dto(), |d| d.member("Salary", Type::int()).gt(Expr::constant(0))));
        let err = provider.execute(&expr).unwrap_err();
        assert!(matches!(err, MapError::Translation(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_query_enumerates_through_provider() {
        let enumerated = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&enumerated);
        let provider = builder()
            .enumeration_handler(Arc::new(move |items: &[Value]| {
                seen.fetch_add(items.len(), Ordering::SeqCst);
            }))
            .build_shared();
        let items = provider.query().to_list().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].field("Name"), Some(&Value::from("Ann")));
        assert_eq!(enumerated.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_defaults_are_empty() {
        let provider = builder().build();
        assert!(provider.parameters().is_empty());
        assert!(provider.expand.is_empty());
        assert!(provider.before.is_empty() && provider.after.is_empty());
    }

    #[test]
    fn test_provider_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MappingProvider>();
    }
}
