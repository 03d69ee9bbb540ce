//! Destination-to-source query translation.
//!
//! ```text
//! before hooks -> type map -> member rewrite -> captures -> null guard -> after hooks
//! ```
//!
//! Each stage is a pure `Expr -> Expr` step. Nothing is cached between calls, so
//! the same input and parameter bag always translate to the same output.

mod closure;
mod null_guard;
mod rewrite;

pub use closure::{ALTERNATE_CAPTURE_PREFIX, substitute_captures};
pub use null_guard::NullGuard;

use crate::ast::{Expr, Type, Value};
use crate::config::MapperConfig;
use crate::error::MapResult;
use crate::visit::{ExprTransform, fold_hooks};
use rewrite::MemberRewriter;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Per-call values that override captured ones, keyed by capture name.
pub type Parameters = BTreeMap<String, Value>;

/// Borrowed view of everything one translation needs.
pub struct Translator<'a> {
    pub config: &'a MapperConfig,
    /// Source-shaped expression that destination roots are rebased onto.
    pub source_root: &'a Expr,
    pub source_element: &'a Type,
    pub dest_element: &'a Type,
    pub before: &'a [Arc<dyn ExprTransform>],
    pub after: &'a [Arc<dyn ExprTransform>],
    pub parameters: &'a Parameters,
}

impl Translator<'_> {
    pub fn translate(&self, expr: Expr) -> MapResult<Expr> {
        let expr = fold_hooks(self.before, expr)?;

        let map = self
            .config
            .resolve_type_map(self.dest_element, self.source_element);
        if map.is_none() {
            tracing::debug!(
                "No type map from {} to {}; mapped members will fail to translate",
                self.source_element,
                self.dest_element
            );
        }

        let rewriter = MemberRewriter {
            config: self.config,
            map,
            source_root: self.source_root,
            source_element: self.source_element,
            dest_element: self.dest_element,
            parameters: self.parameters,
        };
        let mut expr = rewriter.rewrite(expr)?;

        if !self.parameters.is_empty() {
            expr = substitute_captures(expr, self.parameters)?;
        }
        if self.config.enable_null_propagation_for_query_mapping {
            expr = NullGuard.apply(expr)?;
        }

        let expr = fold_hooks(self.after, expr)?;
        tracing::trace!("Translated query: {}", expr);
        Ok(expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Lambda;
    use crate::config::{MemberSource, TypeMap};
    use crate::error::MapError;
    use pretty_assertions::assert_eq;

    fn config() -> MapperConfig {
        MapperConfig::new()
            .entity(
                "Employee",
                [
                    ("Id", Type::int()),
                    ("FullName", Type::string()),
                    ("Age", Type::int()),
                    ("Manager", Type::entity("Employee")),
                ],
            )
            .entity(
                "EmployeeDto",
                [("Id", Type::int()), ("Name", Type::string()), ("Age", Type::int())],
            )
            .map(
                TypeMap::new("Employee", "EmployeeDto")
                    .map_member("Name", MemberSource::member("FullName"))
                    .map_member("ManagerName", MemberSource::path("Manager.FullName").unwrap())
                    .map_member("Region", MemberSource::parameter("region", "EU")),
            )
    }

    fn dto() -> Type {
        Type::entity("EmployeeDto")
    }

    fn employee() -> Type {
        Type::entity("Employee")
    }

    fn translate_with(
        config: &MapperConfig,
        parameters: &Parameters,
        before: &[Arc<dyn ExprTransform>],
        after: &[Arc<dyn ExprTransform>],
        expr: Expr,
    ) -> MapResult<Expr> {
        let source_root = Expr::root(employee());
        Translator {
            config,
            source_root: &source_root,
            source_element: &employee(),
            dest_element: &dto(),
            before,
            after,
            parameters,
        }
        .translate(expr)
    }

    fn translate(expr: Expr) -> MapResult<Expr> {
        translate_with(&config(), &Parameters::new(), &[], &[], expr)
    }

    #[test]
    fn test_renamed_member_and_root() {
        let expr = Expr::root(dto())
            .filter(Lambda::with("d", dto(), |d| d.member("Name", Type::string()).eq(Expr::constant("Ann"))));
        let out = translate(expr).unwrap();
        assert_eq!(out.to_string(), "Root(Employee).Where(d => (d.FullName == \"Ann\"))");
        assert_eq!(out.ty(), Type::query(employee()));
    }

    #[test]
    fn test_reducer_result_type_follows_source() {
        let out = translate(Expr::root(dto()).first()).unwrap();
        assert_eq!(out.ty(), employee());
    }

    #[test]
    fn test_path_member_becomes_chain() {
        let expr = Expr::root(dto()).select(Lambda::with("d", dto(), |d| {
            d.member("ManagerName", Type::string())
        }));
        let out = translate(expr).unwrap();
        assert_eq!(out.to_string(), "Root(Employee).Select(d => d.Manager.FullName)");
        assert_eq!(out.ty(), Type::query(Type::string()));
    }

    #[test]
    fn test_parameter_member_reads_bag() {
        let expr = Expr::root(dto()).filter(Lambda::with("d", dto(), |d| {
            d.member("Region", Type::string()).eq(Expr::constant("US"))
        }));
        let bag = Parameters::from([("region".to_string(), Value::from("US"))]);
        let out = translate_with(&config(), &bag, &[], &[], expr.clone()).unwrap();
        assert_eq!(out.to_string(), "Root(Employee).Where(d => (\"US\" == \"US\"))");
        let out = translate(expr).unwrap();
        assert_eq!(out.to_string(), "Root(Employee).Where(d => (\"EU\" == \"US\"))");
    }

    #[test]
    fn test_unmapped_member_fails() {
        let expr = Expr::root(dto()).filter(Lambda::with("d", dto(), |d| {
            d.member("Salary", Type::int()).gt(Expr::constant(0))
        }));
        let err = translate(expr).unwrap_err();
        assert!(matches!(err, MapError::Translation(ref m) if m.contains("EmployeeDto.Salary")));
    }

    #[test]
    fn test_missing_type_map_fails_on_member() {
        let bare = MapperConfig::new();
        let expr = Expr::root(dto()).filter(Lambda::with("d", dto(), |d| {
            d.member("Age", Type::int()).gt(Expr::constant(18))
        }));
        let err = translate_with(&bare, &Parameters::new(), &[], &[], expr).unwrap_err();
        assert!(matches!(err, MapError::Translation(_)));

        // Without member reads there is nothing to dereference.
        assert!(translate_with(&bare, &Parameters::new(), &[], &[], Expr::root(dto()).count()).is_ok());
    }

    #[test]
    fn test_new_fields_are_renamed() {
        let expr = Expr::root(dto()).select(Lambda::with("d", dto(), |d| {
            Expr::new_object(dto(), vec![("Name", d.member("Name", Type::string()))])
        }));
        let out = translate(expr).unwrap();
        assert_eq!(
            out.to_string(),
            "Root(Employee).Select(d => new Employee { FullName = d.FullName, Id = null, Age = null, Manager = null })"
        );
    }

    #[test]
    fn test_misspelled_source_member_fails() {
        let config = config().map(
            TypeMap::new("Employee", "EmployeeDto").map_member("Name", MemberSource::member("Fullname")),
        );
        let expr = Expr::root(dto())
            .filter(Lambda::with("d", dto(), |d| d.member("Name", Type::string()).eq(Expr::constant("Ann"))));
        let err = translate_with(&config, &Parameters::new(), &[], &[], expr).unwrap_err();
        assert!(matches!(err, MapError::Translation(ref m) if m.contains("Employee.Fullname")));
    }

    #[test]
    fn test_unknown_owner_trusts_destination_type() {
        let config = MapperConfig::new()
            .map(TypeMap::new("Employee", "EmployeeDto").map_member("Name", MemberSource::member("FullName")));
        let expr = Expr::root(dto())
            .select(Lambda::with("d", dto(), |d| d.member("Name", Type::string())));
        let out = translate_with(&config, &Parameters::new(), &[], &[], expr).unwrap();
        assert_eq!(out.to_string(), "Root(Employee).Select(d => d.FullName)");
        assert_eq!(out.ty(), Type::query(Type::string()));
    }

    #[test]
    fn test_hooks_run_before_and_after() {
        let before: Vec<Arc<dyn ExprTransform>> =
            vec![Arc::new(|e: Expr| e.filter(Lambda::with("d", dto(), |d| d.member("Age", Type::int()).gt(Expr::constant(18)))))];
        let after: Vec<Arc<dyn ExprTransform>> = vec![Arc::new(|e: Expr| e.take(1))];
        let out = translate_with(&config(), &Parameters::new(), &before, &after, Expr::root(dto())).unwrap();
        assert_eq!(out.to_string(), "Root(Employee).Where(d => (d.Age > 18)).Take(1)");
    }

    #[test]
    fn test_null_guard_when_enabled() {
        let config = config().null_propagation(true);
        let expr = Expr::root(dto()).select(Lambda::with("d", dto(), |d| {
            d.member("ManagerName", Type::string())
        }));
        let out = translate_with(&config, &Parameters::new(), &[], &[], expr).unwrap();
        assert_eq!(
            out.to_string(),
            "Root(Employee).Select(d => ((d.Manager == null) ? null : d.Manager.FullName))"
        );
    }

    #[test]
    fn test_translation_is_stateless() {
        let expr = Expr::root(dto()).filter(Lambda::with("d", dto(), |d| {
            d.member("Age", Type::int()).gt(Expr::captured("Closure0", "threshold", 18))
        }));
        let bag = Parameters::from([("threshold".to_string(), Value::Int(25))]);
        let first = translate_with(&config(), &bag, &[], &[], expr.clone()).unwrap();
        let second = translate_with(&config(), &bag, &[], &[], expr).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.to_string(), "Root(Employee).Where(d => (d.Age > 25))");
    }
}
