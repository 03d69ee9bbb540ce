//! Projections from source elements to destination elements.
//!
//! A [`ProjectionDescriptor`] holds up to two lambdas. The precomputation, when
//! present, evaluates expensive member expressions once into an intermediate
//! record. The final shape builds the destination object.

use crate::ast::{Expr, Lambda, Param, Type};
use crate::config::{MapperConfig, MemberMap, MemberPath, MemberSource, TypeMap};
use crate::error::{MapError, MapResult};
use crate::operators::SeqOp;
use crate::translate::{NullGuard, Parameters};
use crate::visit::{ExprTransform, inline_lambda};
use std::sync::Arc;

/// Field of the precomputed record that carries the original source element.
pub const PRECOMPUTED_SOURCE: &str = "Source";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectionDescriptor {
    pub precomputation: Option<Lambda>,
    pub final_shape: Option<Lambda>,
}

impl ProjectionDescriptor {
    pub fn is_identity(&self) -> bool {
        self.precomputation.is_none() && self.final_shape.is_none()
    }
}

impl std::fmt::Display for ProjectionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.precomputation, &self.final_shape) {
            (None, None) => write!(f, "(identity)"),
            (Some(pre), None) => write!(f, "Select({})", pre),
            (None, Some(shape)) => write!(f, "Select({})", shape),
            (Some(pre), Some(shape)) => write!(f, "Select({}).Select({})", pre, shape),
        }
    }
}

/// Builds projection lambdas for a (source, destination) pair.
pub trait ProjectionBuilder: Send + Sync {
    fn get_projection(
        &self,
        source: &Type,
        destination: &Type,
        parameters: &Parameters,
        paths: &[MemberPath],
    ) -> MapResult<ProjectionDescriptor>;
}

/// Layer the descriptor's lambdas onto `expr` as reshape calls, precomputation first.
pub fn compose(expr: Expr, descriptor: &ProjectionDescriptor) -> Expr {
    [&descriptor.precomputation, &descriptor.final_shape]
        .into_iter()
        .flatten()
        .fold(expr, |acc, lambda| acc.call(SeqOp::RESHAPE, vec![lambda.clone().into()]))
}

/// Derives projections from a [`MapperConfig`].
#[derive(Debug, Clone)]
pub struct ConfigProjectionBuilder {
    config: Arc<MapperConfig>,
}

impl ConfigProjectionBuilder {
    pub fn new(config: Arc<MapperConfig>) -> Self {
        Self { config }
    }

    fn map_for(&self, source: &Type, destination: &Type) -> MapResult<&TypeMap> {
        self.config
            .resolve_type_map(destination, source)
            .ok_or_else(|| {
                MapError::Mapping(format!("no type map from {} to {}", source, destination))
            })
    }

    /// `new Dest { .. }` over `input`, recursing into nested maps.
    fn build_object(
        &self,
        map: &TypeMap,
        input: Expr,
        ctx: &Context<'_>,
        precomputed: &[&MemberMap],
        stack: &mut Vec<(String, String)>,
    ) -> MapResult<Expr> {
        let members = self.config.destination_members(map);
        let mut fields = Vec::with_capacity(members.len());
        stack.push((map.source.clone(), map.destination.clone()));

        for (name, ty) in members {
            let member = self.config.resolve_member(map, &name).ok_or_else(|| {
                MapError::Mapping(format!(
                    "{}.{} has no source member on {}",
                    map.destination, name, map.source
                ))
            })?;
            let value = if member.explicit_expansion && !ctx.requested(&name) {
                Expr::null(ty)
            } else if precomputed.iter().any(|m| m.destination == name) {
                // Precomputed members live next to the source on the intermediate record.
                ctx.precomputed_field(&name, ty)
            } else {
                let inner = ctx.descend(&name);
                self.build_member(&member.source, input.clone(), ty, &inner, stack)?
            };
            fields.push((name, value));
        }

        stack.pop();
        Ok(Expr::New {
            ty: map.destination_type(),
            fields,
        })
    }

    fn build_member(
        &self,
        source: &MemberSource,
        input: Expr,
        ty: Type,
        ctx: &Context<'_>,
        stack: &mut Vec<(String, String)>,
    ) -> MapResult<Expr> {
        let value = match source {
            MemberSource::Path(path) => {
                let chain = path.segments().iter().try_fold(input, |acc, seg| {
                    let owner = acc.ty();
                    self.config
                        .path_type(&owner, &MemberPath::single(seg))
                        .map(|seg_ty| acc.member(seg, seg_ty))
                        .map_err(|e| MapError::Mapping(e.to_string()))
                })?;
                if self.config.enable_null_propagation_for_query_mapping {
                    NullGuard.apply(chain)?
                } else {
                    chain
                }
            }
            MemberSource::Expr { lambda, .. } => inline_lambda(lambda, &input),
            MemberSource::Parameter { name, default } => {
                let value = ctx.parameters.get(name).unwrap_or(default);
                return Ok(Expr::typed_constant(value.coerce_to(&ty)?, ty));
            }
            MemberSource::Ignore => return Ok(Expr::null(ty)),
        };
        self.adapt(value, ty, ctx, stack)
    }

    /// Bridge a source-typed value to the destination member type.
    fn adapt(
        &self,
        value: Expr,
        ty: Type,
        ctx: &Context<'_>,
        stack: &mut Vec<(String, String)>,
    ) -> MapResult<Expr> {
        let from = value.ty();
        if from == ty {
            return Ok(value);
        }
        match (&from, &ty) {
            (Type::Primitive(_), Type::Primitive(_)) => Ok(value.convert(ty.clone())),
            (Type::Entity(_), Type::Entity(_)) => {
                let Ok(map) = self.map_for(&from, &ty) else {
                    return Ok(value);
                };
                if stack.contains(&(map.source.clone(), map.destination.clone())) {
                    return Ok(Expr::null(ty.clone()));
                }
                self.build_object(map, value, ctx, &[], stack)
            }
            (from_list, to_list) if from_list.is_enumerable() && to_list.is_enumerable() => {
                match (from_list.element_type(), to_list.element_type()) {
                    (Some(s @ Type::Entity(_)), Some(d @ Type::Entity(_))) if s != d => {
                        let Ok(map) = self.map_for(s, d) else {
                            return Ok(value);
                        };
                        if stack.contains(&(map.source.clone(), map.destination.clone())) {
                            return Ok(Expr::null(ty.clone()));
                        }
                        let param = format!("x{}", stack.len());
                        let item = Expr::param(&param, s.clone());
                        let body = self.build_object(map, item, ctx, &[], stack)?;
                        let selector = Lambda::new(
                            vec![Param {
                                name: param,
                                ty: s.clone(),
                            }],
                            body,
                        );
                        Ok(value.select(selector))
                    }
                    _ => Ok(value),
                }
            }
            _ => Ok(value),
        }
    }
}

/// Per-member view of the requested expansion paths and the parameter bag.
struct Context<'a> {
    parameters: &'a Parameters,
    paths: Vec<MemberPath>,
    /// Parameter of the final shape when a precomputation step exists.
    precomputed: Option<Expr>,
}

impl Context<'_> {
    fn requested(&self, member: &str) -> bool {
        self.paths.iter().any(|p| p.first() == member)
    }

    fn descend(&self, member: &str) -> Context<'_> {
        Context {
            parameters: self.parameters,
            paths: self
                .paths
                .iter()
                .filter(|p| p.first() == member)
                .filter_map(MemberPath::tail)
                .collect(),
            precomputed: None,
        }
    }

    fn precomputed_field(&self, name: &str, ty: Type) -> Expr {
        match &self.precomputed {
            Some(record) => record.clone().member(name, ty),
            None => Expr::null(ty),
        }
    }
}

impl ProjectionBuilder for ConfigProjectionBuilder {
    fn get_projection(
        &self,
        source: &Type,
        destination: &Type,
        parameters: &Parameters,
        paths: &[MemberPath],
    ) -> MapResult<ProjectionDescriptor> {
        if source == destination {
            return Ok(ProjectionDescriptor::default());
        }
        if source.is_primitive() && destination.is_primitive() {
            let shape = Lambda::with("s", source.clone(), |s| s.convert(destination.clone()));
            return Ok(ProjectionDescriptor {
                precomputation: None,
                final_shape: Some(shape),
            });
        }

        let map = self.map_for(source, destination)?;
        let mut stack = Vec::new();
        let precomputed: Vec<&MemberMap> = map
            .members
            .iter()
            .filter(|m| matches!(m.source, MemberSource::Expr { precompute: true, .. }))
            .collect();

        if precomputed.is_empty() {
            let ctx = Context {
                parameters,
                paths: paths.to_vec(),
                precomputed: None,
            };
            let input = Expr::param("s", source.clone());
            let body = self.build_object(map, input, &ctx, &[], &mut stack)?;
            return Ok(ProjectionDescriptor {
                precomputation: None,
                final_shape: Some(Lambda::new(
                    vec![Param {
                        name: "s".to_string(),
                        ty: source.clone(),
                    }],
                    body,
                )),
            });
        }

        // s => new DestLet { Source = s, m = expr(s), .. }
        let let_ty = Type::entity(format!("{}Let", map.destination));
        let s = Expr::param("s", source.clone());
        let mut let_fields = vec![(PRECOMPUTED_SOURCE.to_string(), s.clone())];
        for member in &precomputed {
            if let MemberSource::Expr { lambda, .. } = &member.source {
                let_fields.push((member.destination.clone(), inline_lambda(lambda, &s)));
            }
        }
        let precomputation = Lambda::new(
            vec![Param {
                name: "s".to_string(),
                ty: source.clone(),
            }],
            Expr::New {
                ty: let_ty.clone(),
                fields: let_fields,
            },
        );

        // p => new Dest { a = p.Source.a, m = p.m, .. }
        let p = Expr::param("p", let_ty.clone());
        let ctx = Context {
            parameters,
            paths: paths.to_vec(),
            precomputed: Some(p.clone()),
        };
        let input = p.member(PRECOMPUTED_SOURCE, source.clone());
        let body = self.build_object(map, input, &ctx, &precomputed, &mut stack)?;
        let final_shape = Lambda::new(
            vec![Param {
                name: "p".to_string(),
                ty: let_ty,
            }],
            body,
        );

        Ok(ProjectionDescriptor {
            precomputation: Some(precomputation),
            final_shape: Some(final_shape),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Value;
    use pretty_assertions::assert_eq;

    fn employee() -> Type {
        Type::entity("Employee")
    }

    fn dto() -> Type {
        Type::entity("EmployeeDto")
    }

    fn config(map: TypeMap) -> Arc<MapperConfig> {
        Arc::new(
            MapperConfig::new()
                .entity(
                    "Employee",
                    [
                        ("Id", Type::int()),
                        ("FullName", Type::string()),
                        ("Age", Type::int()),
                        ("Manager", employee()),
                    ],
                )
                .entity(
                    "EmployeeDto",
                    [("Id", Type::int()), ("Name", Type::string()), ("Age", Type::int())],
                )
                .map(map),
        )
    }

    fn basic_map() -> TypeMap {
        TypeMap::new("Employee", "EmployeeDto").map_member("Name", MemberSource::member("FullName"))
    }

    #[test]
    fn test_final_shape_from_map() {
        let builder = ConfigProjectionBuilder::new(config(basic_map()));
        let d = builder
            .get_projection(&employee(), &dto(), &Parameters::new(), &[])
            .unwrap();
        assert!(d.precomputation.is_none());
        assert_eq!(
            d.final_shape.unwrap().to_string(),
            "s => new EmployeeDto { Id = s.Id, Name = s.FullName, Age = s.Age }"
        );
    }

    #[test]
    fn test_same_type_is_identity() {
        let builder = ConfigProjectionBuilder::new(config(basic_map()));
        let d = builder
            .get_projection(&employee(), &employee(), &Parameters::new(), &[])
            .unwrap();
        assert!(d.is_identity());
        assert_eq!(compose(Expr::root(employee()), &d), Expr::root(employee()));
    }

    #[test]
    fn test_missing_map_is_mapping_error() {
        let builder = ConfigProjectionBuilder::new(config(basic_map()));
        let err = builder
            .get_projection(&dto(), &employee(), &Parameters::new(), &[])
            .unwrap_err();
        assert!(matches!(err, MapError::Mapping(_)));
    }

    #[test]
    fn test_parameter_member_uses_bag() {
        let map = basic_map().map_member("Age", MemberSource::parameter("age", 0));
        let builder = ConfigProjectionBuilder::new(config(map));
        let bag = Parameters::from([("age".to_string(), Value::Int(40))]);
        let shape = builder
            .get_projection(&employee(), &dto(), &bag, &[])
            .unwrap()
            .final_shape
            .unwrap();
        assert!(shape.to_string().contains("Age = 40"));
    }

    #[test]
    fn test_explicit_expansion_needs_path() {
        let map = basic_map().explicit("Name");
        let builder = ConfigProjectionBuilder::new(config(map));
        let plain = builder
            .get_projection(&employee(), &dto(), &Parameters::new(), &[])
            .unwrap();
        assert!(plain.final_shape.unwrap().to_string().contains("Name = null"));

        let expanded = builder
            .get_projection(&employee(), &dto(), &Parameters::new(), &[MemberPath::single("Name")])
            .unwrap();
        assert!(expanded.final_shape.unwrap().to_string().contains("Name = s.FullName"));
    }

    #[test]
    fn test_precomputation_comes_first() {
        let label = Lambda::with("e", employee(), |e| {
            Expr::invoke("label", vec![e.member("FullName", Type::string())], Type::string())
        });
        let map = basic_map().map_member(
            "Name",
            MemberSource::Expr {
                lambda: label,
                precompute: true,
            },
        );
        let builder = ConfigProjectionBuilder::new(config(map));
        let d = builder
            .get_projection(&employee(), &dto(), &Parameters::new(), &[])
            .unwrap();
        assert_eq!(
            compose(Expr::root(employee()), &d).to_string(),
            "Root(Employee)\
             .Select(s => new EmployeeDtoLet { Source = s, Name = label(s.FullName) })\
             .Select(p => new EmployeeDto { Id = p.Source.Id, Name = p.Name, Age = p.Source.Age })"
        );
    }

    #[test]
    fn test_compose_order() {
        let pre = Lambda::with("s", employee(), |s| s.member("Age", Type::int()));
        let shape = Lambda::with("a", Type::int(), |a| a.add(Expr::constant(1)));
        let d = ProjectionDescriptor {
            precomputation: Some(pre),
            final_shape: Some(shape),
        };
        assert_eq!(
            compose(Expr::root(employee()), &d).to_string(),
            "Root(Employee).Select(s => s.Age).Select(a => (a + 1))"
        );
    }
}
