//! Member and type rewrite from destination shape to source shape.

use super::Parameters;
use crate::ast::{Expr, Lambda, Param, Type};
use crate::config::{MapperConfig, MemberPath, MemberSource, TypeMap};
use crate::error::{MapError, MapResult};
use crate::visit::{inline_lambda, rewrite_bottom_up};

pub(crate) struct MemberRewriter<'a> {
    pub config: &'a MapperConfig,
    /// Map for the query's own element pair. `None` when unconfigured.
    pub map: Option<&'a TypeMap>,
    pub source_root: &'a Expr,
    pub source_element: &'a Type,
    pub dest_element: &'a Type,
    pub parameters: &'a Parameters,
}

impl<'a> MemberRewriter<'a> {
    pub fn rewrite(&self, expr: Expr) -> MapResult<Expr> {
        rewrite_bottom_up(expr, &mut |node| self.rewrite_node(node))
    }

    fn is_query_element(&self, name: &str) -> bool {
        self.dest_element.entity_name() == Some(name)
    }

    /// Entity names that are the destination side of some map.
    fn is_destination(&self, name: &str) -> bool {
        self.is_query_element(name) || self.config.find_by_destination(name).is_some()
    }

    fn map_for(&self, name: &str) -> Option<&'a TypeMap> {
        if self.is_query_element(name) {
            self.map
        } else {
            self.config.find_by_destination(name)
        }
    }

    fn rewrite_type(&self, ty: &Type) -> Type {
        match ty {
            Type::Entity(name) if self.is_query_element(name) => self.source_element.clone(),
            Type::Entity(name) => self
                .config
                .find_by_destination(name)
                .map(TypeMap::source_type)
                .unwrap_or_else(|| ty.clone()),
            Type::Query(inner) => Type::query(self.rewrite_type(inner)),
            Type::List(inner) => Type::list(self.rewrite_type(inner)),
            other => other.clone(),
        }
    }

    fn rewrite_node(&self, node: Expr) -> MapResult<Expr> {
        Ok(match node {
            Expr::Root { element } if &element == self.dest_element => self.source_root.clone(),
            Expr::Root { element } => Expr::Root {
                element: self.rewrite_type(&element),
            },
            Expr::Constant { value, ty } => Expr::Constant {
                value,
                ty: self.rewrite_type(&ty),
            },
            Expr::Param { name, ty } => Expr::Param {
                ty: self.rewrite_type(&ty),
                name,
            },
            Expr::Member {
                target: Some(target),
                name,
                owner,
                ty,
            } => match owner.entity_name().filter(|n| self.is_destination(n)) {
                Some(owner_name) => self.rewrite_member(*target, &name, owner_name, &ty)?,
                None => Expr::Member {
                    target: Some(target),
                    name,
                    owner: self.rewrite_type(&owner),
                    ty: self.rewrite_type(&ty),
                },
            },
            Expr::Member {
                target: None,
                name,
                owner,
                ty,
            } => Expr::Member {
                target: None,
                name,
                owner: self.rewrite_type(&owner),
                ty: self.rewrite_type(&ty),
            },
            Expr::Convert { operand, ty } => Expr::Convert {
                operand,
                ty: self.rewrite_type(&ty),
            },
            Expr::Lambda(Lambda { params, body }) => Expr::Lambda(Lambda {
                params: params
                    .into_iter()
                    .map(|p| Param {
                        ty: self.rewrite_type(&p.ty),
                        name: p.name,
                    })
                    .collect(),
                body,
            }),
            Expr::New { ty, fields } => self.rewrite_new(ty, fields)?,
            Expr::Call { op, args, ty } => {
                let ty = match args.split_first() {
                    Some((source, extra)) => op.result_type(&source.ty(), extra),
                    None => self.rewrite_type(&ty),
                };
                Expr::Call { op, args, ty }
            }
            Expr::Invoke { function, args, ty } => Expr::Invoke {
                function,
                args,
                ty: self.rewrite_type(&ty),
            },
            other @ (Expr::Unary { .. } | Expr::Binary { .. } | Expr::Conditional { .. }) => other,
        })
    }

    fn rewrite_member(
        &self,
        target: Expr,
        name: &str,
        owner: &str,
        ty: &Type,
    ) -> MapResult<Expr> {
        let map = self.map_for(owner).ok_or_else(|| {
            MapError::Translation(format!(
                "no type map from {} to {}",
                self.source_element, owner
            ))
        })?;
        let member = self.config.resolve_member(map, name).ok_or_else(|| {
            MapError::Translation(format!(
                "{}.{} has no counterpart on {}",
                owner, name, map.source
            ))
        })?;
        match member.source {
            MemberSource::Path(path) => self.member_chain(target, &path, ty),
            MemberSource::Expr { lambda, .. } => Ok(inline_lambda(&lambda, &target)),
            MemberSource::Parameter { name: param, default } => {
                let ty = self.rewrite_type(ty);
                let value = self.parameters.get(&param).unwrap_or(&default);
                Ok(Expr::typed_constant(value.coerce_to(&ty)?, ty))
            }
            MemberSource::Ignore => Err(MapError::Translation(format!(
                "{}.{} is ignored by the {} map",
                owner, name, map.source
            ))),
        }
    }

    /// `target.a.b.c` for path `a.b.c`, typed from the source schemas.
    fn member_chain(&self, target: Expr, path: &MemberPath, dest_ty: &Type) -> MapResult<Expr> {
        let last = path.len() - 1;
        let mut current = target;
        for (i, segment) in path.segments().iter().enumerate() {
            let owner = current.ty();
            let ty = match self.config.path_type(&owner, &MemberPath::single(segment)) {
                Ok(ty) => ty,
                // Without a source schema, trust the destination member's type.
                Err(_) if i == last && self.unschematized(&owner) => self.rewrite_type(dest_ty),
                Err(e) => return Err(MapError::Translation(e.to_string())),
            };
            current = current.member(segment, ty);
        }
        Ok(current)
    }

    fn unschematized(&self, owner: &Type) -> bool {
        owner
            .entity_name()
            .is_none_or(|name| self.config.schema(name).is_none())
    }

    /// `new Dest { a = x }` becomes `new Source { a' = x }` for renamed members.
    /// Source fields the initializer leaves out are set to `null`.
    fn rewrite_new(&self, ty: Type, fields: Vec<(String, Expr)>) -> MapResult<Expr> {
        let Some(map) = ty.entity_name().and_then(|n| self.map_for(n)) else {
            return Ok(Expr::New {
                ty: self.rewrite_type(&ty),
                fields,
            });
        };
        let mut fields = fields
            .into_iter()
            .map(|(name, value)| match self.config.resolve_member(map, &name) {
                Some(member) => match member.source {
                    MemberSource::Path(path) if path.len() == 1 => {
                        Ok((path.first().to_string(), value))
                    }
                    _ => Err(MapError::Translation(format!(
                        "{}.{} is not a plain member of {}",
                        map.destination, name, map.source
                    ))),
                },
                None => Err(MapError::Translation(format!(
                    "{}.{} has no counterpart on {}",
                    map.destination, name, map.source
                ))),
            })
            .collect::<MapResult<Vec<_>>>()?;
        if let Some(schema) = self.config.schema(&map.source) {
            for (name, field_ty) in &schema.fields {
                if !fields.iter().any(|(n, _)| n == name) {
                    fields.push((name.clone(), Expr::null(field_ty.clone())));
                }
            }
        }
        Ok(Expr::New {
            ty: map.source_type(),
            fields,
        })
    }
}
