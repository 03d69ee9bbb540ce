//! Value-level object mapping.
//!
//! Used for scalar and single-entity results. Sequences are never mapped here
//! when a lazy projection is possible.

use crate::ast::{Expr, Type, Value};
use crate::config::{MapperConfig, MemberSource, TypeMap};
use crate::engine::{InMemoryProvider, QueryProvider};
use crate::error::{MapError, MapResult};
use crate::visit::inline_lambda;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Maps a materialized value from a source type to a destination type.
pub trait ObjectMapper: Send + Sync {
    fn map(&self, value: Value, source: &Type, destination: &Type) -> MapResult<Value>;
}

/// Copies records member by member following a [`MapperConfig`].
#[derive(Debug, Clone)]
pub struct ConfigMapper {
    config: Arc<MapperConfig>,
}

impl ConfigMapper {
    pub fn new(config: Arc<MapperConfig>) -> Self {
        Self { config }
    }

    fn map_record(
        &self,
        map: &TypeMap,
        fields: &BTreeMap<String, Value>,
        record: &Value,
    ) -> MapResult<Value> {
        let mut out = BTreeMap::new();
        for (name, ty) in self.config.destination_members(map) {
            let member = self.config.resolve_member(map, &name).ok_or_else(|| {
                MapError::Mapping(format!(
                    "{}.{} has no source member on {}",
                    map.destination, name, map.source
                ))
            })?;
            if member.explicit_expansion {
                out.insert(name, Value::Null);
                continue;
            }
            let (value, source_ty) = match &member.source {
                MemberSource::Path(path) => {
                    let mut current = Value::Record {
                        type_name: map.source.clone(),
                        fields: fields.clone(),
                    };
                    for seg in path.segments() {
                        current = match current {
                            Value::Null => Value::Null,
                            Value::Record { fields, .. } => {
                                fields.get(seg).cloned().unwrap_or(Value::Null)
                            }
                            other => {
                                return Err(MapError::Mapping(format!(
                                    "cannot read '{}' on {}",
                                    seg,
                                    other.runtime_type()
                                )));
                            }
                        };
                    }
                    let source_ty = self.config.member_source_type(map, &member.source);
                    (current, source_ty)
                }
                MemberSource::Expr { lambda, .. } => {
                    let expr = inline_lambda(
                        lambda,
                        &Expr::typed_constant(record.clone(), map.source_type()),
                    );
                    let value = InMemoryProvider::new()
                        .execute(&expr)
                        .map_err(|e| MapError::Mapping(format!("{}.{}: {}", map.destination, name, e)))?;
                    (value, lambda.body.ty())
                }
                MemberSource::Parameter { default, .. } => (default.clone(), default.runtime_type()),
                MemberSource::Ignore => (Value::Null, Type::Unit),
            };
            let mapped = self.map(value, &source_ty, &ty)?;
            out.insert(name, mapped);
        }
        Ok(Value::Record {
            type_name: map.destination.clone(),
            fields: out,
        })
    }
}

impl ObjectMapper for ConfigMapper {
    fn map(&self, value: Value, source: &Type, destination: &Type) -> MapResult<Value> {
        if value.is_null() || source == destination || *destination == Type::Unit {
            return Ok(value);
        }
        match (value, destination) {
            (v, Type::Primitive(p)) => {
                let converted = v.convert_to(*p);
                converted.ok_or_else(|| {
                    MapError::Mapping(format!("cannot map {} to {}", v.runtime_type(), destination))
                })
            }
            (Value::List(items), Type::List(dest_elem) | Type::Query(dest_elem)) => {
                let src_elem = source.element_type().cloned().unwrap_or(Type::Unit);
                items
                    .into_iter()
                    .map(|item| {
                        let item_ty = match &src_elem {
                            Type::Unit => item.runtime_type(),
                            t => t.clone(),
                        };
                        self.map(item, &item_ty, dest_elem)
                    })
                    .collect::<MapResult<Vec<_>>>()
                    .map(Value::List)
            }
            (record @ Value::Record { .. }, Type::Entity(dest)) => {
                let Value::Record { type_name, fields } = &record else {
                    return Err(MapError::Mapping("expected a record".to_string()));
                };
                if type_name == dest {
                    return Ok(record);
                }
                let map = self
                    .config
                    .resolve_type_map(destination, &Type::entity(type_name.clone()))
                    .or_else(|| self.config.resolve_type_map(destination, source))
                    .ok_or_else(|| {
                        MapError::Mapping(format!("no type map from {} to {}", type_name, dest))
                    })?;
                self.map_record(map, fields, &record)
            }
            (v, _) => Err(MapError::Mapping(format!(
                "cannot map {} to {}",
                v.runtime_type(),
                destination
            ))),
        }
    }
}
