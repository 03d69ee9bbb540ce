//! Type-mapping configuration.
//!
//! A [`MapperConfig`] records entity schemas and the [`TypeMap`]s between them.
//! Members not configured explicitly map by name when the source has a field of
//! the same name.
//!
//! Configurations can be built in code or loaded from TOML:
//!
//! ```toml
//! enable_null_propagation = false
//!
//! [[entities]]
//! name = "Employee"
//! fields = { Id = "int", FullName = "string", Age = "int" }
//!
//! [[maps]]
//! source = "Employee"
//! destination = "EmployeeDto"
//! members = { Name = "FullName" }
//! ```

mod file;
pub mod path;

pub use file::{Settings, default_config_path};
pub use path::MemberPath;

use crate::ast::{Lambda, Type, Value};
use crate::error::{MapError, MapResult};
use std::collections::HashMap;

/// Declared fields of an entity, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySchema {
    pub name: String,
    pub fields: Vec<(String, Type)>,
}

impl EntitySchema {
    pub fn field_type(&self, field: &str) -> Option<&Type> {
        self.fields.iter().find(|(n, _)| n == field).map(|(_, t)| t)
    }
}

/// Where a destination member takes its value from.
#[derive(Debug, Clone, PartialEq)]
pub enum MemberSource {
    /// A navigation chain on the source element.
    Path(MemberPath),
    /// A custom expression over the source element.
    Expr {
        lambda: Lambda,
        /// Evaluate once in a precomputation step before the final shape.
        precompute: bool,
    },
    /// A value supplied per call through the parameter bag.
    Parameter { name: String, default: Value },
    /// Never populated.
    Ignore,
}

impl MemberSource {
    pub fn member(name: &str) -> Self {
        MemberSource::Path(MemberPath::single(name))
    }

    pub fn path(text: &str) -> MapResult<Self> {
        MemberPath::parse(text).map(MemberSource::Path)
    }

    pub fn expr(lambda: Lambda) -> Self {
        MemberSource::Expr {
            lambda,
            precompute: false,
        }
    }

    pub fn parameter(name: &str, default: impl Into<Value>) -> Self {
        MemberSource::Parameter {
            name: name.to_string(),
            default: default.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberMap {
    pub destination: String,
    pub source: MemberSource,
    /// Only projected when a requested member path names it.
    pub explicit_expansion: bool,
}

/// Correspondence between a source entity and a destination entity.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeMap {
    pub source: String,
    pub destination: String,
    pub members: Vec<MemberMap>,
}

impl TypeMap {
    pub fn new(source: &str, destination: &str) -> Self {
        Self {
            source: source.to_string(),
            destination: destination.to_string(),
            members: Vec::new(),
        }
    }

    /// Configure a destination member. Later calls replace earlier ones.
    pub fn map_member(mut self, destination: &str, source: MemberSource) -> Self {
        self.members.retain(|m| m.destination != destination);
        self.members.push(MemberMap {
            destination: destination.to_string(),
            source,
            explicit_expansion: false,
        });
        self
    }

    /// Mark a configured (or conventional) member as explicit-expansion only.
    pub fn explicit(mut self, destination: &str) -> Self {
        match self.members.iter_mut().find(|m| m.destination == destination) {
            Some(m) => m.explicit_expansion = true,
            None => self.members.push(MemberMap {
                destination: destination.to_string(),
                source: MemberSource::member(destination),
                explicit_expansion: true,
            }),
        }
        self
    }

    pub fn source_type(&self) -> Type {
        Type::entity(self.source.clone())
    }

    pub fn destination_type(&self) -> Type {
        Type::entity(self.destination.clone())
    }
}

/// Schemas and type maps consulted during translation and mapping.
#[derive(Debug, Clone, Default)]
pub struct MapperConfig {
    schemas: HashMap<String, EntitySchema>,
    maps: Vec<TypeMap>,
    pub enable_null_propagation_for_query_mapping: bool,
}

impl MapperConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity schema.
    pub fn entity<I, S>(mut self, name: &str, fields: I) -> Self
    where
        I: IntoIterator<Item = (S, Type)>,
        S: Into<String>,
    {
        self.schemas.insert(
            name.to_string(),
            EntitySchema {
                name: name.to_string(),
                fields: fields.into_iter().map(|(n, t)| (n.into(), t)).collect(),
            },
        );
        self
    }

    /// Register a type map. A later map for the same pair replaces the earlier one.
    pub fn map(mut self, map: TypeMap) -> Self {
        self.maps
            .retain(|m| !(m.source == map.source && m.destination == map.destination));
        self.maps.push(map);
        self
    }

    pub fn null_propagation(mut self, enabled: bool) -> Self {
        self.enable_null_propagation_for_query_mapping = enabled;
        self
    }

    pub fn schema(&self, name: &str) -> Option<&EntitySchema> {
        self.schemas.get(name)
    }

    pub fn maps(&self) -> &[TypeMap] {
        &self.maps
    }

    /// Type map for (destination, source), if one is registered.
    pub fn resolve_type_map(&self, destination: &Type, source: &Type) -> Option<&TypeMap> {
        let (dest, src) = (destination.entity_name()?, source.entity_name()?);
        self.maps
            .iter()
            .find(|m| m.destination == dest && m.source == src)
    }

    /// The map whose destination is `destination`. First registered wins.
    pub fn find_by_destination(&self, destination: &str) -> Option<&TypeMap> {
        self.maps.iter().find(|m| m.destination == destination)
    }

    /// How `member` of the map's destination is populated: explicit
    /// configuration first, then a same-named source field.
    pub fn resolve_member(&self, map: &TypeMap, member: &str) -> Option<MemberMap> {
        if let Some(m) = map.members.iter().find(|m| m.destination == member) {
            return Some(m.clone());
        }
        self.schema(&map.source)?
            .field_type(member)
            .map(|_| MemberMap {
                destination: member.to_string(),
                source: MemberSource::member(member),
                explicit_expansion: false,
            })
    }

    /// Destination members of a map with their declared types.
    ///
    /// Falls back to the explicitly configured members when the destination
    /// has no registered schema.
    pub fn destination_members(&self, map: &TypeMap) -> Vec<(String, Type)> {
        match self.schema(&map.destination) {
            Some(schema) => schema.fields.clone(),
            None => map
                .members
                .iter()
                .map(|m| (m.destination.clone(), self.member_source_type(map, &m.source)))
                .collect(),
        }
    }

    /// Static type produced by a member source on the map's source entity.
    pub fn member_source_type(&self, map: &TypeMap, source: &MemberSource) -> Type {
        match source {
            MemberSource::Path(path) => self
                .path_type(&map.source_type(), path)
                .unwrap_or(Type::Unit),
            MemberSource::Expr { lambda, .. } => lambda.body.ty(),
            MemberSource::Parameter { default, .. } => default.runtime_type(),
            MemberSource::Ignore => Type::Unit,
        }
    }

    /// Type reached by following `path` from `root`.
    pub fn path_type(&self, root: &Type, path: &MemberPath) -> MapResult<Type> {
        path.segments().iter().try_fold(root.clone(), |ty, seg| {
            let owner = match &ty {
                Type::Entity(name) => name,
                other => {
                    return Err(MapError::Config(format!(
                        "cannot access '{}' on non-entity type {}",
                        seg, other
                    )));
                }
            };
            self.schema(owner)
                .and_then(|s| s.field_type(seg))
                .cloned()
                .ok_or_else(|| MapError::Config(format!("unknown member {}.{}", owner, seg)))
        })
    }

    /// Check that every destination member resolves to a source member that exists.
    pub fn validate(&self) -> Vec<MapError> {
        let mut errors = Vec::new();
        for map in &self.maps {
            if self.schema(&map.source).is_none() {
                errors.push(MapError::Config(format!("unknown source entity '{}'", map.source)));
                continue;
            }
            for (member, _) in self.destination_members(map) {
                match self.resolve_member(map, &member) {
                    None => errors.push(MapError::Config(format!(
                        "{}.{} has no source member on {}",
                        map.destination, member, map.source
                    ))),
                    Some(MemberMap {
                        source: MemberSource::Path(path),
                        ..
                    }) => {
                        if let Err(e) = self.path_type(&map.source_type(), &path) {
                            errors.push(e);
                        }
                    }
                    Some(_) => {}
                }
            }
        }
        errors
    }
}
