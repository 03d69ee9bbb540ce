//! TOML-backed configuration files.

use super::{MapperConfig, MemberSource, TypeMap};
use crate::ast::{Primitive, Type};
use crate::error::{MapError, MapResult};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    enable_null_propagation: bool,
    #[serde(default)]
    entities: Vec<RawEntity>,
    #[serde(default)]
    maps: Vec<RawMap>,
}

#[derive(Debug, Deserialize)]
struct RawEntity {
    name: String,
    /// field name -> type name, in declaration order
    #[serde(default)]
    fields: toml::Table,
}

#[derive(Debug, Deserialize)]
struct RawMap {
    source: String,
    destination: String,
    /// destination member -> dotted source path, in declaration order
    #[serde(default)]
    members: toml::Table,
    /// destination member -> parameter name
    #[serde(default)]
    parameters: BTreeMap<String, String>,
    #[serde(default)]
    explicit: Vec<String>,
    #[serde(default)]
    ignore: Vec<String>,
}

/// String entries of an inline table, keeping the order they were written in.
fn string_entries<'t>(table: &'t toml::Table, owner: &str) -> MapResult<Vec<(&'t str, &'t str)>> {
    table
        .iter()
        .map(|(key, value)| match value.as_str() {
            Some(text) => Ok((key.as_str(), text)),
            None => Err(MapError::Config(format!(
                "{}.{} must be a string, found {}",
                owner,
                key,
                value.type_str()
            ))),
        })
        .collect()
}

/// Parse a type name as written in configuration files.
///
/// `int`, `float`, `bool`, `string`, `timestamp`, `[Elem]` for lists, anything
/// else names an entity.
pub fn parse_type(text: &str) -> MapResult<Type> {
    let text = text.trim();
    if let Some(inner) = text.strip_prefix('[') {
        let inner = inner
            .strip_suffix(']')
            .ok_or_else(|| MapError::Config(format!("unterminated list type '{}'", text)))?;
        return Ok(Type::list(parse_type(inner)?));
    }
    Ok(match text {
        "" => return Err(MapError::Config("empty type name".to_string())),
        "bool" => Type::Primitive(Primitive::Bool),
        "int" => Type::Primitive(Primitive::Int),
        "float" => Type::Primitive(Primitive::Float),
        "string" => Type::Primitive(Primitive::String),
        "timestamp" => Type::Primitive(Primitive::Timestamp),
        name => Type::entity(name),
    })
}

impl MapperConfig {
    /// Parse a mapping configuration from TOML text.
    pub fn from_toml_str(text: &str) -> MapResult<Self> {
        let raw: RawConfig =
            toml::from_str(text).map_err(|e| MapError::Config(e.to_string()))?;

        let mut config = MapperConfig::new().null_propagation(raw.enable_null_propagation);
        for entity in raw.entities {
            let fields = string_entries(&entity.fields, &entity.name)?
                .into_iter()
                .map(|(name, ty)| parse_type(ty).map(|t| (name.to_string(), t)))
                .collect::<MapResult<Vec<_>>>()?;
            config = config.entity(&entity.name, fields);
        }
        for raw_map in raw.maps {
            let mut map = TypeMap::new(&raw_map.source, &raw_map.destination);
            for (dest, path) in string_entries(&raw_map.members, &raw_map.destination)? {
                map = map.map_member(dest, MemberSource::path(path)?);
            }
            for (dest, param) in &raw_map.parameters {
                map = map.map_member(dest, MemberSource::parameter(param, crate::ast::Value::Null));
            }
            for dest in &raw_map.ignore {
                map = map.map_member(dest, MemberSource::Ignore);
            }
            for dest in &raw_map.explicit {
                map = map.explicit(dest);
            }
            config = config.map(map);
        }
        Ok(config)
    }

    /// Load a mapping configuration file.
    pub fn load(path: impl AsRef<Path>) -> MapResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }
}

/// Default location of the mapping file: `<config dir>/qmap/maps.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("qmap").join("maps.toml"))
}

/// CLI settings, read from `<config dir>/qmap/settings.toml` when present.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    /// Mapping configuration file.
    pub config: Option<PathBuf>,
    /// `tracing` filter directive, e.g. `qmap=debug`.
    pub log: Option<String>,
}

impl Settings {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("qmap").join("settings.toml"))
    }

    /// Load settings from `path`, or defaults when the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> MapResult<Self> {
        match path {
            Some(p) if p.exists() => {
                let text = std::fs::read_to_string(p)?;
                toml::from_str(&text).map_err(|e| MapError::Config(e.to_string()))
            }
            _ => Ok(Self::default()),
        }
    }

    /// Mapping file to use: explicit setting, else the default location.
    pub fn config_path(&self) -> Option<PathBuf> {
        self.config.clone().or_else(default_config_path)
    }
}
