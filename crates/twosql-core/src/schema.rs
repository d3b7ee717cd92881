//! Parameter schema and logical type system
//!
//! Declared parameters, constants, and named object types form the scope
//! against which directive expressions are validated. The type registry is
//! constructed once per run and passed by reference into every evaluation -
//! it is never a process-wide singleton.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Logical parameter type
///
/// Maps template parameter declarations to a common representation used for
/// dummy-value synthesis, inference, and literal rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ParamType {
    /// Boolean type
    Bool,

    /// Integer type (any precision)
    Int,

    /// Floating point (any precision)
    Float,

    /// String/text type
    String,

    /// Timestamp (date + time)
    Timestamp,

    /// Array type
    Array {
        element: Box<ParamType>,
    },

    /// Structured type with named fields
    Object {
        fields: Vec<FieldDecl>,
    },

    /// Reference to a named type in the registry
    Named {
        name: String,
    },

    /// Unknown type (cannot infer)
    Unknown,
}

/// A named field of an object type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    /// Field name
    pub name: String,

    /// Field type
    pub ty: ParamType,
}

impl FieldDecl {
    /// Create a new field declaration
    pub fn new(name: impl Into<String>, ty: ParamType) -> Self {
        Self { name: name.into(), ty }
    }
}

impl std::fmt::Display for ParamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool => write!(f, "BOOL"),
            Self::Int => write!(f, "INT"),
            Self::Float => write!(f, "FLOAT"),
            Self::String => write!(f, "STRING"),
            Self::Timestamp => write!(f, "TIMESTAMP"),
            Self::Array { .. } => write!(f, "ARRAY"),
            Self::Object { .. } => write!(f, "OBJECT"),
            Self::Named { name } => write!(f, "{}", name),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl ParamType {
    /// Create an array type
    pub fn array(element: ParamType) -> Self {
        Self::Array { element: Box::new(element) }
    }

    /// Create an object type from fields
    pub fn object(fields: Vec<FieldDecl>) -> Self {
        Self::Object { fields }
    }

    /// Create a named type reference
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named { name: name.into() }
    }

    /// Follow named references through the registry
    ///
    /// An unregistered name resolves to itself so callers can still report
    /// the declared name.
    pub fn resolve<'a>(&'a self, registry: &'a TypeRegistry) -> &'a ParamType {
        match self {
            Self::Named { name } => registry.get(name).unwrap_or(self),
            other => other,
        }
    }

    /// Synthesize a dummy value of this type
    ///
    /// Validation runs ahead of time, so declared parameters that have no
    /// bound value are evaluated against synthesized stand-ins. Arrays get
    /// exactly one element so element types stay inferable.
    pub fn dummy_value(&self, registry: &TypeRegistry) -> serde_json::Value {
        match self {
            Self::Bool => serde_json::Value::Bool(false),
            Self::Int => serde_json::json!(0),
            Self::Float => serde_json::json!(0.0),
            Self::String => serde_json::Value::String(String::new()),
            Self::Timestamp => serde_json::Value::String("1970-01-01T00:00:00Z".to_string()),
            Self::Array { element } => {
                serde_json::Value::Array(vec![element.dummy_value(registry)])
            }
            Self::Object { fields } => {
                let mut map = serde_json::Map::new();
                for field in fields {
                    map.insert(field.name.clone(), field.ty.dummy_value(registry));
                }
                serde_json::Value::Object(map)
            }
            Self::Named { name } => match registry.get(name) {
                Some(ty) => ty.dummy_value(registry),
                None => serde_json::Value::Null,
            },
            Self::Unknown => serde_json::Value::Null,
        }
    }

    /// Infer a logical type from a JSON value
    pub fn of_value(value: &serde_json::Value) -> ParamType {
        match value {
            serde_json::Value::Null => Self::Unknown,
            serde_json::Value::Bool(_) => Self::Bool,
            serde_json::Value::Number(n) => {
                if n.is_i64() || n.is_u64() {
                    Self::Int
                } else {
                    Self::Float
                }
            }
            serde_json::Value::String(_) => Self::String,
            serde_json::Value::Array(items) => {
                let element = items.first().map(Self::of_value).unwrap_or(Self::Unknown);
                Self::array(element)
            }
            serde_json::Value::Object(map) => {
                let fields = map
                    .iter()
                    .map(|(name, v)| FieldDecl::new(name.clone(), Self::of_value(v)))
                    .collect();
                Self::Object { fields }
            }
        }
    }
}

/// Registry of named object types, built once per generation run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeRegistry {
    types: HashMap<String, ParamType>,
}

impl TypeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self { types: HashMap::new() }
    }

    /// Register a named type
    pub fn register(&mut self, name: impl Into<String>, ty: ParamType) {
        self.types.insert(name.into(), ty);
    }

    /// Look up a named type
    pub fn get(&self, name: &str) -> Option<&ParamType> {
        self.types.get(name)
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// A declared parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDecl {
    /// Parameter name
    pub name: String,

    /// Declared type
    pub ty: ParamType,
}

impl ParamDecl {
    /// Create a new parameter declaration
    pub fn new(name: impl Into<String>, ty: ParamType) -> Self {
        Self { name: name.into(), ty }
    }
}

/// Ordered declaration of template parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamSchema {
    /// Parameters in declaration order
    pub params: Vec<ParamDecl>,
}

impl ParamSchema {
    /// Create an empty schema
    pub fn new() -> Self {
        Self { params: Vec::new() }
    }

    /// Declare a parameter (builder style)
    pub fn declare(mut self, name: impl Into<String>, ty: ParamType) -> Self {
        self.params.push(ParamDecl::new(name, ty));
        self
    }

    /// Look up a declared parameter type
    pub fn get(&self, name: &str) -> Option<&ParamType> {
        self.params.iter().find(|p| p.name == name).map(|p| &p.ty)
    }

    /// Declared parameter names
    pub fn names(&self) -> Vec<&str> {
        self.params.iter().map(|p| p.name.as_str()).collect()
    }
}

/// On-disk schema file (`twosql-params.json`)
///
/// Bundles the parameter declarations, the constants map, and the named
/// type definitions a project ships with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaFile {
    /// Declared parameters
    #[serde(default)]
    pub params: Vec<ParamDecl>,

    /// Constants available to `/*$ ... */` directives
    #[serde(default)]
    pub constants: serde_json::Map<String, serde_json::Value>,

    /// Named object types
    #[serde(default)]
    pub types: HashMap<String, ParamType>,
}

impl SchemaFile {
    /// Parse from a JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Load from a JSON file
    pub fn from_file(path: &std::path::Path) -> Result<Self, SchemaFileError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(Self::from_json(&contents)?)
    }

    /// Parameter schema view
    pub fn schema(&self) -> ParamSchema {
        ParamSchema { params: self.params.clone() }
    }

    /// Type registry view
    pub fn registry(&self) -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        for (name, ty) in &self.types {
            registry.register(name.clone(), ty.clone());
        }
        registry
    }
}

/// Schema file load error
#[derive(Debug, thiserror::Error)]
pub enum SchemaFileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// System columns resolved from ambient request context at render time
///
/// These names bypass scope lookup entirely.
pub const SYSTEM_COLUMNS: &[(&str, ParamType)] = &[
    ("created_at", ParamType::Timestamp),
    ("updated_at", ParamType::Timestamp),
    ("created_by", ParamType::String),
    ("updated_by", ParamType::String),
    ("version", ParamType::Int),
];

/// Look up the type of a system column, if the name is one
pub fn system_column_type(name: &str) -> Option<&'static ParamType> {
    SYSTEM_COLUMNS
        .iter()
        .find(|(col, _)| *col == name)
        .map(|(_, ty)| ty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_type_display() {
        assert_eq!(ParamType::Int.to_string(), "INT");
        assert_eq!(ParamType::array(ParamType::String).to_string(), "ARRAY");
        assert_eq!(ParamType::named("User").to_string(), "User");
    }

    #[test]
    fn dummy_values_match_declared_types() {
        let registry = TypeRegistry::new();
        assert_eq!(ParamType::Int.dummy_value(&registry), serde_json::json!(0));
        assert_eq!(ParamType::Bool.dummy_value(&registry), serde_json::json!(false));

        let arr = ParamType::array(ParamType::String).dummy_value(&registry);
        assert_eq!(arr, serde_json::json!([""]));

        let obj = ParamType::object(vec![
            FieldDecl::new("id", ParamType::Int),
            FieldDecl::new("name", ParamType::String),
        ])
        .dummy_value(&registry);
        assert_eq!(obj, serde_json::json!({"id": 0, "name": ""}));
    }

    #[test]
    fn named_type_resolution() {
        let mut registry = TypeRegistry::new();
        registry.register(
            "User",
            ParamType::object(vec![FieldDecl::new("id", ParamType::Int)]),
        );

        let named = ParamType::named("User");
        let resolved = named.resolve(&registry);
        assert!(matches!(resolved, ParamType::Object { .. }));

        let dummy = named.dummy_value(&registry);
        assert_eq!(dummy, serde_json::json!({"id": 0}));
    }

    #[test]
    fn type_inference_from_values() {
        assert_eq!(ParamType::of_value(&serde_json::json!(7)), ParamType::Int);
        assert_eq!(ParamType::of_value(&serde_json::json!(1.5)), ParamType::Float);
        assert_eq!(ParamType::of_value(&serde_json::json!("x")), ParamType::String);
        assert_eq!(
            ParamType::of_value(&serde_json::json!([1, 2])),
            ParamType::array(ParamType::Int)
        );
    }

    #[test]
    fn schema_lookup() {
        let schema = ParamSchema::new()
            .declare("id", ParamType::Int)
            .declare("name", ParamType::String);

        assert_eq!(schema.get("id"), Some(&ParamType::Int));
        assert_eq!(schema.get("missing"), None);
        assert_eq!(schema.names(), vec!["id", "name"]);
    }

    #[test]
    fn system_columns_bypass_schema() {
        assert_eq!(system_column_type("created_at"), Some(&ParamType::Timestamp));
        assert_eq!(system_column_type("version"), Some(&ParamType::Int));
        assert_eq!(system_column_type("id"), None);
    }

    #[test]
    fn schema_file_parsing() {
        let json = r#"{
            "params": [
                {"name": "id", "ty": {"type": "int"}},
                {"name": "rows", "ty": {"type": "array", "element": {"type": "named", "name": "User"}}}
            ],
            "constants": {"tenant": "acme"},
            "types": {
                "User": {"type": "object", "fields": [{"name": "id", "ty": {"type": "int"}}]}
            }
        }"#;

        let file = SchemaFile::from_json(json).unwrap();
        assert_eq!(file.params.len(), 2);
        assert_eq!(file.constants.get("tenant"), Some(&serde_json::json!("acme")));
        assert!(file.registry().get("User").is_some());
    }
}
