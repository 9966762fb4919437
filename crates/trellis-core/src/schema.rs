use serde::{Deserialize, Serialize};

use crate::error::{Result, TrellisError};
use crate::types::KeySet;

/// Primitive type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    Any,
}

impl FieldType {
    fn from_json_type(name: &str) -> Self {
        match name {
            "string" => Self::String,
            "integer" => Self::Integer,
            "number" => Self::Number,
            "boolean" => Self::Boolean,
            "array" => Self::Array,
            "object" => Self::Object,
            _ => Self::Any,
        }
    }
}

/// A single named field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: FieldType,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

/// A structural schema. Its field names are the authoritative key set
/// when attached to a node as a `produces` or `consumes` contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Add a required field.
    pub fn field(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.fields.push(Field {
            name: name.into(),
            ty,
            required: true,
        });
        self
    }

    /// Add an optional field.
    pub fn optional(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.fields.push(Field {
            name: name.into(),
            ty,
            required: false,
        });
        self
    }

    /// Field names as a key set.
    pub fn keys(&self) -> KeySet {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    /// Build a schema from a JSON Schema document.
    ///
    /// Only `"type": "object"` documents with a `properties` map are
    /// structural; anything else is rejected.
    pub fn from_json_schema(value: &serde_json::Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| TrellisError::NotStructural(format!("expected a JSON object, got {value}")))?;

        match obj.get("type").and_then(|t| t.as_str()) {
            Some("object") => {}
            Some(other) => {
                return Err(TrellisError::NotStructural(format!(
                    "schema type is '{other}', expected 'object'"
                )))
            }
            None => return Err(TrellisError::NotStructural("schema has no 'type'".into())),
        }

        let props = obj
            .get("properties")
            .and_then(|p| p.as_object())
            .ok_or_else(|| TrellisError::NotStructural("object schema has no 'properties'".into()))?;

        let required: Vec<&str> = obj
            .get("required")
            .and_then(|r| r.as_array())
            .map(|r| r.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default();

        let name = obj
            .get("title")
            .and_then(|t| t.as_str())
            .unwrap_or("Schema")
            .to_string();

        // serde_json's default map is ordered by key, so field order is stable.
        let fields = props
            .iter()
            .map(|(field, spec)| Field {
                name: field.clone(),
                ty: spec
                    .get("type")
                    .and_then(|t| t.as_str())
                    .map(FieldType::from_json_type)
                    .unwrap_or(FieldType::Any),
                required: required.contains(&field.as_str()),
            })
            .collect();

        Ok(Self { name, fields })
    }
}

/// Types that describe themselves as a structural schema.
pub trait Structured {
    fn schema() -> Schema;
}
