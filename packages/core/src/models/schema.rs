//! Predicate Schema
//!
//! The schema maps each field name to a declared scalar type, a list flag and
//! an indexing mode. It is applied once before any transaction and then read
//! through an `Arc` snapshot by every transaction.
//!
//! ## Descriptor Form
//!
//! ```text
//! name: string @index(exact) .
//! email: string @index(exact) .
//! count: [int] .
//! ```
//!
//! `[T]` declares a list-valued field. Supported scalar types are `string`,
//! `int`, `float`, `bool` and `uid`.

use crate::models::entity::FieldValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while parsing or validating a schema descriptor
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    /// Descriptor line could not be parsed
    #[error("Invalid schema line {line}: {reason}")]
    Parse { line: usize, reason: String },

    /// Field declared more than once
    #[error("Field '{field}' is declared more than once")]
    DuplicateField { field: String },

    /// Index mode not supported for the declared type
    #[error("Field '{field}' of type {value_type} cannot use @index({index})")]
    UnsupportedIndex {
        field: String,
        value_type: ScalarType,
        index: IndexMode,
    },

    /// Serialized entry whose key differs from the declared name
    #[error("Schema entry '{key}' declares field '{name}'")]
    NameMismatch { key: String, name: String },

    /// The store refused the schema
    #[error("Schema rejected by store: {0}")]
    Rejected(String),
}

impl SchemaError {
    pub fn parse(line: usize, reason: impl Into<String>) -> Self {
        Self::Parse {
            line,
            reason: reason.into(),
        }
    }
}

/// Declared scalar type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    String,
    Int,
    Float,
    Bool,
    Uid,
}

impl ScalarType {
    /// Whether `value` is an instance of this type
    pub fn accepts(&self, value: &FieldValue) -> bool {
        matches!(
            (self, value),
            (ScalarType::String, FieldValue::String(_))
                | (ScalarType::Int, FieldValue::Int(_))
                | (ScalarType::Float, FieldValue::Float(_))
                | (ScalarType::Float, FieldValue::Int(_))
                | (ScalarType::Bool, FieldValue::Bool(_))
                | (ScalarType::Uid, FieldValue::Uid(_))
        )
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarType::String => "string",
            ScalarType::Int => "int",
            ScalarType::Float => "float",
            ScalarType::Bool => "bool",
            ScalarType::Uid => "uid",
        };
        f.write_str(name)
    }
}

impl FromStr for ScalarType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(ScalarType::String),
            "int" => Ok(ScalarType::Int),
            "float" => Ok(ScalarType::Float),
            "bool" => Ok(ScalarType::Bool),
            "uid" => Ok(ScalarType::Uid),
            other => Err(format!("unknown type '{}'", other)),
        }
    }
}

/// Indexing mode of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexMode {
    #[default]
    None,
    /// Exact-match index; required for equality predicates
    Exact,
}

impl fmt::Display for IndexMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexMode::None => f.write_str("none"),
            IndexMode::Exact => f.write_str("exact"),
        }
    }
}

/// Declaration of a single field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredicateDef {
    pub name: String,

    #[serde(rename = "type")]
    pub value_type: ScalarType,

    /// List-valued field (`[T]` in the descriptor)
    #[serde(default)]
    pub list: bool,

    #[serde(default)]
    pub index: IndexMode,
}

impl PredicateDef {
    pub fn new(name: impl Into<String>, value_type: ScalarType) -> Self {
        Self {
            name: name.into(),
            value_type,
            list: false,
            index: IndexMode::None,
        }
    }

    pub fn list(mut self) -> Self {
        self.list = true;
        self
    }

    pub fn exact(mut self) -> Self {
        self.index = IndexMode::Exact;
        self
    }

    pub fn is_indexed(&self) -> bool {
        self.index != IndexMode::None
    }
}

/// Mapping from field name to its declaration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SchemaDocument")]
pub struct PredicateSchema {
    predicates: BTreeMap<String, PredicateDef>,
}

/// Unvalidated serialized form of [`PredicateSchema`]
#[derive(Deserialize)]
struct SchemaDocument {
    predicates: BTreeMap<String, PredicateDef>,
}

impl TryFrom<SchemaDocument> for PredicateSchema {
    type Error = SchemaError;

    fn try_from(doc: SchemaDocument) -> Result<Self, Self::Error> {
        let mut defs = Vec::with_capacity(doc.predicates.len());
        for (key, def) in doc.predicates {
            if key != def.name {
                return Err(SchemaError::NameMismatch {
                    key,
                    name: def.name,
                });
            }
            defs.push(def);
        }
        Self::from_defs(defs)
    }
}

impl PredicateSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a schema from declarations, validating each one
    pub fn from_defs(defs: impl IntoIterator<Item = PredicateDef>) -> Result<Self, SchemaError> {
        let mut schema = Self::new();
        for def in defs {
            schema.insert(def)?;
        }
        Ok(schema)
    }

    fn insert(&mut self, def: PredicateDef) -> Result<(), SchemaError> {
        if def.index == IndexMode::Exact
            && matches!(def.value_type, ScalarType::Float | ScalarType::Uid)
        {
            return Err(SchemaError::UnsupportedIndex {
                field: def.name,
                value_type: def.value_type,
                index: def.index,
            });
        }
        if self.predicates.contains_key(&def.name) {
            return Err(SchemaError::DuplicateField { field: def.name });
        }
        self.predicates.insert(def.name.clone(), def);
        Ok(())
    }

    pub fn get(&self, field: &str) -> Option<&PredicateDef> {
        self.predicates.get(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &PredicateDef> {
        self.predicates.values()
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}

impl FromStr for PredicateSchema {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut schema = Self::new();

        for (idx, raw) in s.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let body = line
                .strip_suffix('.')
                .ok_or_else(|| SchemaError::parse(line_no, "missing terminating '.'"))?
                .trim();
            let (name, rest) = body
                .split_once(':')
                .ok_or_else(|| SchemaError::parse(line_no, "expected 'field: type'"))?;
            let name = name.trim();
            if name.is_empty() {
                return Err(SchemaError::parse(line_no, "empty field name"));
            }

            let mut tokens = rest.split_whitespace();
            let type_token = tokens
                .next()
                .ok_or_else(|| SchemaError::parse(line_no, "missing type"))?;
            let (list, type_name) = match type_token
                .strip_prefix('[')
                .and_then(|t| t.strip_suffix(']'))
            {
                Some(inner) => (true, inner),
                None => (false, type_token),
            };
            let value_type = type_name
                .parse::<ScalarType>()
                .map_err(|reason| SchemaError::parse(line_no, reason))?;

            let mut index = IndexMode::None;
            for directive in tokens {
                match directive {
                    "@index(exact)" => index = IndexMode::Exact,
                    other => {
                        return Err(SchemaError::parse(
                            line_no,
                            format!("unsupported directive '{}'", other),
                        ))
                    }
                }
            }

            schema.insert(PredicateDef {
                name: name.to_string(),
                value_type,
                list,
                index,
            })?;
        }

        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEOPLE: &str = "
        name: string @index(exact) .
        email: string @index(exact) .
        count: [int]  .
    ";

    #[test]
    fn test_parse_descriptor() {
        let schema: PredicateSchema = PEOPLE.parse().unwrap();
        assert_eq!(schema.len(), 3);

        let name = schema.get("name").unwrap();
        assert_eq!(name.value_type, ScalarType::String);
        assert_eq!(name.index, IndexMode::Exact);
        assert!(!name.list);

        let count = schema.get("count").unwrap();
        assert_eq!(count.value_type, ScalarType::Int);
        assert!(count.list);
        assert!(!count.is_indexed());
    }

    #[test]
    fn test_parse_rejects_missing_terminator() {
        let err = "name: string".parse::<PredicateSchema>().unwrap_err();
        assert!(matches!(err, SchemaError::Parse { line: 1, .. }));
    }

    #[test]
    fn test_parse_rejects_unknown_type() {
        let err = "age: decimal .".parse::<PredicateSchema>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid schema line 1: unknown type 'decimal'"
        );
    }

    #[test]
    fn test_exact_index_on_float_rejected() {
        let err = "score: float @index(exact) ."
            .parse::<PredicateSchema>()
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnsupportedIndex { .. }));
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let err = PredicateSchema::from_defs([
            PredicateDef::new("name", ScalarType::String),
            PredicateDef::new("name", ScalarType::Int),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            SchemaError::DuplicateField {
                field: "name".to_string()
            }
        );
    }

    #[test]
    fn test_float_accepts_int_values() {
        assert!(ScalarType::Float.accepts(&FieldValue::Int(3)));
        assert!(!ScalarType::Int.accepts(&FieldValue::Float(3.0)));
    }

    #[test]
    fn test_schema_json_round_trip_shape() {
        let json = serde_json::json!({
            "predicates": {
                "name": { "name": "name", "type": "string", "index": "exact" }
            }
        });
        let schema: PredicateSchema = serde_json::from_value(json).unwrap();
        assert!(schema.get("name").unwrap().is_indexed());
    }

    #[test]
    fn test_deserialize_validates_declarations() {
        let float_index = serde_json::json!({
            "predicates": {
                "score": { "name": "score", "type": "float", "index": "exact" }
            }
        });
        let err = serde_json::from_value::<PredicateSchema>(float_index).unwrap_err();
        assert!(err.to_string().contains("cannot use @index(exact)"));

        let renamed = serde_json::json!({
            "predicates": {
                "name": { "name": "email", "type": "string" }
            }
        });
        let err = serde_json::from_value::<PredicateSchema>(renamed).unwrap_err();
        assert!(err
            .to_string()
            .contains("Schema entry 'name' declares field 'email'"));
    }
}
