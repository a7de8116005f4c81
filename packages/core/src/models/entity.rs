//! Entity and Value Types
//!
//! An entity is a store-assigned identity plus a mapping from field name to
//! value. Identity is immutable once allocated; field values change through
//! committed mutations only.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Opaque, store-assigned entity identity
///
/// Uids are allocated by the store at commit time for blank mutation targets
/// and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(Uuid);

impl Uid {
    /// Allocate a fresh uid
    pub fn allocate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl From<Uuid> for Uid {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single scalar value stored in an entity field
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Edge to another entity
    Uid(Uid),
}

impl FieldValue {
    /// Name of the scalar type, matching the schema descriptor keywords
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::String(_) => "string",
            FieldValue::Int(_) => "int",
            FieldValue::Float(_) => "float",
            FieldValue::Bool(_) => "bool",
            FieldValue::Uid(_) => "uid",
        }
    }

    /// Canonical token used for exact-match index keys
    pub fn index_token(&self) -> String {
        match self {
            FieldValue::String(s) => format!("s:{}", s),
            FieldValue::Int(i) => format!("i:{}", i),
            FieldValue::Float(v) => format!("f:{}", v),
            FieldValue::Bool(b) => format!("b:{}", b),
            FieldValue::Uid(u) => format!("u:{}", u),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::String(s) => write!(f, "{:?}", s),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Uid(u) => write!(f, "<{}>", u),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Int(value as i64)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<Uid> for FieldValue {
    fn from(value: Uid) -> Self {
        FieldValue::Uid(value)
    }
}

/// Value held by a field: a scalar, or a list for list-valued predicates
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StoredValue {
    Scalar(FieldValue),
    List(Vec<FieldValue>),
}

impl StoredValue {
    /// Whether this value equals `needle` (scalars) or contains it (lists)
    pub fn matches(&self, needle: &FieldValue) -> bool {
        match self {
            StoredValue::Scalar(v) => v == needle,
            StoredValue::List(items) => items.contains(needle),
        }
    }

    /// Every scalar this value contributes to an exact index
    pub fn scalars(&self) -> Vec<&FieldValue> {
        match self {
            StoredValue::Scalar(v) => vec![v],
            StoredValue::List(items) => items.iter().collect(),
        }
    }
}

/// Snapshot of an entity as observed by one transaction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    pub uid: Uid,
    pub fields: BTreeMap<String, StoredValue>,
}

impl Entity {
    pub fn new(uid: Uid) -> Self {
        Self {
            uid,
            fields: BTreeMap::new(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&StoredValue> {
        self.fields.get(field)
    }

    /// Scalar value of `field`, if present and scalar
    pub fn scalar(&self, field: &str) -> Option<&FieldValue> {
        match self.fields.get(field) {
            Some(StoredValue::Scalar(v)) => Some(v),
            _ => None,
        }
    }

    /// List items of `field`; empty when the field is absent
    pub fn list(&self, field: &str) -> &[FieldValue] {
        match self.fields.get(field) {
            Some(StoredValue::List(items)) => items,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_value_matches_scalar_and_list() {
        let scalar = StoredValue::Scalar(FieldValue::from("Alice"));
        assert!(scalar.matches(&"Alice".into()));
        assert!(!scalar.matches(&"Bob".into()));

        let list = StoredValue::List(vec![1.into(), 2.into()]);
        assert!(list.matches(&FieldValue::Int(2)));
        assert!(!list.matches(&FieldValue::Int(3)));
    }

    #[test]
    fn test_index_token_distinguishes_types() {
        assert_ne!(
            FieldValue::from("1").index_token(),
            FieldValue::from(1).index_token()
        );
    }

    #[test]
    fn test_entity_serializes_fields_untagged() {
        let mut entity = Entity::new(Uid::allocate());
        entity
            .fields
            .insert("name".to_string(), StoredValue::Scalar("Alice".into()));
        entity
            .fields
            .insert("count".to_string(), StoredValue::List(vec![0.into(), 1.into()]));

        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(json["fields"]["name"], "Alice");
        assert_eq!(json["fields"]["count"], serde_json::json!([0, 1]));
    }

    #[test]
    fn test_entity_list_defaults_to_empty() {
        let entity = Entity::new(Uid::allocate());
        assert!(entity.list("count").is_empty());
        assert!(entity.scalar("name").is_none());
    }
}
