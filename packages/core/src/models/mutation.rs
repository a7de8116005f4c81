//! Mutation Builder
//!
//! Composes field-level changes addressed to a resolved entity or to a new
//! (blank) entity, and validates them against the predicate schema. Building a
//! descriptor is pure: nothing touches a transaction until the descriptor is
//! attached.
//!
//! List-valued fields append by default. Replacing a list must be requested
//! explicitly with [`MutationBuilder::replace`]; there is no implicit merge.
//!
//! # Examples
//!
//! ```rust
//! use edgestore_core::models::{MutationBuilder, MutationTarget, PredicateSchema};
//!
//! let schema: PredicateSchema = "name: string @index(exact) .\ncount: [int] ."
//!     .parse()
//!     .unwrap();
//!
//! let descriptor = MutationBuilder::new(MutationTarget::blank("alice"))
//!     .set("name", "Alice")
//!     .append("count", 1)
//!     .build(&schema)
//!     .unwrap();
//! assert_eq!(descriptor.ops.len(), 2);
//! ```

use crate::models::entity::{FieldValue, Uid};
use crate::models::schema::{PredicateSchema, ScalarType};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// A field value that does not fit the declared schema
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Schema violation on field '{field}': {reason}")]
pub struct SchemaViolation {
    pub field: String,
    pub reason: String,
}

impl SchemaViolation {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn unknown_field(field: impl Into<String>) -> Self {
        Self::new(field, "field is not declared in the schema")
    }

    pub fn type_mismatch(field: impl Into<String>, expected: ScalarType, got: &FieldValue) -> Self {
        Self::new(
            field,
            format!("expected {}, got {}", expected, got.type_name()),
        )
    }
}

/// Entity a mutation is addressed to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationTarget {
    /// Entity already resolved inside the transaction
    Existing(Uid),

    /// New entity allocated at commit; descriptors sharing a label share the entity
    Blank(String),
}

impl MutationTarget {
    pub fn blank(label: impl Into<String>) -> Self {
        MutationTarget::Blank(label.into())
    }
}

/// Change applied to a single field
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", content = "value", rename_all = "lowercase")]
pub enum FieldChange {
    /// Set a scalar field, or append one item to a list field
    Set(FieldValue),
    /// Append items to a list field
    Append(Vec<FieldValue>),
    /// Replace a list field wholesale
    Replace(Vec<FieldValue>),
    /// Remove the field
    Clear,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldOp {
    pub field: String,
    pub change: FieldChange,
}

/// Validated set of field changes for one target
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MutationDescriptor {
    pub target: MutationTarget,
    pub ops: Vec<FieldOp>,
}

impl MutationDescriptor {
    /// Check every op against `schema`
    pub fn validate(&self, schema: &PredicateSchema) -> Result<(), SchemaViolation> {
        self.ops.iter().try_for_each(|op| validate_op(op, schema))
    }
}

/// Unvalidated field changes, reusable across retry attempts
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FieldDelta {
    pub ops: Vec<FieldOp>,
}

impl FieldDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.push(field, FieldChange::Set(value.into()));
        self
    }

    pub fn append(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.push(field, FieldChange::Append(vec![value.into()]));
        self
    }

    pub fn replace(mut self, field: impl Into<String>, values: Vec<FieldValue>) -> Self {
        self.push(field, FieldChange::Replace(values));
        self
    }

    pub fn clear(mut self, field: impl Into<String>) -> Self {
        self.push(field, FieldChange::Clear);
        self
    }

    fn push(&mut self, field: impl Into<String>, change: FieldChange) {
        self.ops.push(FieldOp {
            field: field.into(),
            change,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Builder producing a [`MutationDescriptor`]
#[derive(Debug, Clone)]
pub struct MutationBuilder {
    target: MutationTarget,
    delta: FieldDelta,
}

impl MutationBuilder {
    pub fn new(target: MutationTarget) -> Self {
        Self {
            target,
            delta: FieldDelta::new(),
        }
    }

    /// Builder for a structured JSON document
    ///
    /// Each top-level key is a field. JSON arrays become appends; `null`
    /// clears the field. Values are converted using the declared type, so
    /// the schema is needed up front.
    pub fn from_json(
        target: MutationTarget,
        document: &Value,
        schema: &PredicateSchema,
    ) -> Result<Self, SchemaViolation> {
        let object = document
            .as_object()
            .ok_or_else(|| SchemaViolation::new("<document>", "expected a JSON object"))?;

        let mut builder = Self::new(target);
        for (field, value) in object {
            let def = schema
                .get(field)
                .ok_or_else(|| SchemaViolation::unknown_field(field))?;
            let change = match value {
                Value::Null => FieldChange::Clear,
                Value::Array(items) => {
                    let converted = items
                        .iter()
                        .map(|item| json_to_value(field, def.value_type, item))
                        .collect::<Result<Vec<_>, _>>()?;
                    FieldChange::Append(converted)
                }
                scalar => FieldChange::Set(json_to_value(field, def.value_type, scalar)?),
            };
            builder.delta.push(field.clone(), change);
        }
        Ok(builder)
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.delta = self.delta.set(field, value);
        self
    }

    pub fn append(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.delta = self.delta.append(field, value);
        self
    }

    pub fn replace(mut self, field: impl Into<String>, values: Vec<FieldValue>) -> Self {
        self.delta = self.delta.replace(field, values);
        self
    }

    pub fn clear(mut self, field: impl Into<String>) -> Self {
        self.delta = self.delta.clear(field);
        self
    }

    pub fn with_delta(mut self, delta: &FieldDelta) -> Self {
        self.delta.ops.extend(delta.ops.iter().cloned());
        self
    }

    /// Validate against `schema` and produce the descriptor
    pub fn build(self, schema: &PredicateSchema) -> Result<MutationDescriptor, SchemaViolation> {
        let descriptor = MutationDescriptor {
            target: self.target,
            ops: self.delta.ops,
        };
        descriptor.validate(schema)?;
        Ok(descriptor)
    }
}

fn validate_op(op: &FieldOp, schema: &PredicateSchema) -> Result<(), SchemaViolation> {
    let def = schema
        .get(&op.field)
        .ok_or_else(|| SchemaViolation::unknown_field(&op.field))?;

    let values: &[FieldValue] = match &op.change {
        FieldChange::Set(value) => std::slice::from_ref(value),
        FieldChange::Append(values) | FieldChange::Replace(values) => {
            if !def.list {
                return Err(SchemaViolation::new(
                    &op.field,
                    "list operation on a scalar field",
                ));
            }
            values
        }
        FieldChange::Clear => &[],
    };

    match values.iter().find(|v| !def.value_type.accepts(v)) {
        Some(bad) => Err(SchemaViolation::type_mismatch(&op.field, def.value_type, bad)),
        None => Ok(()),
    }
}

fn json_to_value(
    field: &str,
    expected: ScalarType,
    value: &Value,
) -> Result<FieldValue, SchemaViolation> {
    let converted = match (expected, value) {
        (ScalarType::String, Value::String(s)) => Some(FieldValue::String(s.clone())),
        (ScalarType::Int, Value::Number(n)) => n.as_i64().map(FieldValue::Int),
        (ScalarType::Float, Value::Number(n)) => n.as_f64().map(FieldValue::Float),
        (ScalarType::Bool, Value::Bool(b)) => Some(FieldValue::Bool(*b)),
        (ScalarType::Uid, Value::String(s)) => s
            .parse::<uuid::Uuid>()
            .ok()
            .map(|u| FieldValue::Uid(Uid::from(u))),
        _ => None,
    };
    converted.ok_or_else(|| {
        SchemaViolation::new(field, format!("expected {}, got JSON {}", expected, value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> PredicateSchema {
        "name: string @index(exact) .\nemail: string @index(exact) .\ncount: [int] ."
            .parse()
            .unwrap()
    }

    #[test]
    fn test_build_valid_descriptor() {
        let uid = Uid::allocate();
        let descriptor = MutationBuilder::new(MutationTarget::Existing(uid))
            .append("count", 4)
            .build(&schema())
            .unwrap();
        assert_eq!(descriptor.target, MutationTarget::Existing(uid));
        assert_eq!(
            descriptor.ops[0].change,
            FieldChange::Append(vec![FieldValue::Int(4)])
        );
    }

    #[test]
    fn test_type_mismatch_is_violation() {
        let err = MutationBuilder::new(MutationTarget::blank("x"))
            .append("count", "four")
            .build(&schema())
            .unwrap_err();
        assert_eq!(err.field, "count");
        assert_eq!(err.reason, "expected int, got string");
    }

    #[test]
    fn test_list_op_on_scalar_is_violation() {
        let err = MutationBuilder::new(MutationTarget::blank("x"))
            .append("name", "Alice")
            .build(&schema())
            .unwrap_err();
        assert!(err.reason.contains("scalar"));
    }

    #[test]
    fn test_unknown_field_is_violation() {
        assert!(MutationBuilder::new(MutationTarget::blank("x"))
            .set("age", 3)
            .build(&schema())
            .is_err());
    }

    #[test]
    fn test_from_json_document() {
        let descriptor = MutationBuilder::from_json(
            MutationTarget::blank("alice"),
            &json!({ "name": "Alice", "count": [1, 2], "email": null }),
            &schema(),
        )
        .unwrap()
        .build(&schema())
        .unwrap();

        let change_for = |field: &str| {
            descriptor
                .ops
                .iter()
                .find(|op| op.field == field)
                .map(|op| op.change.clone())
                .unwrap()
        };
        assert_eq!(change_for("name"), FieldChange::Set("Alice".into()));
        assert_eq!(
            change_for("count"),
            FieldChange::Append(vec![1.into(), 2.into()])
        );
        assert_eq!(change_for("email"), FieldChange::Clear);
    }

    #[test]
    fn test_from_json_rejects_non_object() {
        let err = MutationBuilder::from_json(MutationTarget::blank("x"), &json!([1]), &schema())
            .unwrap_err();
        assert_eq!(err.field, "<document>");
    }

    #[test]
    fn test_from_json_rejects_wrong_json_type() {
        let err = MutationBuilder::from_json(
            MutationTarget::blank("x"),
            &json!({ "count": ["a"] }),
            &schema(),
        )
        .unwrap_err();
        assert_eq!(err.field, "count");
    }

    #[test]
    fn test_with_delta_reuses_ops() {
        let delta = FieldDelta::new().append("count", 1).set("email", "a@b.c");
        let descriptor = MutationBuilder::new(MutationTarget::blank("x"))
            .set("name", "Alice")
            .with_delta(&delta)
            .build(&schema())
            .unwrap();
        assert_eq!(descriptor.ops.len(), 3);
        assert!(!delta.is_empty());
    }
}
