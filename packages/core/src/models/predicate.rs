//! Predicates used to resolve entity identity

use crate::models::entity::{FieldValue, Uid};
use crate::models::mutation::SchemaViolation;
use crate::models::schema::PredicateSchema;
use serde::Serialize;
use std::fmt;

/// Field-based match expression
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "func", rename_all = "lowercase")]
pub enum Predicate {
    /// Exact match of `field` against `value`; on list fields, membership
    Eq { field: String, value: FieldValue },

    /// Direct identity lookup
    Uid { uid: Uid },
}

impl Predicate {
    pub fn eq(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Predicate::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn uid(uid: Uid) -> Self {
        Predicate::Uid { uid }
    }

    /// Check the predicate can be evaluated against `schema`
    ///
    /// Equality requires a declared, exact-indexed field and a value of the
    /// declared scalar type.
    pub fn validate(&self, schema: &PredicateSchema) -> Result<(), SchemaViolation> {
        let (field, value) = match self {
            Predicate::Eq { field, value } => (field, value),
            Predicate::Uid { .. } => return Ok(()),
        };

        let def = schema
            .get(field)
            .ok_or_else(|| SchemaViolation::unknown_field(field))?;
        if !def.is_indexed() {
            return Err(SchemaViolation::new(
                field,
                "predicate is not indexed; eq() requires @index(exact)",
            ));
        }
        if !def.value_type.accepts(value) {
            return Err(SchemaViolation::type_mismatch(field, def.value_type, value));
        }
        Ok(())
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Eq { field, value } => write!(f, "eq({}, {})", field, value),
            Predicate::Uid { uid } => write!(f, "uid({})", uid),
        }
    }
}
