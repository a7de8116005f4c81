//! Data Models
//!
//! This module contains the data structures shared by the store and the
//! transaction layer:
//!
//! - `Entity` / `Uid` / `FieldValue` - store-assigned identity plus field values
//! - `PredicateSchema` - declared field types and index modes
//! - `Predicate` - match expressions used to resolve identity
//! - `MutationBuilder` - validated field-level changes

pub mod entity;
pub mod mutation;
pub mod predicate;
pub mod schema;

pub use entity::{Entity, FieldValue, StoredValue, Uid};
pub use mutation::{
    FieldChange, FieldDelta, FieldOp, MutationBuilder, MutationDescriptor, MutationTarget,
    SchemaViolation,
};
pub use predicate::Predicate;
pub use schema::{IndexMode, PredicateDef, PredicateSchema, ScalarType, SchemaError};
