//! Document schema model
//!
//! Schemas are ordered, inheritable field definitions with wildcard
//! dynamic templates. They drive mapping generation, source
//! serialization and result hydration.

mod definition;
mod field;
mod registry;

pub use definition::{
    is_mapping_field, FieldTypeTag, JoinSpec, Schema, SchemaBuilder, MAPPING_FIELDS,
};
pub use field::{BoundField, DynamicTemplate, Field};
pub use registry::SchemaRegistry;
