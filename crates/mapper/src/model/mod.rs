//! Model System - definitions, instances and value coercion
//!
//! - `definition`: table, primary key and attribute metadata
//! - `instance`: attribute values, change tracking, loaded relations
//! - `coercion`: domain <-> storage value conversion
//! - `core_trait`: typed structs backed by a definition

pub mod coercion;
pub mod core_trait;
pub mod definition;
pub mod instance;

// Re-export main types and traits for convenience
pub use core_trait::Model;
pub use definition::{
    AttributeDefinition, AttributeType, DateStorage, ModelDefinition, ValueFormatter,
};
pub use instance::ModelInstance;
