//! Relationships Module - relation declarations and lookup

pub mod inflection;
pub mod metadata;
pub mod registry;

// Re-export metadata system types
pub use metadata::*;
pub use registry::*;
