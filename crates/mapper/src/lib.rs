//! # elif-mapper: data mapping layer for elif.rs
//!
//! Loosely shaped query descriptors in, model instances with their
//! relations out. A frozen `Schema` holds model definitions and relation
//! declarations; `Mapper` runs every request through the same pipeline:
//!
//! normalize -> expand relations -> map columns -> compile SQL ->
//! execute (retrying deadlocks) -> hydrate -> assemble relations
//!
//! Statements are produced for MySQL and executed through the
//! `DatabasePool` capability, so tests and other drivers can stand in
//! for the sqlx-backed pool.

pub mod assembly;
pub mod backends;
pub mod config;
pub mod error;
pub mod execution;
pub mod hydration;
pub mod mapper;
pub mod model;
pub mod query;
pub mod relationships;
pub mod schema;

#[cfg(test)]
mod testing;

// Re-export core traits and types
pub use assembly::RelationAssembler;
pub use backends::{
    DatabasePool, DatabasePoolConfig, DatabaseValue, MySqlBackend, MySqlDatabasePool, ResultRow,
    StatementOutcome,
};
pub use config::{MapperConfig, MapperDefaults};
pub use error::*;
pub use execution::StatementExecutor;
pub use hydration::{HydratedRow, RelatedRow, ResultHydrator};
pub use mapper::{Lookup, Mapper, ModelMapper, Page, PreparedQuery, RelationAccessor};
pub use model::*;
pub use query::*;
pub use relationships::{
    BelongsToOptions, HasManyOptions, ManyToManyOptions, RelationDefinition, RelationKind,
    RelationRegistry, ThroughConfig,
};
pub use schema::{Schema, SchemaBuilder};
