//! Database Backend Abstractions
//!
//! The pool capability the mapper executes through, plus the MySQL
//! implementation built on sqlx.

pub mod core;
pub mod mysql;

// Re-export core traits and types
pub use self::core::*;
pub use self::mysql::{MySqlBackend, MySqlDatabasePool};
