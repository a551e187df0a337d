//! Query Module - from loosely shaped descriptors to parametrized SQL
//!
//! descriptor -> `QueryNormalizer` -> `RelationExpander` -> column mapping -> `SqlCompiler`

pub mod ast;
pub mod columns;
pub mod compiler;
pub mod descriptor;
pub mod expander;
pub mod normalizer;
pub mod types;

pub use ast::{QueryAst, SelectAst, FOREIGN_KEY_MARKER};
pub use columns::{map_columns, map_select_columns};
pub use compiler::{CompiledStatement, MySqlCompiler, SqlCompiler};
pub use descriptor::QueryDescriptor;
pub use expander::{ExpandedQuery, IncludedRelation, RelationExpander};
pub use normalizer::{NormalizedQuery, QueryNormalizer};
pub use types::{JoinType, OrderDirection, QueryOperator, QueryType, WhereCondition};
