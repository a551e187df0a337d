//! Statement execution with bounded retry on transient conflicts
//!
//! A compiled statement is replayed verbatim, one attempt at a time, while
//! the backend keeps reporting deadlocks and the retry cap is not reached.
//! Every other error is returned unchanged.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::backends::{DatabasePool, StatementOutcome};
use crate::error::{is_transient_conflict, ModelResult};
use crate::query::CompiledStatement;

#[derive(Clone)]
pub struct StatementExecutor {
    pool: Arc<dyn DatabasePool>,
    max_conflict_retries: u32,
}

impl std::fmt::Debug for StatementExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatementExecutor")
            .field("max_conflict_retries", &self.max_conflict_retries)
            .finish()
    }
}

impl StatementExecutor {
    pub fn new(pool: Arc<dyn DatabasePool>, max_conflict_retries: u32) -> Self {
        Self {
            pool,
            max_conflict_retries,
        }
    }

    pub fn pool(&self) -> &Arc<dyn DatabasePool> {
        &self.pool
    }

    /// Run `statement`, retrying up to the configured cap on deadlock
    pub async fn execute(&self, statement: &CompiledStatement) -> ModelResult<StatementOutcome> {
        let max_attempts = self.max_conflict_retries + 1;
        let mut attempts = 0;

        loop {
            attempts += 1;
            debug!(
                sql = %statement.sql,
                params = statement.params.len(),
                attempt = attempts,
                "executing statement"
            );

            match self.pool.execute(&statement.sql, &statement.params).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if attempts < max_attempts && is_transient_conflict(&e) => {
                    warn!(
                        "Transient conflict on attempt {} of {}, retrying: {}",
                        attempts, max_attempts, e
                    );
                }
                Err(e) => {
                    error!(sql = %statement.sql, attempts, "statement failed: {}", e);
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::ResultRow;
    use crate::error::ModelError;
    use crate::testing::ScriptedPool;

    fn statement() -> CompiledStatement {
        CompiledStatement::new("UPDATE `users` SET `name` = ? WHERE `users`.`id` = ?", vec![
            "alex".into(),
            1i64.into(),
        ])
    }

    #[tokio::test]
    async fn test_two_conflicts_then_success_takes_three_attempts() {
        let pool = ScriptedPool::new();
        pool.deadlock()
            .deadlock()
            .respond_rows(vec![ResultRow::new().with("id", 1i64)]);
        let executor = StatementExecutor::new(pool.clone(), 3);

        let outcome = executor.execute(&statement()).await.unwrap();
        assert_eq!(outcome.rows.len(), 1);
        assert_eq!(pool.attempts(), 3);

        // the identical statement is replayed
        let statements = pool.statements();
        assert!(statements.iter().all(|s| *s == statements[0]));
    }

    #[tokio::test]
    async fn test_conflicts_beyond_the_cap_surface_the_error() {
        let pool = ScriptedPool::new();
        pool.deadlock().deadlock().deadlock().deadlock().deadlock();
        let executor = StatementExecutor::new(pool.clone(), 3);

        let err = executor.execute(&statement()).await.unwrap_err();
        assert!(matches!(err, ModelError::TransientConflict(_)));
        assert_eq!(pool.attempts(), 4);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let pool = ScriptedPool::new();
        pool.fail(ModelError::Database("Unknown column 'nope'".to_string()));
        let executor = StatementExecutor::new(pool.clone(), 3);

        let err = executor.execute(&statement()).await.unwrap_err();
        assert_eq!(err, ModelError::Database("Unknown column 'nope'".to_string()));
        assert_eq!(pool.attempts(), 1);
    }

    #[tokio::test]
    async fn test_zero_retries_means_one_attempt() {
        let pool = ScriptedPool::new();
        pool.deadlock();
        let executor = StatementExecutor::new(pool.clone(), 0);
        assert!(executor.execute(&statement()).await.is_err());
        assert_eq!(pool.attempts(), 1);
    }
}
