//! Scripted pool used by unit tests: records statements, replays queued outcomes

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::backends::{DatabasePool, DatabaseValue, ResultRow, StatementOutcome};
use crate::error::{ModelError, OrmResult};

#[derive(Debug, Default)]
pub(crate) struct ScriptedPool {
    responses: Mutex<VecDeque<OrmResult<StatementOutcome>>>,
    statements: Mutex<Vec<(String, Vec<DatabaseValue>)>>,
}

impl ScriptedPool {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn respond(&self, outcome: StatementOutcome) -> &Self {
        self.responses.lock().unwrap().push_back(Ok(outcome));
        self
    }

    pub(crate) fn respond_rows(&self, rows: Vec<ResultRow>) -> &Self {
        self.respond(StatementOutcome::with_rows(rows))
    }

    pub(crate) fn fail(&self, error: ModelError) -> &Self {
        self.responses.lock().unwrap().push_back(Err(error));
        self
    }

    pub(crate) fn deadlock(&self) -> &Self {
        self.fail(ModelError::TransientConflict(
            "Deadlock found when trying to get lock; try restarting transaction".to_string(),
        ))
    }

    pub(crate) fn statements(&self) -> Vec<(String, Vec<DatabaseValue>)> {
        self.statements.lock().unwrap().clone()
    }

    pub(crate) fn attempts(&self) -> usize {
        self.statements.lock().unwrap().len()
    }
}

#[async_trait]
impl DatabasePool for ScriptedPool {
    async fn execute(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<StatementOutcome> {
        self.statements
            .lock()
            .unwrap()
            .push((sql.to_string(), params.to_vec()));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(StatementOutcome::default()))
    }
}
