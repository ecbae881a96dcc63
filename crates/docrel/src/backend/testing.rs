//! In-memory connection provider that records statements and replays
//! scripted responses.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::traits::{ConnectionProvider, SqlConnection};
use crate::core::value::{SqlRow, SqlValue};
use crate::error::{Result, SqlError};

enum Response {
    Rows(Vec<SqlRow>),
    Error(SqlError),
}

#[derive(Default)]
struct State {
    statements: Vec<(String, Vec<SqlValue>)>,
    responses: VecDeque<Response>,
    acquired: usize,
    released: usize,
    discarded: usize,
}

#[derive(Clone, Default)]
pub(crate) struct RecordingProvider {
    state: Arc<Mutex<State>>,
}

impl RecordingProvider {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Next `execute`/`query` returns these rows; `execute` reports their
    /// count as affected. Unscripted, `execute` affects one row and `query`
    /// returns none.
    pub(crate) fn push_rows(&self, rows: Vec<Vec<SqlValue>>) {
        let rows = rows.into_iter().map(SqlRow::new).collect();
        self.state.lock().responses.push_back(Response::Rows(rows));
    }

    /// Next `execute`/`query` fails with `error`.
    pub(crate) fn push_error(&self, error: SqlError) {
        self.state.lock().responses.push_back(Response::Error(error));
    }

    pub(crate) fn statements(&self) -> Vec<String> {
        self.state
            .lock()
            .statements
            .iter()
            .map(|(sql, _)| sql.clone())
            .collect()
    }

    pub(crate) fn params(&self, index: usize) -> Vec<SqlValue> {
        self.state.lock().statements[index].1.clone()
    }

    pub(crate) fn acquired(&self) -> usize {
        self.state.lock().acquired
    }

    pub(crate) fn outstanding(&self) -> usize {
        let state = self.state.lock();
        state.acquired - state.released - state.discarded
    }

    pub(crate) fn discarded(&self) -> usize {
        self.state.lock().discarded
    }

    fn next_response(&self, sql: &str, params: &[SqlValue]) -> Option<Response> {
        let mut state = self.state.lock();
        state.statements.push((sql.to_string(), params.to_vec()));
        state.responses.pop_front()
    }

    fn record(&self, sql: &str) {
        self.state
            .lock()
            .statements
            .push((sql.to_string(), Vec::new()));
    }
}

pub(crate) struct RecordingConnection {
    provider: RecordingProvider,
    in_transaction: bool,
}

#[async_trait]
impl SqlConnection for RecordingConnection {
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> std::result::Result<u64, SqlError> {
        match self.provider.next_response(sql, params) {
            Some(Response::Error(e)) => Err(e),
            Some(Response::Rows(rows)) => Ok(rows.len() as u64),
            None => Ok(1),
        }
    }

    async fn query(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> std::result::Result<Vec<SqlRow>, SqlError> {
        match self.provider.next_response(sql, params) {
            Some(Response::Error(e)) => Err(e),
            Some(Response::Rows(rows)) => Ok(rows),
            None => Ok(Vec::new()),
        }
    }

    async fn begin(&mut self) -> std::result::Result<(), SqlError> {
        self.provider.record("BEGIN");
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> std::result::Result<(), SqlError> {
        self.provider.record("COMMIT");
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> std::result::Result<(), SqlError> {
        self.provider.record("ROLLBACK");
        self.in_transaction = false;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }
}

#[async_trait]
impl ConnectionProvider for RecordingProvider {
    type Connection = RecordingConnection;

    async fn acquire(&self) -> Result<RecordingConnection> {
        self.state.lock().acquired += 1;
        Ok(RecordingConnection {
            provider: self.clone(),
            in_transaction: false,
        })
    }

    fn release(&self, connection: RecordingConnection) {
        let mut state = self.state.lock();
        if connection.in_transaction {
            state.discarded += 1;
        } else {
            state.released += 1;
        }
    }
}
