//! In-memory [`Database`] fake that records every statement.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use crate::database::{ColumnInfo, Database, ExecOutcome, QueryOutcome};
use crate::error::Result;
use crate::value::{Row, Value};

/// Replays queued outcomes and logs statements in execution order.
///
/// Unqueued reads return no rows; unqueued writes succeed with one
/// affected row and an incrementing insert id.
#[derive(Default)]
pub(crate) struct RecordingDatabase {
    log: RefCell<Vec<(String, Vec<Value>)>>,
    reads: RefCell<VecDeque<Vec<Row>>>,
    writes: RefCell<VecDeque<ExecOutcome>>,
    next_id: Cell<i64>,
    depth: Cell<usize>,
}

impl RecordingDatabase {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_rows(&self, rows: Vec<Row>) {
        self.reads.borrow_mut().push_back(rows);
    }

    pub(crate) fn push_exec(&self, outcome: ExecOutcome) {
        self.writes.borrow_mut().push_back(outcome);
    }

    pub(crate) fn statements(&self) -> Vec<(String, Vec<Value>)> {
        self.log.borrow().clone()
    }

    pub(crate) fn last_statement(&self) -> Option<(String, Vec<Value>)> {
        self.log.borrow().last().cloned()
    }

    fn record(&self, sql: &str, params: &[Value]) {
        self.log.borrow_mut().push((sql.to_string(), params.to_vec()));
    }
}

impl Database for RecordingDatabase {
    fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecOutcome> {
        self.record(sql, params);
        if let Some(outcome) = self.writes.borrow_mut().pop_front() {
            return Ok(outcome);
        }
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        Ok(ExecOutcome::ok(1, id))
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<QueryOutcome> {
        self.record(sql, params);
        let rows = self.reads.borrow_mut().pop_front().unwrap_or_default();
        Ok(QueryOutcome::new(rows))
    }

    fn begin(&self) -> Result<()> {
        self.record("BEGIN", &[]);
        self.depth.set(self.depth.get() + 1);
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        self.record("COMMIT", &[]);
        self.depth.set(self.depth.get().saturating_sub(1));
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        self.record("ROLLBACK", &[]);
        self.depth.set(self.depth.get().saturating_sub(1));
        Ok(())
    }

    fn table_exists(&self, _name: &str) -> Result<bool> {
        Ok(false)
    }

    fn table_schema(&self, _name: &str) -> Result<Vec<ColumnInfo>> {
        Ok(Vec::new())
    }
}
