use sluice_core::{Row, RowNames, RowsAffected, Value};
use std::{
    future,
    time::{Duration, Instant},
};

/// How long a command keeps the server busy before it starts returning results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stall {
    #[default]
    None,
    For(Duration),
    /// Never completes on its own.
    Forever,
}

impl Stall {
    pub(crate) async fn elapse(self) {
        match self {
            Stall::None => {}
            Stall::For(duration) => tokio::time::sleep(duration).await,
            Stall::Forever => future::pending::<()>().await,
        }
    }

    /// Whether a stall that began at `started` is over, for the polling blocking path.
    pub(crate) fn is_over(self, started: Instant) -> bool {
        match self {
            Stall::None => true,
            Stall::For(duration) => started.elapsed() >= duration,
            Stall::Forever => false,
        }
    }
}

/// One result set returned by a scripted statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub(crate) labels: RowNames,
    pub(crate) rows: Vec<Row>,
    pub(crate) rows_affected: RowsAffected,
}

impl ResultSet {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
            rows_affected: RowsAffected::default(),
        }
    }

    pub fn row<I: IntoIterator<Item = Value>>(mut self, values: I) -> Self {
        self.rows.push(values.into_iter().collect());
        self
    }

    pub fn affected(mut self, rows: u64) -> Self {
        self.rows_affected.rows_affected = rows;
        self
    }

    pub fn last_affected_id(mut self, id: i64) -> Self {
        self.rows_affected.last_affected_id = Some(id);
        self
    }
}

/// Behavior of the server when it receives a given SQL text.
///
/// By default a statement completes immediately with no result set and honors cancel
/// requests.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub(crate) stall: Stall,
    pub(crate) responds_to_cancel: bool,
    pub(crate) fail_on_execute: Option<String>,
    pub(crate) fail_on_read: Option<(usize, String)>,
    pub(crate) stall_on_read: Option<(usize, Stall)>,
    pub(crate) result_sets: Vec<ResultSet>,
}

impl Default for Statement {
    fn default() -> Self {
        Self {
            stall: Stall::None,
            responds_to_cancel: true,
            fail_on_execute: None,
            fail_on_read: None,
            stall_on_read: None,
            result_sets: Vec::new(),
        }
    }
}

impl Statement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shortcut for a statement returning one result set.
    pub fn rows(result_set: ResultSet) -> Self {
        Self::new().result_set(result_set)
    }

    pub fn result_set(mut self, result_set: ResultSet) -> Self {
        self.result_sets.push(result_set);
        self
    }

    pub fn stall(mut self, stall: Stall) -> Self {
        self.stall = stall;
        self
    }

    pub fn stall_for(self, duration: Duration) -> Self {
        self.stall(Stall::For(duration))
    }

    pub fn stall_forever(self) -> Self {
        self.stall(Stall::Forever)
    }

    /// Simulate a server that is not reachable anymore: cancel requests and the cancellation
    /// signal are ignored, only closing the connection stops the command.
    pub fn ignore_cancel(mut self) -> Self {
        self.responds_to_cancel = false;
        self
    }

    /// Fail when the command is executed.
    pub fn fail(mut self, message: impl Into<String>) -> Self {
        self.fail_on_execute = Some(message.into());
        self
    }

    /// Fail when reading the row at `row` (from 0) of the first result set.
    pub fn fail_on_read(mut self, row: usize, message: impl Into<String>) -> Self {
        self.fail_on_read = Some((row, message.into()));
        self
    }

    /// Keep the server busy before it returns the row at `row` (from 0) of the first result set.
    pub fn stall_on_read(mut self, row: usize, stall: Stall) -> Self {
        self.stall_on_read = Some((row, stall));
        self
    }
}
