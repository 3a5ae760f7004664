use crate::{
    ResultSet, Stall, Statement,
    command::{POLL, canceled_by_server},
};
use sluice_core::{
    CancellationToken, Error, OperationCanceled, Reader, Result, RowNames, RowsAffected, Value,
    future,
};
use std::{future::Future, thread, time::Instant};

pub struct ScriptedReader {
    sets: Vec<ResultSet>,
    set: usize,
    row: Option<usize>,
    fail_on_read: Option<(usize, String)>,
    stall_on_read: Option<(usize, Stall)>,
    responds_to_cancel: bool,
    closed: CancellationToken,
    canceled: CancellationToken,
}

fn closed_while_reading() -> Error {
    Error::msg("The connection was closed while reading")
}

impl ScriptedReader {
    pub(crate) fn new(
        statement: &Statement,
        closed: CancellationToken,
        canceled: CancellationToken,
    ) -> Self {
        Self {
            sets: statement.result_sets.clone(),
            set: 0,
            row: None,
            fail_on_read: statement.fail_on_read.clone(),
            stall_on_read: statement.stall_on_read,
            responds_to_cancel: statement.responds_to_cancel,
            closed,
            canceled,
        }
    }

    fn current(&self) -> Option<&ResultSet> {
        self.sets.get(self.set)
    }

    fn next_row(&self) -> usize {
        self.row.map_or(0, |v| v + 1)
    }

    /// The stall scripted before the next row, handed out once.
    fn take_stall(&mut self) -> Option<Stall> {
        match self.stall_on_read {
            Some((row, stall)) if self.set == 0 && row == self.next_row() => {
                self.stall_on_read = None;
                Some(stall)
            }
            _ => None,
        }
    }

    fn stall_blocking(&self, stall: Stall) -> Result<()> {
        let started = Instant::now();
        loop {
            if self.closed.is_cancelled() {
                return Err(closed_while_reading());
            }
            if self.responds_to_cancel && self.canceled.is_cancelled() {
                return Err(canceled_by_server());
            }
            if stall.is_over(started) {
                return Ok(());
            }
            thread::sleep(POLL);
        }
    }

    fn advance(&mut self) -> Result<bool> {
        if self.closed.is_cancelled() {
            return Err(closed_while_reading());
        }
        let Some(len) = self.current().map(|v| v.rows.len()) else {
            return Ok(false);
        };
        let next = self.next_row().min(len);
        self.row = Some(next);
        match &self.fail_on_read {
            Some((row, message)) if self.set == 0 && *row == next => {
                return Err(Error::msg(message.clone()));
            }
            _ => {}
        }
        Ok(next < len)
    }
}

impl Reader for ScriptedReader {
    fn read(&mut self) -> Result<bool> {
        if let Some(stall) = self.take_stall() {
            self.stall_blocking(stall)?;
        }
        self.advance()
    }

    async fn read_async(&mut self, cancel: CancellationToken) -> Result<bool> {
        let responds = self.responds_to_cancel;
        match self.take_stall() {
            Some(stall) => {
                tokio::select! {
                    biased;
                    _ = self.closed.cancelled() => return Err(closed_while_reading()),
                    _ = cancel.cancelled(), if responds => return Err(OperationCanceled::error()),
                    _ = self.canceled.cancelled(), if responds => return Err(canceled_by_server()),
                    _ = stall.elapse() => {}
                }
            }
            None if responds && cancel.is_cancelled() => return Err(OperationCanceled::error()),
            None => {}
        }
        self.advance()
    }

    fn next_result(&mut self) -> Result<bool> {
        if self.set + 1 >= self.sets.len() {
            return Ok(false);
        }
        self.set += 1;
        self.row = None;
        Ok(true)
    }

    fn next_result_async(
        &mut self,
        _cancel: CancellationToken,
    ) -> impl Future<Output = Result<bool>> + Send {
        future::ready(self.next_result())
    }

    fn labels(&self) -> RowNames {
        self.current()
            .map(|v| v.labels.clone())
            .unwrap_or_default()
    }

    fn get(&self, ordinal: usize) -> Result<Value> {
        let value = self
            .current()
            .zip(self.row)
            .and_then(|(set, row)| set.rows.get(row))
            .and_then(|row| row.get(ordinal));
        match value {
            Some(value) => Ok(value.clone()),
            None => Err(Error::msg(format!(
                "There is no value at column {ordinal} of the current row"
            ))),
        }
    }

    fn rows_affected(&self) -> RowsAffected {
        self.current().map(|v| v.rows_affected).unwrap_or_default()
    }
}
