use crate::{AsValue, Error, Result, Value};
use anyhow::Context;
use std::{any, sync::Arc};

/// Shared reference-counted column name list.
pub type RowNames = Arc<[String]>;
/// Owned row value slice matching `RowNames` length.
pub type Row = Box<[Value]>;

/// A result row with its corresponding column labels.
#[derive(Debug, Clone, PartialEq)]
pub struct RowLabeled {
    /// Column names.
    pub labels: RowNames,
    /// Data values (aligned by index with `labels`).
    pub values: Row,
}

impl RowLabeled {
    pub fn new(names: RowNames, values: Row) -> Self {
        Self {
            labels: names,
            values,
        }
    }
    pub fn names(&self) -> &[String] {
        &self.labels
    }
    pub fn values(&self) -> &[Value] {
        &self.values
    }
    pub fn len(&self) -> usize {
        self.values.len()
    }
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
    pub fn get(&self, ordinal: usize) -> Option<&Value> {
        self.values.get(ordinal)
    }
    pub fn get_column(&self, name: &str) -> Option<&Value> {
        self.labels
            .iter()
            .position(|v| v == name)
            .and_then(|i| self.values.get(i))
    }
    /// Decode the column at `ordinal`.
    pub fn decode<T: AsValue>(&self, ordinal: usize) -> Result<T> {
        let Some(value) = self.values.get(ordinal) else {
            return Err(Error::msg(format!(
                "Column {ordinal} does not exist, the row has {} columns",
                self.values.len()
            )));
        };
        T::try_from_value(value.clone()).with_context(|| {
            format!(
                "While decoding column {} (`{}`) as {}",
                ordinal,
                self.labels.get(ordinal).map(String::as_str).unwrap_or("?"),
                any::type_name::<T>()
            )
        })
    }
    /// Decode the column named `name`.
    pub fn decode_column<T: AsValue>(&self, name: &str) -> Result<T> {
        let Some(ordinal) = self.labels.iter().position(|v| v == name) else {
            return Err(Error::msg(format!("Column `{name}` is not part of the row")));
        };
        self.decode(ordinal)
    }
}

impl From<RowLabeled> for Row {
    fn from(value: RowLabeled) -> Self {
        value.values
    }
}

/// Metadata about modify operations (INSERT/UPDATE/DELETE).
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowsAffected {
    /// Total number of rows impacted.
    pub rows_affected: u64,
    /// Backend-specific last inserted / affected identifier when available.
    pub last_affected_id: Option<i64>,
}

impl Extend<RowsAffected> for RowsAffected {
    fn extend<T: IntoIterator<Item = RowsAffected>>(&mut self, iter: T) {
        for elem in iter {
            self.rows_affected += elem.rows_affected;
            if elem.last_affected_id.is_some() {
                self.last_affected_id = elem.last_affected_id;
            }
        }
    }
}

/// Row decoder: builds a typed value out of a labeled row.
///
/// The execution layer never needs to know how an implementation is produced. Write it by
/// hand, generate it, or rely on the provided implementations:
/// - `RowLabeled` itself (identity).
/// - Tuples up to 8 elements, decoded positionally.
///
/// Single values are read through [`Scalar`](crate::Scalar), which decodes the first column.
pub trait FromRow: Sized {
    fn from_row(row: RowLabeled) -> Result<Self>;
}

impl FromRow for RowLabeled {
    fn from_row(row: RowLabeled) -> Result<Self> {
        Ok(row)
    }
}

macro_rules! impl_from_row_tuple {
    ($len:literal; $($name:ident: $index:tt),+) => {
        impl<$($name: AsValue),+> FromRow for ($($name,)+) {
            fn from_row(row: RowLabeled) -> Result<Self> {
                if row.len() < $len {
                    return Err(Error::msg(format!(
                        "Expected at least {} columns to decode {}, the row has {}",
                        $len,
                        any::type_name::<Self>(),
                        row.len()
                    )));
                }
                Ok(($(row.decode::<$name>($index)?,)+))
            }
        }
    };
}

impl_from_row_tuple!(1; A: 0);
impl_from_row_tuple!(2; A: 0, B: 1);
impl_from_row_tuple!(3; A: 0, B: 1, C: 2);
impl_from_row_tuple!(4; A: 0, B: 1, C: 2, D: 3);
impl_from_row_tuple!(5; A: 0, B: 1, C: 2, D: 3, E: 4);
impl_from_row_tuple!(6; A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);
impl_from_row_tuple!(7; A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6);
impl_from_row_tuple!(8; A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7);
