use crate::{AsValue, Error, FromRow, Reader, Result, RowLabeled, RowsAffected};
use std::{any, future::Future, marker::PhantomData};
use tokio_util::sync::CancellationToken;

/// Turns the reader of an executed command into the result of a query.
///
/// Projections run while the query is still guarded: a projection that stalls on a row is
/// subject to the same timeout, cancellation and close penalty as the command itself. The
/// async form receives the cancellation signal of the query and must forward it to the reader.
pub trait Projection: Send + Sized {
    type Output: Send;

    fn project<R: Reader>(self, reader: &mut R) -> Result<Self::Output>;

    fn project_async<R: Reader>(
        self,
        reader: &mut R,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<Self::Output>> + Send;
}

macro_rules! marker_projection {
    ($name:ident) => {
        impl<T> $name<T> {
            pub fn new() -> Self {
                Self(PhantomData)
            }
        }
        impl<T> Default for $name<T> {
            fn default() -> Self {
                Self::new()
            }
        }
        impl<T> Clone for $name<T> {
            fn clone(&self) -> Self {
                Self::new()
            }
        }
        impl<T> Copy for $name<T> {}
    };
}

/// Every row of the first result set.
#[derive(Debug)]
pub struct AllRows<T>(PhantomData<fn() -> T>);
marker_projection!(AllRows);

/// The first row of the first result set, the remaining rows are not read.
#[derive(Debug)]
pub struct FirstRow<T>(PhantomData<fn() -> T>);
marker_projection!(FirstRow);

/// At most one row, more than one is an error.
#[derive(Debug)]
pub struct SingleRow<T>(PhantomData<fn() -> T>);
marker_projection!(SingleRow);

/// First column of the first row, `None` when the query returns no rows.
#[derive(Debug)]
pub struct Scalar<T>(PhantomData<fn() -> T>);
marker_projection!(Scalar);

/// Every row of every result set.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResultSets;

/// Rows affected, summed over all the result sets.
#[derive(Debug, Default, Clone, Copy)]
pub struct Affected;

impl<T: FromRow + Send> Projection for AllRows<T> {
    type Output = Vec<T>;

    fn project<R: Reader>(self, reader: &mut R) -> Result<Vec<T>> {
        let mut rows = Vec::new();
        while reader.read()? {
            rows.push(T::from_row(reader.current_row()?)?);
        }
        Ok(rows)
    }

    fn project_async<R: Reader>(
        self,
        reader: &mut R,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<Vec<T>>> + Send {
        async move {
            let mut rows = Vec::new();
            while reader.read_async(cancel.clone()).await? {
                rows.push(T::from_row(reader.current_row()?)?);
            }
            Ok(rows)
        }
    }
}

impl<T: FromRow + Send> Projection for FirstRow<T> {
    type Output = Option<T>;

    fn project<R: Reader>(self, reader: &mut R) -> Result<Option<T>> {
        if !reader.read()? {
            return Ok(None);
        }
        T::from_row(reader.current_row()?).map(Some)
    }

    fn project_async<R: Reader>(
        self,
        reader: &mut R,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<Option<T>>> + Send {
        async move {
            if !reader.read_async(cancel).await? {
                return Ok(None);
            }
            T::from_row(reader.current_row()?).map(Some)
        }
    }
}

fn more_than_one<T>() -> Error {
    Error::msg(format!(
        "Expected at most one row to decode {}, the query returned more",
        any::type_name::<T>()
    ))
}

impl<T: FromRow + Send> Projection for SingleRow<T> {
    type Output = Option<T>;

    fn project<R: Reader>(self, reader: &mut R) -> Result<Option<T>> {
        if !reader.read()? {
            return Ok(None);
        }
        let row = reader.current_row()?;
        if reader.read()? {
            return Err(more_than_one::<T>());
        }
        T::from_row(row).map(Some)
    }

    fn project_async<R: Reader>(
        self,
        reader: &mut R,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<Option<T>>> + Send {
        async move {
            if !reader.read_async(cancel.clone()).await? {
                return Ok(None);
            }
            let row = reader.current_row()?;
            if reader.read_async(cancel).await? {
                return Err(more_than_one::<T>());
            }
            T::from_row(row).map(Some)
        }
    }
}

fn first_column<T: AsValue>(row: RowLabeled) -> Result<T> {
    if row.is_empty() {
        return Err(Error::msg(format!(
            "Cannot decode {} from a row without columns",
            any::type_name::<T>()
        )));
    }
    row.decode(0)
}

impl<T: AsValue + Send> Projection for Scalar<T> {
    type Output = Option<T>;

    fn project<R: Reader>(self, reader: &mut R) -> Result<Option<T>> {
        if !reader.read()? {
            return Ok(None);
        }
        first_column(reader.current_row()?).map(Some)
    }

    fn project_async<R: Reader>(
        self,
        reader: &mut R,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<Option<T>>> + Send {
        async move {
            if !reader.read_async(cancel).await? {
                return Ok(None);
            }
            first_column(reader.current_row()?).map(Some)
        }
    }
}

impl Projection for ResultSets {
    type Output = Vec<Vec<RowLabeled>>;

    fn project<R: Reader>(self, reader: &mut R) -> Result<Self::Output> {
        let mut sets = Vec::new();
        loop {
            sets.push(AllRows::<RowLabeled>::new().project(reader)?);
            if !reader.next_result()? {
                return Ok(sets);
            }
        }
    }

    fn project_async<R: Reader>(
        self,
        reader: &mut R,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<Self::Output>> + Send {
        async move {
            let mut sets = Vec::new();
            loop {
                sets.push(
                    AllRows::<RowLabeled>::new()
                        .project_async(reader, cancel.clone())
                        .await?,
                );
                if !reader.next_result_async(cancel.clone()).await? {
                    return Ok(sets);
                }
            }
        }
    }
}

impl Projection for Affected {
    type Output = RowsAffected;

    fn project<R: Reader>(self, reader: &mut R) -> Result<RowsAffected> {
        let mut total = RowsAffected::default();
        loop {
            // Rows returned by the statement are skipped
            while reader.read()? {}
            total.extend([reader.rows_affected()]);
            if !reader.next_result()? {
                return Ok(total);
            }
        }
    }

    fn project_async<R: Reader>(
        self,
        reader: &mut R,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<RowsAffected>> + Send {
        async move {
            let mut total = RowsAffected::default();
            loop {
                while reader.read_async(cancel.clone()).await? {}
                total.extend([reader.rows_affected()]);
                if !reader.next_result_async(cancel.clone()).await? {
                    return Ok(total);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RowNames, Value};

    /// Reader over in-memory result sets.
    struct Sets {
        sets: Vec<(RowNames, Vec<Vec<Value>>, u64)>,
        set: usize,
        row: Option<usize>,
    }

    impl Sets {
        fn new(sets: Vec<(RowNames, Vec<Vec<Value>>, u64)>) -> Self {
            Self {
                sets,
                set: 0,
                row: None,
            }
        }
    }

    impl Reader for Sets {
        fn read(&mut self) -> Result<bool> {
            let next = self.row.map_or(0, |v| v + 1);
            self.row = Some(next);
            Ok(next < self.sets[self.set].1.len())
        }
        fn read_async(
            &mut self,
            _cancel: CancellationToken,
        ) -> impl Future<Output = Result<bool>> + Send {
            let result = self.read();
            async move { result }
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
            let result = self.next_result();
            async move { result }
        }
        fn labels(&self) -> RowNames {
            self.sets[self.set].0.clone()
        }
        fn get(&self, ordinal: usize) -> Result<Value> {
            let row = self.row.unwrap_or(0);
            Ok(self.sets[self.set].1[row][ordinal].clone())
        }
        fn rows_affected(&self) -> RowsAffected {
            RowsAffected {
                rows_affected: self.sets[self.set].2,
                last_affected_id: None,
            }
        }
    }

    fn numbers(values: &[i32]) -> (RowNames, Vec<Vec<Value>>, u64) {
        (
            ["n".to_string()].into(),
            values.iter().map(|v| vec![Value::Int32(Some(*v))]).collect(),
            0,
        )
    }

    #[test]
    fn rows() {
        let all = AllRows::<(i32,)>::new()
            .project(&mut Sets::new(vec![numbers(&[1, 2, 3])]))
            .unwrap();
        assert_eq!(all, [(1,), (2,), (3,)]);
        let first = FirstRow::<(i64,)>::new()
            .project(&mut Sets::new(vec![numbers(&[4, 5])]))
            .unwrap();
        assert_eq!(first, Some((4,)));
        let none = FirstRow::<(i64,)>::new()
            .project(&mut Sets::new(vec![numbers(&[])]))
            .unwrap();
        assert_eq!(none, None);
    }

    #[test]
    fn single_row_rejects_many() {
        let one = SingleRow::<(i32,)>::new()
            .project(&mut Sets::new(vec![numbers(&[9])]))
            .unwrap();
        assert_eq!(one, Some((9,)));
        assert!(
            SingleRow::<(i32,)>::new()
                .project(&mut Sets::new(vec![numbers(&[1, 2])]))
                .is_err()
        );
    }

    #[test]
    fn scalar() {
        let value = Scalar::<u8>::new()
            .project(&mut Sets::new(vec![numbers(&[200])]))
            .unwrap();
        assert_eq!(value, Some(200));
        assert!(
            Scalar::<i8>::new()
                .project(&mut Sets::new(vec![numbers(&[200])]))
                .is_err()
        );
    }

    #[tokio::test]
    async fn every_result_set() {
        let mut reader = Sets::new(vec![numbers(&[1]), numbers(&[]), numbers(&[2, 3])]);
        let sets = ResultSets
            .project_async(&mut reader, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            sets.iter().map(Vec::len).collect::<Vec<_>>(),
            [1usize, 0, 2]
        );
        assert_eq!(sets[2][1].decode::<i32>(0).unwrap(), 3);
    }

    #[tokio::test]
    async fn affected_sums_every_set() {
        let mut first = numbers(&[]);
        first.2 = 2;
        let mut second = numbers(&[7]);
        second.2 = 5;
        let total = Affected
            .project_async(&mut Sets::new(vec![first, second]), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(total.rows_affected, 7);
    }
}
