use crate::{AsValue, Error, Result, Value, truncate_long};
use std::{
    fmt::{self, Display},
    time::Duration,
};

/// A statement ready to be executed: SQL text, positional parameters and an optional timeout
/// overriding [`QueryConfig::query_timeout`](crate::QueryConfig).
///
/// Methods return `&mut Self` for fluent chaining:
/// ```rust
/// # use sluice_core::Query;
/// let mut query = Query::new("SELECT * FROM users WHERE age > ? AND name <> ?");
/// query.bind(21).bind("root").timeout_secs(5);
/// assert_eq!(query.params().len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    sql: String,
    params: Vec<Value>,
    timeout: Option<Duration>,
}

impl Query {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            timeout: None,
        }
    }
    pub fn sql(&self) -> &str {
        &self.sql
    }
    pub fn params(&self) -> &[Value] {
        &self.params
    }
    pub fn timeout_override(&self) -> Option<Duration> {
        self.timeout
    }
    /// Append a parameter value.
    pub fn bind(&mut self, value: impl Into<Value>) -> &mut Self {
        self.params.push(value.into());
        self
    }
    /// Bind a value at a specific index (from 0).
    ///
    /// Binding past the end is allowed only for the position right after the last bound value.
    pub fn bind_index(&mut self, value: impl Into<Value>, index: usize) -> Result<&mut Self> {
        match index.cmp(&self.params.len()) {
            std::cmp::Ordering::Less => self.params[index] = value.into(),
            std::cmp::Ordering::Equal => self.params.push(value.into()),
            std::cmp::Ordering::Greater => {
                return Err(Error::msg(format!(
                    "Cannot bind index {index}, only {} parameters are bound",
                    self.params.len()
                )));
            }
        }
        Ok(self)
    }
    /// Bind a NULL carrying the type of `T`.
    pub fn bind_null<T: AsValue>(&mut self) -> &mut Self {
        self.params.push(T::as_empty_value());
        self
    }
    /// Remove all the previously bound values
    pub fn clear_bindings(&mut self) -> &mut Self {
        self.params.clear();
        self
    }
    pub fn timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = Some(timeout);
        self
    }
    pub fn timeout_secs(&mut self, seconds: u64) -> &mut Self {
        self.timeout(Duration::from_secs(seconds))
    }
}

impl From<&str> for Query {
    fn from(value: &str) -> Self {
        Query::new(value)
    }
}

impl From<String> for Query {
    fn from(value: String) -> Self {
        Query::new(value)
    }
}

impl Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", truncate_long!(self.sql))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_index_replaces_and_appends() {
        let mut query = Query::new("SELECT ?, ?");
        query.bind(1).bind("two");
        query.bind_index(10, 0).unwrap();
        query.bind_index(3.5, 2).unwrap();
        assert!(query.bind_index(false, 9).is_err());
        assert_eq!(
            query.params(),
            &[
                Value::Int32(Some(10)),
                Value::Varchar(Some("two".into())),
                Value::Float64(Some(3.5)),
            ]
        );
        query.clear_bindings();
        assert!(query.params().is_empty());
    }

    #[test]
    fn display_truncates_long_sql() {
        let sql = format!("SELECT '{}'", "x".repeat(1000));
        let shown = Query::new(sql).to_string();
        assert!(shown.len() <= 500);
        assert!(shown.ends_with("..."));
    }
}
