use std::time::Duration;

/// Default for both [`QueryConfig::query_timeout`] and the [`ClosePenalty`] window.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How long a connection may keep running a query after it was asked to stop, before it is
/// closed by force.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosePenalty {
    After(Duration),
    /// Wait indefinitely, the connection is never force-closed.
    Never,
}

impl ClosePenalty {
    /// `-1` (or any negative value) means [`ClosePenalty::Never`].
    pub fn from_secs(seconds: i64) -> Self {
        if seconds < 0 {
            ClosePenalty::Never
        } else {
            ClosePenalty::After(Duration::from_secs(seconds as u64))
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        match self {
            ClosePenalty::After(duration) => Some(*duration),
            ClosePenalty::Never => None,
        }
    }
}

impl Default for ClosePenalty {
    fn default() -> Self {
        ClosePenalty::After(DEFAULT_TIMEOUT)
    }
}

/// Settings applied to every query executed through a [`Database`](crate::Database).
///
/// Build it once at startup and hand it to the database:
/// ```rust
/// use sluice_core::{ClosePenalty, QueryConfig};
/// use std::time::Duration;
///
/// let config = QueryConfig::default()
///     .query_timeout(Duration::from_secs(10))
///     .close_penalty(ClosePenalty::from_secs(-1));
/// assert_eq!(config.close_penalty, ClosePenalty::Never);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryConfig {
    /// Time a query may run before it is canceled, unless the query overrides it.
    ///
    /// Default: 30 seconds
    pub query_timeout: Duration,
    /// Grace period between a cancellation (user or timeout) and the forced close.
    ///
    /// Default: 30 seconds
    pub close_penalty: ClosePenalty,
}

impl QueryConfig {
    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }
    pub fn query_timeout_secs(self, seconds: u64) -> Self {
        self.query_timeout(Duration::from_secs(seconds))
    }
    pub fn close_penalty(mut self, penalty: ClosePenalty) -> Self {
        self.close_penalty = penalty;
        self
    }
    pub fn close_penalty_secs(self, seconds: i64) -> Self {
        self.close_penalty(ClosePenalty::from_secs(seconds))
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            query_timeout: DEFAULT_TIMEOUT,
            close_penalty: ClosePenalty::default(),
        }
    }
}
