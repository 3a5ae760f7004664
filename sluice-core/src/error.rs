use crate::{ClosePenalty, OperationCanceled};
use std::time::Duration;

/// Outcome of a failed query.
///
/// Whatever error the driver raised, a query executed through a
/// [`Database`](crate::Database) fails with one of these variants. They are classified once,
/// after the guards watching the query were disposed, in this order of priority:
/// 1. [`QueryError::ConnectionClosedAbnormally`]
/// 2. [`QueryError::QueryTimeout`]
/// 3. [`QueryError::Canceled`]
/// 4. [`QueryError::Driver`], the original error unchanged.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// The connection was closed by force because the query kept running past the close penalty.
    #[error(
        "The connection was closed abnormally: the query did not stop within the close penalty ({close_penalty:?}) after being canceled (query timeout {query_timeout:?})"
    )]
    ConnectionClosedAbnormally {
        query_timeout: Duration,
        close_penalty: ClosePenalty,
        #[source]
        source: anyhow::Error,
    },

    /// The query timeout elapsed before the query completed.
    #[error("The query did not complete within the timeout of {timeout:?}")]
    QueryTimeout {
        timeout: Duration,
        #[source]
        source: anyhow::Error,
    },

    /// The caller canceled the query. `source` is `None` when the driver reported a plain
    /// cancellation and there is nothing more to tell.
    #[error("The query was canceled")]
    Canceled {
        #[source]
        source: Option<anyhow::Error>,
    },

    /// Blocking execution was requested without a tokio runtime able to drive the timers while
    /// the calling thread waits.
    #[error(
        "Blocking execution requires a tokio runtime driving the timers on other threads, none was configured or found"
    )]
    MissingRuntime,

    /// Any other error, as raised by the driver or the row mapping.
    #[error(transparent)]
    Driver(#[from] anyhow::Error),
}

/// Discriminant of [`QueryError`], for retry and alerting logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryErrorKind {
    ConnectionClosedAbnormally,
    QueryTimeout,
    Canceled,
    MissingRuntime,
    Driver,
}

impl QueryError {
    pub fn kind(&self) -> QueryErrorKind {
        match self {
            QueryError::ConnectionClosedAbnormally { .. } => {
                QueryErrorKind::ConnectionClosedAbnormally
            }
            QueryError::QueryTimeout { .. } => QueryErrorKind::QueryTimeout,
            QueryError::Canceled { .. } => QueryErrorKind::Canceled,
            QueryError::MissingRuntime => QueryErrorKind::MissingRuntime,
            QueryError::Driver(..) => QueryErrorKind::Driver,
        }
    }

    /// Machine-readable code of the error.
    pub fn error_code(&self) -> &'static str {
        match self.kind() {
            QueryErrorKind::ConnectionClosedAbnormally => "CONNECTION_CLOSED_ABNORMALLY",
            QueryErrorKind::QueryTimeout => "QUERY_TIMEOUT",
            QueryErrorKind::Canceled => "CANCELED",
            QueryErrorKind::MissingRuntime => "MISSING_RUNTIME",
            QueryErrorKind::Driver => "DRIVER_ERROR",
        }
    }

    /// True for the cancellation that carries no underlying error.
    pub fn is_clean_cancel(&self) -> bool {
        matches!(self, QueryError::Canceled { source: None })
    }

    pub(crate) fn canceled(error: anyhow::Error) -> Self {
        if OperationCanceled::is(&error) {
            QueryError::Canceled { source: None }
        } else {
            QueryError::Canceled {
                source: Some(error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn plain_cancellation_is_clean() {
        let error = QueryError::canceled(OperationCanceled::error());
        assert!(error.is_clean_cancel());
        assert_eq!(error.kind(), QueryErrorKind::Canceled);
        assert!(std::error::Error::source(&error).is_none());
    }

    #[test]
    fn cancellation_with_context_keeps_it() {
        let error = QueryError::canceled(
            Err::<(), _>(OperationCanceled::error())
                .context("While reading the rows")
                .unwrap_err(),
        );
        assert!(!error.is_clean_cancel());
        let QueryError::Canceled { source: Some(source) } = &error else {
            panic!("Expected a cancellation with context, got {error:?}");
        };
        assert!(source.to_string().contains("While reading the rows"));
    }

    #[test]
    fn error_codes() {
        let error = QueryError::QueryTimeout {
            timeout: Duration::from_secs(1),
            source: OperationCanceled::error(),
        };
        assert_eq!(error.error_code(), "QUERY_TIMEOUT");
        assert!(error.to_string().contains("1s"));
        let error = QueryError::ConnectionClosedAbnormally {
            query_timeout: Duration::from_secs(30),
            close_penalty: ClosePenalty::from_secs(2),
            source: anyhow::Error::msg("connection reset"),
        };
        assert_eq!(error.error_code(), "CONNECTION_CLOSED_ABNORMALLY");
        assert!(error.to_string().contains("2s"));
        assert_eq!(
            QueryError::Driver(anyhow::Error::msg("syntax error")).to_string(),
            "syntax error"
        );
    }
}
