//! Guarded data access: fluent queries and row mapping over any [`Driver`], where a query that
//! overruns its timeout or is canceled never leaks a live connection.
//!
//! Cancellation is layered. When the query timeout elapses or the caller's token fires, the
//! server is asked to cancel the command, then a close penalty starts. A query still running
//! when the penalty expires has its connection closed by force, the connection is never pooled
//! again and the query fails with [`QueryError::ConnectionClosedAbnormally`].
pub use sluice_core::*;
