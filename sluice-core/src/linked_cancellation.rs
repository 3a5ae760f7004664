use std::{
    sync::{Arc, OnceLock},
    time::Duration,
};
use tokio::{runtime::Handle, task::AbortHandle};
use tokio_util::sync::CancellationToken;

/// Which source canceled a [`LinkedCancellation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelSource {
    /// The token supplied by the caller.
    User,
    /// The query timeout elapsed.
    Timeout,
}

/// Single cancellation signal combining the caller's token with the query timeout.
///
/// The signal fires as soon as either source fires and remembers which one did, so the outcome
/// of a query can be classified without comparing tokens after the fact. When both become ready
/// at the same instant the timeout wins.
pub struct LinkedCancellation {
    user: CancellationToken,
    linked: CancellationToken,
    source: Arc<OnceLock<CancelSource>>,
    timeout: Duration,
    watcher: Option<AbortHandle>,
}

impl LinkedCancellation {
    pub fn new(user: CancellationToken, timeout: Duration, runtime: &Handle) -> Self {
        let linked = CancellationToken::new();
        let source = Arc::new(OnceLock::new());
        let watcher = if user.is_cancelled() {
            let _ = source.set(CancelSource::User);
            linked.cancel();
            None
        } else {
            let task = runtime.spawn({
                let user = user.clone();
                let linked = linked.clone();
                let source = Arc::clone(&source);
                async move {
                    let fired = tokio::select! {
                        biased;
                        _ = tokio::time::sleep(timeout) => CancelSource::Timeout,
                        _ = user.cancelled() => CancelSource::User,
                    };
                    log::debug!("Query canceled by {:?}", fired);
                    let _ = source.set(fired);
                    linked.cancel();
                }
            });
            Some(task.abort_handle())
        };
        Self {
            user,
            linked,
            source,
            timeout,
            watcher,
        }
    }

    /// The combined signal, hand this to the operations the query performs.
    pub fn token(&self) -> CancellationToken {
        self.linked.clone()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_cancelled(&self) -> bool {
        self.linked.is_cancelled()
    }

    /// The source that fired first, `None` while the signal is not canceled.
    pub fn source(&self) -> Option<CancelSource> {
        self.source.get().copied()
    }

    /// True if the caller's token was canceled, no matter what fired first.
    pub fn user_requested(&self) -> bool {
        self.user.is_cancelled()
    }
}

impl Drop for LinkedCancellation {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn timeout_fires() {
        let user = CancellationToken::new();
        let linked = LinkedCancellation::new(user.clone(), Duration::from_millis(20), &Handle::current());
        assert_eq!(linked.source(), None);
        linked.token().cancelled().await;
        assert_eq!(linked.source(), Some(CancelSource::Timeout));
        assert!(!linked.user_requested());
    }

    #[tokio::test]
    async fn user_fires() {
        let user = CancellationToken::new();
        let linked = LinkedCancellation::new(user.clone(), Duration::from_secs(30), &Handle::current());
        user.cancel();
        linked.token().cancelled().await;
        assert_eq!(linked.source(), Some(CancelSource::User));
        assert!(linked.user_requested());
    }

    #[tokio::test]
    async fn already_canceled_user_token() {
        let user = CancellationToken::new();
        user.cancel();
        let linked = LinkedCancellation::new(user, Duration::ZERO, &Handle::current());
        assert!(linked.is_cancelled());
        assert_eq!(linked.source(), Some(CancelSource::User));
    }

    #[tokio::test]
    async fn dropping_stops_the_timer() {
        let linked = LinkedCancellation::new(
            CancellationToken::new(),
            Duration::from_millis(10),
            &Handle::current(),
        );
        let token = linked.token();
        drop(linked);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!token.is_cancelled());
    }
}
