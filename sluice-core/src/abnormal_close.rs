use crate::{CancelRegistration, ClosePenalty, ConnectionCloser, DelayedAction};
use anyhow::Context;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

/// Watches a live connection while a query runs on it.
///
/// When the cancellation signal fires the connection is not closed right away: a countdown of
/// `penalty` starts, giving the query a chance to stop cooperatively. If the countdown expires
/// before the guard is disposed, the connection is closed by force.
///
/// [`AbnormalCloseGuard::dispose`] reports whether that happened, in which case the connection
/// is consumed and must not go back to a pool. With [`ClosePenalty::Never`] nothing is armed and
/// the connection is never force-closed.
pub struct AbnormalCloseGuard {
    close: Option<Arc<DelayedAction<Box<dyn ConnectionCloser>>>>,
    registration: Option<CancelRegistration>,
    abnormally_closed: bool,
    disposed: bool,
}

impl AbnormalCloseGuard {
    pub fn new(
        penalty: ClosePenalty,
        closer: Box<dyn ConnectionCloser>,
        signal: &CancellationToken,
        runtime: &Handle,
    ) -> Self {
        let ClosePenalty::After(penalty) = penalty else {
            return Self {
                close: None,
                registration: None,
                abnormally_closed: false,
                disposed: false,
            };
        };
        let close = Arc::new(DelayedAction::new(
            force_close,
            closer,
            penalty,
            runtime.clone(),
        ));
        let registration = CancelRegistration::register(signal, runtime, {
            let close = Arc::clone(&close);
            move || {
                if close.start() {
                    log::debug!(
                        "Query canceled, the connection will be closed in {:?} unless it stops",
                        close.due()
                    );
                }
            }
        });
        Self {
            close: Some(close),
            registration: Some(registration),
            abnormally_closed: false,
            disposed: false,
        }
    }

    /// True once disposal observed that the forced close already ran.
    pub fn abnormally_closed(&self) -> bool {
        self.abnormally_closed
    }

    /// Disarm the forced close and unregister from the signal, returns
    /// [`AbnormalCloseGuard::abnormally_closed`]. Waits if the forced close is running.
    pub fn dispose(&mut self) -> bool {
        if self.disposed {
            return self.abnormally_closed;
        }
        self.disposed = true;
        if let Some(close) = self.close.take() {
            if !close.try_cancel() {
                self.abnormally_closed = true;
            }
        }
        if let Some(mut registration) = self.registration.take() {
            registration.dispose();
        }
        self.abnormally_closed
    }
}

impl Drop for AbnormalCloseGuard {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn force_close(closer: Box<dyn ConnectionCloser>) {
    log::warn!("The query did not stop within the close penalty, closing the connection");
    if let Err(e) = closer
        .close()
        .context("Could not force-close the connection")
    {
        log::error!("{:#}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Result;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    struct Counting(Arc<AtomicUsize>);

    impl ConnectionCloser for Counting {
        fn close(&self) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn guard(penalty: ClosePenalty, token: &CancellationToken) -> (AbnormalCloseGuard, Arc<AtomicUsize>) {
        let closes = Arc::new(AtomicUsize::new(0));
        let guard = AbnormalCloseGuard::new(
            penalty,
            Box::new(Counting(closes.clone())),
            token,
            &Handle::current(),
        );
        (guard, closes)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn closes_after_the_penalty() {
        let token = CancellationToken::new();
        let (mut guard, closes) = guard(ClosePenalty::After(Duration::from_millis(20)), &token);
        token.cancel();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(guard.dispose());
        assert!(guard.abnormally_closed());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn disposed_within_the_penalty() {
        let token = CancellationToken::new();
        let (mut guard, closes) = guard(ClosePenalty::After(Duration::from_millis(200)), &token);
        token.cancel();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!guard.dispose());
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn never_closes() {
        let token = CancellationToken::new();
        let (mut guard, closes) = guard(ClosePenalty::Never, &token);
        token.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!guard.dispose());
        assert_eq!(closes.load(Ordering::SeqCst), 0);
    }
}
