use parking_lot::Mutex;
use std::sync::Arc;
use tokio::{runtime::Handle, task::AbortHandle};
use tokio_util::sync::CancellationToken;

type Callback = Box<dyn FnOnce() + Send>;

/// Callback bound to a [`CancellationToken`], invoked at most once when the token fires.
///
/// [`CancelRegistration::dispose`] unregisters the callback. If the callback is running at that
/// moment, `dispose` waits for it to return, once `dispose` returned the callback will never run
/// and everything it captured has been dropped.
pub struct CancelRegistration {
    callback: Arc<Mutex<Option<Callback>>>,
    watcher: Option<AbortHandle>,
}

impl CancelRegistration {
    pub fn register<F>(token: &CancellationToken, runtime: &Handle, callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let callback: Arc<Mutex<Option<Callback>>> = Arc::new(Mutex::new(Some(Box::new(callback))));
        let watcher = runtime.spawn({
            let callback = Arc::clone(&callback);
            let token = token.clone();
            async move {
                token.cancelled().await;
                let mut slot = callback.lock();
                if let Some(callback) = slot.take() {
                    callback();
                }
            }
        });
        Self {
            callback,
            watcher: Some(watcher.abort_handle()),
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.watcher.is_none()
    }

    pub fn dispose(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
            let callback = self.callback.lock().take();
            drop(callback);
        }
    }
}

impl Drop for CancelRegistration {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn runs_once_when_canceled() {
        let token = CancellationToken::new();
        let count = Arc::new(AtomicUsize::new(0));
        let _registration = CancelRegistration::register(&token, &Handle::current(), {
            let count = count.clone();
            move || {
                count.fetch_add(1, Ordering::SeqCst);
            }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        token.cancel();
        token.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn disposed_never_runs() {
        let token = CancellationToken::new();
        let count = Arc::new(AtomicUsize::new(0));
        let mut registration = CancelRegistration::register(&token, &Handle::current(), {
            let count = count.clone();
            move || {
                count.fetch_add(1, Ordering::SeqCst);
            }
        });
        registration.dispose();
        assert!(registration.is_disposed());
        assert_eq!(Arc::strong_count(&count), 1);
        token.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
