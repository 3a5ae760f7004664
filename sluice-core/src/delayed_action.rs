use parking_lot::{Condvar, Mutex};
use std::{
    fmt::{self, Debug},
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc, Weak,
        atomic::{AtomicI8, Ordering},
    },
    time::Duration,
};
use tokio::{runtime::Handle, task::AbortHandle};

const NOT_SCHEDULED: i8 = -1;
const SCHEDULED: i8 = 0;
const FIRED: i8 = 1;
const CANCELED: i8 = 2;

/// Lifecycle of a [`DelayedAction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayedActionState {
    NotScheduled,
    Scheduled,
    Fired,
    Canceled,
}

impl DelayedActionState {
    fn from_raw(state: i8) -> Self {
        match state {
            NOT_SCHEDULED => DelayedActionState::NotScheduled,
            SCHEDULED => DelayedActionState::Scheduled,
            FIRED => DelayedActionState::Fired,
            _ => DelayedActionState::Canceled,
        }
    }
}

/// One-shot, cancelable callback executed once `due` elapsed after [`DelayedAction::start`].
///
/// The state moves from `NotScheduled` to `Scheduled` when started, then to exactly one of
/// `Fired` or `Canceled`. Whichever side wins the transition owns the callback:
/// - The callback is invoked at most once, with the context given at construction.
/// - The timer is disposed exactly once, by the side that won.
/// - [`DelayedAction::try_cancel`] never returns while the callback is running, when it loses
///   the race it waits for the callback to complete and returns `false`.
///
/// The timer is a task on the given runtime, the callback itself runs on the blocking pool
/// because it is allowed to block.
pub struct DelayedAction<T: Send + 'static> {
    shared: Arc<Shared<T>>,
}

struct Shared<T> {
    state: AtomicI8,
    due: Duration,
    runtime: Handle,
    slot: Mutex<Slot<T>>,
    finished: Condvar,
}

struct Slot<T> {
    timer: Option<AbortHandle>,
    callback: Option<Box<dyn FnOnce(T) + Send>>,
    context: Option<T>,
    completed: bool,
}

impl<T: Send + 'static> DelayedAction<T> {
    /// Does not start the timer, see [`DelayedAction::start`].
    pub fn new<F>(callback: F, context: T, due: Duration, runtime: Handle) -> Self
    where
        F: FnOnce(T) + Send + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                state: AtomicI8::new(NOT_SCHEDULED),
                due,
                runtime,
                slot: Mutex::new(Slot {
                    timer: None,
                    callback: Some(Box::new(callback)),
                    context: Some(context),
                    completed: false,
                }),
                finished: Condvar::new(),
            }),
        }
    }

    pub fn state(&self) -> DelayedActionState {
        DelayedActionState::from_raw(self.shared.state.load(Ordering::Acquire))
    }

    pub fn due(&self) -> Duration {
        self.shared.due
    }

    /// Arm the timer. Returns `true` only for the call that performed the transition, every
    /// other call (second start, start after cancel) returns `false` and schedules nothing.
    pub fn start(&self) -> bool {
        // The lock covers the transition and the timer registration, so a concurrent cancel
        // always finds the timer it has to dispose.
        let mut slot = self.shared.slot.lock();
        if self
            .shared
            .state
            .compare_exchange(NOT_SCHEDULED, SCHEDULED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        let shared = Arc::downgrade(&self.shared);
        let due = self.shared.due;
        let timer = self.shared.runtime.spawn(async move {
            tokio::time::sleep(due).await;
            let fired = tokio::task::spawn_blocking(move || Shared::fire(shared)).await;
            if let Err(e) = fired {
                log::error!("Delayed action could not run: {:#}", e);
            }
        });
        slot.timer = Some(timer.abort_handle());
        true
    }

    /// Prevent the callback from running.
    ///
    /// Returns `true` if the action was not started, was still pending or was already canceled.
    /// Returns `false` if the callback fired, after waiting for it to complete.
    pub fn try_cancel(&self) -> bool {
        let shared = &self.shared;
        let mut state = shared.state.load(Ordering::Acquire);
        loop {
            match state {
                CANCELED => return true,
                FIRED => {
                    let mut slot = shared.slot.lock();
                    while !slot.completed {
                        shared.finished.wait(&mut slot);
                    }
                    return false;
                }
                _ => match shared.state.compare_exchange(
                    state,
                    CANCELED,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => {
                        let (callback, context) = {
                            let mut slot = shared.slot.lock();
                            if let Some(timer) = slot.timer.take() {
                                timer.abort();
                            }
                            (slot.callback.take(), slot.context.take())
                        };
                        drop(callback);
                        drop(context);
                        return true;
                    }
                    Err(actual) => state = actual,
                },
            }
        }
    }
}

impl<T> Shared<T> {
    fn fire(shared: Weak<Self>) {
        let Some(shared) = shared.upgrade() else {
            return;
        };
        if shared
            .state
            .compare_exchange(SCHEDULED, FIRED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let mut slot = shared.slot.lock();
        // Running inside the timer task, dropping the handle is the disposal
        slot.timer.take();
        if let (Some(callback), Some(context)) = (slot.callback.take(), slot.context.take()) {
            if panic::catch_unwind(AssertUnwindSafe(|| callback(context))).is_err() {
                log::error!("Delayed action callback panicked");
            }
        }
        slot.completed = true;
        shared.finished.notify_all();
    }
}

impl<T: Send + 'static> Drop for DelayedAction<T> {
    fn drop(&mut self) {
        self.try_cancel();
    }
}

impl<T: Send + 'static> Debug for DelayedAction<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelayedAction")
            .field("state", &self.state())
            .field("due", &self.shared.due)
            .finish()
    }
}
