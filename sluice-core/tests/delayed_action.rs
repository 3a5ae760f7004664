#[cfg(test)]
mod tests {
    use sluice_core::{DelayedAction, DelayedActionState};
    use sluice_scripted::init_logs;
    use std::{
        sync::{
            Arc,
            atomic::{AtomicBool, AtomicUsize, Ordering},
        },
        thread,
        time::Duration,
    };
    use tokio::runtime::Handle;

    fn counting(count: &Arc<AtomicUsize>, due: Duration) -> Arc<DelayedAction<Arc<AtomicUsize>>> {
        Arc::new(DelayedAction::new(
            |count: Arc<AtomicUsize>| {
                count.fetch_add(1, Ordering::SeqCst);
            },
            count.clone(),
            due,
            Handle::current(),
        ))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn fires_at_most_once() {
        init_logs();
        for i in 0..200u64 {
            let count = Arc::new(AtomicUsize::new(0));
            let action = counting(&count, Duration::from_micros(i * 10));
            let starter = thread::spawn({
                let action = action.clone();
                move || {
                    action.start();
                    action.start();
                }
            });
            let canceler = thread::spawn({
                let action = action.clone();
                move || {
                    thread::sleep(Duration::from_micros(i * 10));
                    action.try_cancel()
                }
            });
            starter.join().expect("Starter panicked");
            let canceled = canceler.join().expect("Canceler panicked");
            tokio::time::sleep(Duration::from_millis(5)).await;
            let fired = count.load(Ordering::SeqCst);
            assert!(fired <= 1, "Iteration {i} fired {fired} times");
            if canceled {
                assert_eq!(fired, 0, "Iteration {i} was canceled but fired");
                assert_eq!(action.state(), DelayedActionState::Canceled);
            } else {
                assert_eq!(fired, 1, "Iteration {i} could not cancel but did not fire");
                assert_eq!(action.state(), DelayedActionState::Fired);
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn cancel_waits_for_the_running_callback() {
        init_logs();
        let running = Arc::new(AtomicBool::new(false));
        let done = Arc::new(AtomicBool::new(false));
        let action = Arc::new(DelayedAction::new(
            {
                let running = running.clone();
                move |done: Arc<AtomicBool>| {
                    running.store(true, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(300));
                    done.store(true, Ordering::SeqCst);
                }
            },
            done.clone(),
            Duration::from_millis(10),
            Handle::current(),
        ));
        assert!(action.start());
        while !running.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let canceled = tokio::task::spawn_blocking({
            let action = action.clone();
            let done = done.clone();
            move || (action.try_cancel(), done.load(Ordering::SeqCst))
        })
        .await
        .expect("Cancel panicked");
        assert_eq!(canceled, (false, true));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancel_is_idempotent() {
        init_logs();
        let count = Arc::new(AtomicUsize::new(0));
        let action = counting(&count, Duration::from_millis(50));
        assert!(action.start());
        assert!(action.try_cancel());
        assert!(action.try_cancel());
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(action.try_cancel());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn start_twice_schedules_once() {
        init_logs();
        let count = Arc::new(AtomicUsize::new(0));
        let action = counting(&count, Duration::from_millis(20));
        assert!(action.start());
        assert!(!action.start());
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!action.start());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(action.state(), DelayedActionState::Fired);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn panicking_callback_is_contained() {
        init_logs();
        let action = DelayedAction::new(
            |_: ()| panic!("The callback failed"),
            (),
            Duration::from_millis(10),
            Handle::current(),
        );
        assert!(action.start());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(action.state(), DelayedActionState::Fired);
        assert!(!action.try_cancel());
    }
}
