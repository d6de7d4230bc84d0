// internal future polling system for blocking operations.
//
// design based on pollster crate, with a condvar-backed signal as the waker. the waker is an
// Arc, so it may safely outlive the call that created it.

use std::{
    future::Future,
    pin::Pin,
    sync::{Arc, Condvar, Mutex, PoisonError},
    task::{Context, Poll, Wake, Waker},
    time::Instant,
};


// timeout for blocking on a future.
#[derive(Debug, Copy, Clone)]
pub(crate) enum Timeout {
    // never time out.
    Never,
    // time out at the given deadline.
    At(Instant),
    // time out if the future cannot be resolved without blocking.
    NonBlocking,
}

// poll the future until it resolves or the timeout is reached, in which case return none.
//
// the future is left unresolved on timeout, and the caller is expected to cancel it.
pub(crate) fn poll<F>(fut: &mut F, timeout: Timeout) -> Option<F::Output>
where
    F: Future + Unpin,
{
    let signal = Arc::new(Signal {
        state: Mutex::new(State::Empty),
        cond: Condvar::new(),
    });
    let waker = Waker::from(Arc::clone(&signal));
    let mut cx = Context::from_waker(&waker);

    loop {
        // return if ready
        if let Poll::Ready(output) = Pin::new(&mut *fut).poll(&mut cx) {
            return Some(output);
        }

        // otherwise, block until notification or timeout
        let mut lock = signal.lock();

        // if a notification is already present, skip to the next loop iteration so as to release
        // the lock and try polling again without blocking.
        if let State::Notified = *lock {
            *lock = State::Empty;
            continue;
        }

        // otherwise, actually block until notification or timeout
        debug_assert!(matches!(*lock, State::Empty));
        *lock = State::Waiting;
        match timeout {
            // block on mutex + condvar indefinitely
            Timeout::Never =>
                while let State::Waiting = *lock {
                    lock = signal.cond.wait(lock).unwrap_or_else(PoisonError::into_inner);
                },

            // block on mutex + condvar until deadline, at which point give the future one last
            // poll in case it was notified right at the deadline
            Timeout::At(deadline) =>
                while let State::Waiting = *lock {
                    let Some(duration) = deadline.checked_duration_since(Instant::now())
                        else { break };
                    let (lock_2, wait_result) = signal.cond
                        .wait_timeout(lock, duration)
                        .unwrap_or_else(PoisonError::into_inner);
                    lock = lock_2;
                    if wait_result.timed_out() { break; }
                },

            // dont block on mutex + condvar
            Timeout::NonBlocking => return None,
        }

        if let State::Waiting = *lock {
            // timed out without notification
            *lock = State::Empty;
            drop(lock);
            return match Pin::new(&mut *fut).poll(&mut cx) {
                Poll::Ready(output) => Some(output),
                Poll::Pending => None,
            };
        }
        *lock = State::Empty;
    }
}

// synchronization signal state
enum State {
    Empty,
    Waiting,
    Notified,
}

// synchronization signal
struct Signal {
    state: Mutex<State>,
    cond: Condvar,
}

impl Signal {
    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Wake for Signal {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        let mut lock = self.lock();
        match *lock {
            State::Notified => (),
            State::Empty => {
                *lock = State::Notified;
            }
            State::Waiting => {
                *lock = State::Empty;
                self.cond.notify_one();
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        future::{pending, ready},
        thread,
        time::Duration,
    };

    // resolves on the second poll, waking itself from another thread in between.
    struct WakeFromThread(bool);

    impl Future for WakeFromThread {
        type Output = &'static str;

        fn poll(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
            if self.0 {
                return Poll::Ready("woken");
            }
            self.0 = true;
            let waker = cx.waker().clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                waker.wake();
            });
            Poll::Pending
        }
    }

    #[test]
    fn resolves_ready_future() {
        assert_eq!(poll(&mut ready(5), Timeout::NonBlocking), Some(5));
        assert_eq!(poll(&mut ready(5), Timeout::Never), Some(5));
    }

    #[test]
    fn non_blocking_gives_up() {
        assert_eq!(poll(&mut pending::<()>(), Timeout::NonBlocking), None);
    }

    #[test]
    fn deadline_gives_up() {
        let start = Instant::now();
        let deadline = start + Duration::from_millis(20);
        assert_eq!(poll(&mut pending::<()>(), Timeout::At(deadline)), None);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn blocks_until_woken() {
        assert_eq!(poll(&mut WakeFromThread(false), Timeout::Never), Some("woken"));
    }
}
