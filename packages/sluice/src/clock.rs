//! Time sources for periodic producers.
//!
//! [`SystemClock`] sleeps for real. [`ManualClock`] is a virtual clock which only moves when
//! told to, for driving producers deterministically in tests and simulations.

use std::{
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    thread,
    time::{Duration, Instant},
};


/// A source of time that threads can sleep on
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock's origin
    fn now(&self) -> Duration;

    /// Block the calling thread for the given duration of this clock's time
    fn sleep(&self, duration: Duration);
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Duration {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}


/// Wall clock time, measured from when the clock was created
#[derive(Debug, Copy, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Construct with the origin set to now.
    pub fn new() -> Self {
        SystemClock { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}


/// Virtual clock which only advances when [`advance`](Self::advance) is called
///
/// Clones share the same time. Threads sleeping on it are woken once the virtual time reaches
/// their deadline.
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Arc<ManualShared>);

#[derive(Debug, Default)]
struct ManualShared {
    state: Mutex<ManualState>,
    cond: Condvar,
}

#[derive(Debug, Default)]
struct ManualState {
    // current virtual time.
    now: Duration,
    // deadlines of threads currently sleeping. an entry is removed by `advance` once reached.
    sleepers: Vec<Duration>,
}

impl ManualClock {
    /// Construct at virtual time zero with nobody sleeping.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ManualState> {
        self.0.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Advance the virtual time, waking every sleeper whose deadline has been reached
    ///
    /// Returns the number of sleepers woken.
    pub fn advance(&self, duration: Duration) -> usize {
        let mut lock = self.lock();
        lock.now += duration;
        let now = lock.now;
        let before = lock.sleepers.len();
        lock.sleepers.retain(|&deadline| deadline > now);
        let woken = before - lock.sleepers.len();
        drop(lock);
        self.0.cond.notify_all();
        woken
    }

    /// Number of threads currently sleeping on this clock
    pub fn sleepers(&self) -> usize {
        self.lock().sleepers.len()
    }

    /// Block until at least `n` threads are sleeping on this clock
    pub fn wait_for_sleepers(&self, n: usize) {
        let mut lock = self.lock();
        while lock.sleepers.len() < n {
            lock = self.0.cond.wait(lock).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.lock().now
    }

    fn sleep(&self, duration: Duration) {
        let mut lock = self.lock();
        let deadline = lock.now + duration;
        if duration.is_zero() {
            return;
        }
        lock.sleepers.push(deadline);
        self.0.cond.notify_all();
        while lock.now < deadline {
            lock = self.0.cond.wait(lock).unwrap_or_else(PoisonError::into_inner);
        }
    }
}
