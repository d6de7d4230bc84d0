//! Producer which emits into a channel on a fixed interval.

use crate::{
    clock::Clock,
    Sender,
};
use std::{
    io,
    panic::resume_unwind,
    sync::{
        atomic::{AtomicBool, Ordering::SeqCst},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};


/// Repeatedly sleeps for an interval, then sends a value into a channel
///
/// Each value is produced by a closure given the zero-based tick number. Sends are blocking, so
/// a producer on a rendezvous channel is paced by its consumer as well as by its interval.
pub struct PeriodicProducer<T, C, F> {
    interval: Duration,
    sender: Sender<T>,
    clock: C,
    make: F,
    name: String,
}

impl<T, C, F> PeriodicProducer<T, C, F>
where
    T: Send + 'static,
    C: Clock + 'static,
    F: FnMut(u64) -> T + Send + 'static,
{
    /// Construct a producer which has not yet been started.
    pub fn new(interval: Duration, sender: Sender<T>, clock: C, make: F) -> Self {
        PeriodicProducer {
            interval,
            sender,
            clock,
            make,
            name: "sluice-producer".into(),
        }
    }

    /// Set the name of the producer's thread.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Start the producer on its own thread.
    pub fn spawn(self) -> io::Result<ProducerHandle<T>> {
        let stop = Arc::new(AtomicBool::new(false));
        let sender = self.sender.clone();
        let thread = thread::Builder::new()
            .name(self.name.clone())
            .spawn({
                let stop = Arc::clone(&stop);
                move || self.run(&stop)
            })?;
        Ok(ProducerHandle { stop, sender, thread })
    }

    // producer loop. returns the number of values sent.
    fn run(mut self, stop: &AtomicBool) -> u64 {
        let mut tick = 0;
        debug!(name = %self.name, interval = ?self.interval, "producer started");
        loop {
            self.clock.sleep(self.interval);
            if stop.load(SeqCst) {
                break;
            }
            let value = (self.make)(tick);
            if let Err(e) = self.sender.send_blocking(value) {
                if stop.load(SeqCst) {
                    debug!(name = %self.name, "producer released from send by stop");
                } else {
                    warn!(name = %self.name, %e, "producer channel unusable, stopping");
                }
                break;
            }
            trace!(name = %self.name, tick, "producer sent");
            tick += 1;
        }
        debug!(name = %self.name, sent = tick, "producer stopped");
        tick
    }
}


/// Handle to a running [`PeriodicProducer`]
///
/// The handle belongs to the producing side, so stopping through it closes the producer's
/// channel.
pub struct ProducerHandle<T> {
    stop: Arc<AtomicBool>,
    sender: Sender<T>,
    thread: JoinHandle<u64>,
}

impl<T> ProducerHandle<T> {
    /// Ask the producer to stop, and close its channel
    ///
    /// Closing releases the producer if it is blocked sending. If it is sleeping, it stops once
    /// it next wakes. Values already buffered remain receivable.
    pub fn stop(&self) {
        self.stop.store(true, SeqCst);
        self.sender.close();
    }

    /// Whether the producer thread has exited
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the producer thread to exit, returning how many values it sent
    ///
    /// Does not stop the producer by itself. If the producer panicked, the panic is resumed on
    /// the calling thread.
    pub fn join(self) -> u64 {
        match self.thread.join() {
            Ok(sent) => sent,
            Err(panic) => resume_unwind(panic),
        }
    }

    /// Stop the producer and wait for it to exit
    pub fn stop_and_join(self) -> u64 {
        self.stop();
        self.join()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        channel,
        clock::{ManualClock, SystemClock},
    };

    #[test]
    fn emits_on_interval() {
        let clock = ManualClock::new();
        let (send, recv) = channel(8);
        let handle = PeriodicProducer::new(
            Duration::from_millis(500),
            send,
            clock.clone(),
            |tick| tick * 10,
        )
        .spawn()
        .unwrap();

        for expected in [0, 10, 20] {
            clock.wait_for_sleepers(1);
            assert!(recv.is_empty());
            assert_eq!(clock.advance(Duration::from_millis(500)), 1);
            assert_eq!(recv.recv_blocking(), Some(expected));
        }

        clock.wait_for_sleepers(1);
        handle.stop();
        clock.advance(Duration::from_millis(500));
        assert_eq!(handle.join(), 3);
        assert_eq!(recv.recv_blocking(), None);
    }

    #[test]
    fn stop_releases_blocked_send() {
        let (send, recv) = channel(0);
        let handle = PeriodicProducer::new(
            Duration::from_millis(1),
            send,
            SystemClock::new(),
            |_| (),
        )
        .with_name("blocked-producer")
        .spawn()
        .unwrap();

        thread::sleep(Duration::from_millis(50));
        assert!(!handle.is_finished());
        assert_eq!(handle.stop_and_join(), 0);
        assert_eq!(recv.recv_blocking(), None);
    }
}
