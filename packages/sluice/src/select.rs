//! Fair multiplexing over several channels.
//!
//! A [`Multiplexer`] waits on any number of [`Receiver`]s at once, possibly of different element
//! types, and receives from whichever becomes ready first. When several are ready at the same
//! time, the one to receive from is picked uniformly at random, so that a busy channel cannot
//! starve a quiet one.
//!
//! Once it has waited on an arm, the multiplexer stays registered on that channel as a waiting
//! receiver until the arm is retired or the multiplexer is dropped, even between waits. Senders
//! on a rendezvous channel can therefore offer their messages to an arm while another arm is
//! being served, and the offer is taken on a later wait.
//!
//! ```
//! use sluice::{channel, select::Multiplexer};
//!
//! let (send_nums, recv_nums) = channel::<u32>(4);
//! let (send_words, recv_words) = channel::<&str>(4);
//!
//! let mut mux = Multiplexer::new();
//! let nums = mux.recv_map(recv_nums, |n| n.to_string());
//! let words = mux.recv_map(recv_words, |w| w.to_owned());
//!
//! send_nums.send_blocking(7).unwrap();
//! assert_eq!(mux.wait_any_blocking(), Some((nums, "7".to_owned())));
//!
//! send_words.send_blocking("hi").unwrap();
//! assert_eq!(mux.wait_any_blocking(), Some((words, "hi".to_owned())));
//!
//! drop((send_nums, send_words));
//! assert_eq!(mux.wait_any_blocking(), None);
//! ```

use crate::{
    channel::{
        polling::{poll, Timeout},
        WaiterKey,
    },
    error::{TryRecvError, WouldBlockError},
    Receiver,
};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use smallvec::SmallVec;
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
    time::{Duration, Instant},
};


// object-safe view of a receiver, with its element type mapped to the multiplexer's.
trait Source<O> {
    // poll whether an element is available or the channel is finished, registering if not.
    fn poll_ready(&mut self, cx: &mut Context) -> Poll<()>;

    // try to take an element.
    fn take(&mut self) -> Result<O, TryRecvError>;

    // keep the registration left by poll_ready, but stop it taking wakeups between waits.
    fn idle(&mut self);

    // remove the registration left by poll_ready, once the arm is retired.
    fn disarm(&mut self);
}

// a receiver and the function mapping its elements.
struct Mapped<T, F> {
    receiver: Receiver<T>,
    waiter: Option<WaiterKey>,
    map: F,
}

impl<T, O, F: FnMut(T) -> O> Source<O> for Mapped<T, F> {
    fn poll_ready(&mut self, cx: &mut Context) -> Poll<()> {
        self.receiver.core().poll_ready(&mut self.waiter, cx)
    }

    fn take(&mut self) -> Result<O, TryRecvError> {
        self.receiver.try_recv().map(&mut self.map)
    }

    fn idle(&mut self) {
        self.receiver.core().idle_receiver(&self.waiter);
    }

    fn disarm(&mut self) {
        self.receiver.core().remove_receiver(&mut self.waiter);
    }
}

impl<T, F> Drop for Mapped<T, F> {
    fn drop(&mut self) {
        self.receiver.core().remove_receiver(&mut self.waiter);
    }
}

struct Arm<'a, O> {
    source: Box<dyn Source<O> + 'a>,
    // set once the channel was seen closed and drained. never unset.
    exhausted: bool,
}


/// Waits on several channels at once, receiving fairly from whichever are ready
///
/// Channels are added as arms, each identified by the index returned when adding it. Arms whose
/// channel is closed and drained are retired automatically, and waiting returns `None` once
/// every arm has been retired.
///
/// Ties between simultaneously ready arms are broken with the multiplexer's own random number
/// generator, which can be seeded explicitly with [`with_rng`](Self::with_rng).
pub struct Multiplexer<'a, O, R = Pcg64> {
    arms: Vec<Arm<'a, O>>,
    rng: R,
}

impl<'a, O> Multiplexer<'a, O, Pcg64> {
    /// Construct with no arms, and a generator seeded from system entropy.
    pub fn new() -> Self {
        Self::with_rng(Pcg64::from_entropy())
    }
}

impl<'a, O> Default for Multiplexer<'a, O, Pcg64> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, O, R: Rng> Multiplexer<'a, O, R> {
    /// Construct with no arms, breaking ties with the given generator.
    pub fn with_rng(rng: R) -> Self {
        Multiplexer { arms: Vec::new(), rng }
    }

    /// Add an arm receiving from the given channel, returning its index.
    pub fn recv(&mut self, receiver: Receiver<O>) -> usize
    where
        O: 'a,
    {
        self.recv_map(receiver, |elem| elem)
    }

    /// Add an arm receiving from the given channel and mapping its elements, returning its index.
    pub fn recv_map<T, F>(&mut self, receiver: Receiver<T>, map: F) -> usize
    where
        T: 'a,
        F: FnMut(T) -> O + 'a,
    {
        self.arms.push(Arm {
            source: Box::new(Mapped { receiver, waiter: None, map }),
            exhausted: false,
        });
        self.arms.len() - 1
    }

    /// Number of arms ever added, including retired ones
    pub fn len(&self) -> usize {
        self.arms.len()
    }

    /// Whether no arms have been added
    pub fn is_empty(&self) -> bool {
        self.arms.is_empty()
    }

    /// Number of arms not yet retired
    pub fn live(&self) -> usize {
        self.arms.iter().filter(|arm| !arm.exhausted).count()
    }

    /// Whether the arm at the given index has been retired because its channel finished
    ///
    /// Panics if the index is out of bounds.
    pub fn is_exhausted(&self, index: usize) -> bool {
        self.arms[index].exhausted
    }

    /// Create a future which resolves upon receiving from exactly one ready arm
    ///
    /// Resolves to the arm's index and the received element, or to `None` once every arm has
    /// been retired.
    pub fn wait_any(&mut self) -> WaitAny<'_, 'a, O, R> {
        WaitAny(self)
    }

    /// Block until receiving from exactly one ready arm
    ///
    /// The thread is parked until one of the channels is ready. Returns `None` once every arm
    /// has been retired.
    pub fn wait_any_blocking(&mut self) -> Option<(usize, O)> {
        match poll(&mut self.wait_any(), Timeout::Never) {
            Some(selected) => selected,
            None => unreachable!("poll timed out with Timeout::Never"),
        }
    }

    /// Receive from a ready arm without blocking
    pub fn try_wait_any(&mut self) -> Result<Option<(usize, O)>, WouldBlockError> {
        poll(&mut self.wait_any(), Timeout::NonBlocking).ok_or(WouldBlockError)
    }

    /// Block until receiving from a ready arm or the timeout elapses
    pub fn wait_any_timeout(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<(usize, O)>, WouldBlockError> {
        let deadline = Instant::now() + timeout;
        poll(&mut self.wait_any(), Timeout::At(deadline)).ok_or(WouldBlockError)
    }

    fn poll_wait_any(&mut self, cx: &mut Context) -> Poll<Option<(usize, O)>> {
        let mut ready = SmallVec::<[usize; 8]>::new();
        loop {
            // poll every live arm, so that all of them are registered if none is ready
            ready.clear();
            let mut live = 0;
            for (index, arm) in self.arms.iter_mut().enumerate() {
                if arm.exhausted {
                    continue;
                }
                live += 1;
                if arm.source.poll_ready(cx).is_ready() {
                    ready.push(index);
                }
            }
            if live == 0 {
                return Poll::Ready(None);
            }
            if ready.is_empty() {
                return Poll::Pending;
            }

            // pick uniformly among the ready arms. an arm may turn out empty if another receiver
            // got there first, in which case pick again among the rest.
            while !ready.is_empty() {
                let index = ready.swap_remove(self.rng.gen_range(0..ready.len()));
                let taken = self.arms[index].source.take();
                match taken {
                    Ok(elem) => return Poll::Ready(Some((index, elem))),
                    Err(TryRecvError::Finished) => {
                        let arm = &mut self.arms[index];
                        arm.exhausted = true;
                        arm.source.disarm();
                        debug!(index, "multiplexer arm retired");
                    }
                    Err(TryRecvError::WouldBlock(_)) => {
                        trace!(index, "ready arm drained by another receiver");
                    }
                }
            }
        }
    }

    // called once a wait is over.
    fn idle(&mut self) {
        for arm in &mut self.arms {
            if !arm.exhausted {
                arm.source.idle();
            }
        }
    }
}


/// Future for [`Multiplexer::wait_any`]
///
/// Polling it registers the multiplexer as a waiting receiver on every live arm that is not
/// ready. Those registrations outlive this future, see the [module docs](self), but once it is
/// dropped they no longer take wakeups away from other receivers of the same channels.
pub struct WaitAny<'m, 'a, O, R: Rng>(&'m mut Multiplexer<'a, O, R>);

impl<'m, 'a, O, R: Rng> Future for WaitAny<'m, 'a, O, R> {
    type Output = Option<(usize, O)>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        self.get_mut().0.poll_wait_any(cx)
    }
}

impl<'m, 'a, O, R: Rng> Drop for WaitAny<'m, 'a, O, R> {
    fn drop(&mut self) {
        self.0.idle();
    }
}
