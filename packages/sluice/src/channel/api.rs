// exposed API of channels

use self::future::*;
use super::{
    error::*,
    core,
    polling::{Timeout, poll},
    waiters::WaiterKey,
};
use std::{
    fmt::{self, Formatter, Debug},
    sync::atomic::Ordering::{AcqRel, Relaxed},
    time::{Duration, Instant},
};


// ==== helper functions for adapting core API to exposed API ====


// close the channel, logging if this call was the one that closed it.
fn close<T>(channel: &core::Channel<T>) {
    if channel.lock().close() {
        trace!("channel closed");
    }
}

// 1. increment channel send count.
// 2. clone another handle to the channel.
fn clone_sender<T>(channel: &core::Channel<T>) -> core::Channel<T> {
    channel.send_count().fetch_add(1, Relaxed);
    channel.clone()
}

// 1. decrement channel send count.
// 2. if the send count was lowered to 0, close the channel.
fn drop_sender<T>(channel: &core::Channel<T>) {
    if channel.send_count().fetch_sub(1, AcqRel) == 1 {
        if channel.lock().close() {
            trace!("last sender dropped, channel closed");
        }
    }
}

// 1. increment channel recv count.
// 2. clone another handle to the channel.
fn clone_receiver<T>(channel: &core::Channel<T>) -> core::Channel<T> {
    channel.recv_count().fetch_add(1, Relaxed);
    channel.clone()
}

// 1. decrement channel recv count.
// 2. if the recv count was lowered to 0, put senders in the no receivers state.
fn drop_receiver<T>(channel: &core::Channel<T>) {
    if channel.recv_count().fetch_sub(1, AcqRel) == 1 {
        trace!("last receiver dropped");
        channel.lock().set_no_receivers();
    }
}


// ==== the exposed API ====


/// Create a bounded channel with the given capacity
///
/// Up to `capacity` messages may be buffered before senders start to block. A capacity of 0
/// makes a rendezvous channel, where every send waits until a receiver takes its message.
///
/// Both halves may be cloned freely. The channel is closed when [`Sender::close`] is called or
/// when the last sender is dropped, after which receivers drain what remains and then see the end
/// of the stream.
pub fn channel<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    let channel_1 = core::Channel::new(capacity);
    let channel_2 = channel_1.clone();
    (Sender { channel: channel_1 }, Receiver { channel: channel_2, stream_waiter: None })
}


/// Sender handle to a bounded channel
pub struct Sender<T> {
    channel: core::Channel<T>,
}

impl<T> Sender<T> {
    /// Create a future to send a message on this channel
    ///
    /// See the API of [`SendFut`]. For blocking use, prefer [`send_blocking`](Self::send_blocking).
    pub fn send(&self, msg: T) -> SendFut<'_, T> {
        SendFut(core::Send::new(&self.channel, msg))
    }

    /// Send a message, blocking while the channel is full
    ///
    /// On a rendezvous channel this blocks until a receiver has taken the message. Fails, handing
    /// the message back, if the channel is closed or loses all its receivers before the message
    /// could be enqueued.
    pub fn send_blocking(&self, msg: T) -> Result<(), SendError<T>> {
        self.send(msg).block()
    }

    /// Try to send a message without blocking
    ///
    /// Succeeds only if there is room in the buffer. A message is never handed to a waiting
    /// receiver this way, since that would leave it stranded if the receiver then gave up, so on a
    /// rendezvous channel this always fails with [`WouldBlockError`]. Use
    /// [`send_timeout`](Self::send_timeout) to wait for a receiver to take it.
    pub fn try_send(&self, msg: T) -> Result<(), TrySendError<T>> {
        self.channel.lock()
            .try_push(msg)
            .map_err(|(cause, msg)| TrySendError { msg, cause })
    }

    /// Send a message, blocking for at most the given timeout
    ///
    /// On timeout the message is handed back, even if it was on offer to a waiting receiver
    /// which did not take it in time.
    pub fn send_timeout(&self, msg: T, timeout: Duration) -> Result<(), TrySendError<T>> {
        self.send(msg).block_deadline(Instant::now() + timeout)
    }

    /// Close the channel
    ///
    /// Idempotent. Buffered messages remain receivable, and receivers see the end of the stream
    /// once they are drained. Any further send fails with [`ClosedChannelError`].
    pub fn close(&self) {
        close(&self.channel);
    }

    /// Whether the channel has been closed
    pub fn is_closed(&self) -> bool {
        self.channel.lock().is_closed()
    }

    /// Number of currently buffered messages
    pub fn len(&self) -> usize {
        self.channel.lock().len()
    }

    /// Whether no messages are currently buffered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capacity the channel was created with
    pub fn capacity(&self) -> usize {
        self.channel.lock().bound()
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Sender { channel: clone_sender(&self.channel) }
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        drop_sender(&self.channel);
    }
}

impl<T> Debug for Sender<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let lock = self.channel.lock();
        f.debug_struct("Sender")
            .field("len", &lock.len())
            .field("capacity", &lock.bound())
            .field("closed", &lock.is_closed())
            .finish()
    }
}


/// Receiver handle to a bounded channel
pub struct Receiver<T> {
    channel: core::Channel<T>,
    // registration used by the Stream implementation.
    stream_waiter: Option<WaiterKey>,
}

impl<T> Receiver<T> {
    /// Create a future to receive a message from this channel
    ///
    /// Resolves to `None` once the channel is closed and drained. See the API of [`RecvFut`].
    pub fn recv(&self) -> RecvFut<'_, T> {
        RecvFut(core::Recv::new(&self.channel))
    }

    /// Receive a message, blocking while the channel is empty and open
    ///
    /// Returns `None` once the channel is closed and all buffered messages have been received.
    /// From then on, every call returns `None` immediately.
    pub fn recv_blocking(&self) -> Option<T> {
        self.recv().block()
    }

    /// Try to receive a message without blocking
    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        self.channel.lock().try_dequeue()
    }

    /// Receive a message, blocking for at most the given timeout
    pub fn recv_timeout(&self, timeout: Duration) -> Result<T, TryRecvError> {
        self.recv().block_deadline(Instant::now() + timeout)
    }

    /// Blocking iterator over received messages, which ends at the end of the stream
    pub fn iter(&self) -> Iter<'_, T> {
        Iter(self)
    }

    /// Whether the channel has been closed
    ///
    /// Buffered messages may still be receivable.
    pub fn is_closed(&self) -> bool {
        self.channel.lock().is_closed()
    }

    /// Whether the channel has been closed and drained
    pub fn is_finished(&self) -> bool {
        self.channel.lock().is_finished()
    }

    /// Number of currently buffered messages
    pub fn len(&self) -> usize {
        self.channel.lock().len()
    }

    /// Whether no messages are currently buffered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capacity the channel was created with
    pub fn capacity(&self) -> usize {
        self.channel.lock().bound()
    }

    // access to the core channel, for the multiplexer.
    pub(crate) fn core(&self) -> &core::Channel<T> {
        &self.channel
    }
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        Receiver { channel: clone_receiver(&self.channel), stream_waiter: None }
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        self.channel.remove_receiver(&mut self.stream_waiter);
        drop_receiver(&self.channel);
    }
}

impl<T> Debug for Receiver<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let lock = self.channel.lock();
        f.debug_struct("Receiver")
            .field("len", &lock.len())
            .field("capacity", &lock.bound())
            .field("closed", &lock.is_closed())
            .finish()
    }
}

#[cfg(feature = "futures")]
impl<T> futures::Stream for Receiver<T> {
    type Item = T;

    fn poll_next(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context,
    ) -> std::task::Poll<Option<T>> {
        let this = self.get_mut();
        this.channel.poll_recv(&mut this.stream_waiter, cx)
    }
}

/// Blocking iterator over a [`Receiver`]
pub struct Iter<'a, T>(&'a Receiver<T>);

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.0.recv_blocking()
    }
}

impl<'a, T> IntoIterator for &'a Receiver<T> {
    type Item = T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}


// future types for channels.
pub(crate) mod future {
    use super::*;
    use std::{
        task::{Poll, Context},
        future::Future,
        pin::Pin,
    };

    /// Future for sending into a [`Sender`]
    ///
    /// The message is not enqueued until this future is polled and finds room in the channel.
    /// Until then, the send may be aborted and the message retrieved by calling
    /// [`rescind`](Self::rescind), or aborted by dropping.
    ///
    /// If the buffer is full but a receiver is waiting, as is always the case for a rendezvous
    /// channel, the message is offered to that receiver and the future resolves once it is taken.
    /// An offer is withdrawn if the future is rescinded or dropped, if the channel closes, or if
    /// the receiver stops waiting first, so the message is never left behind in the channel
    /// unless the future resolved to `Ok`.
    pub struct SendFut<'a, T>(pub(super) core::Send<'a, T>);

    // the message is never pinned.
    impl<'a, T> Unpin for SendFut<'a, T> {}

    impl<'a, T> Future for SendFut<'a, T> {
        type Output = Result<(), SendError<T>>;

        fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
            let this = self.get_mut();
            // for implementation of FusedFuture
            if this.is_terminated() {
                return Poll::Pending;
            }
            this.0
                .poll(cx)
                .map(|result| result.map_err(|(cause, msg)| SendError { msg, cause }))
        }
    }

    impl<'a, T> SendFut<'a, T> {
        /// If the message has not yet been delivered, abort the send operation and take back the
        /// message
        ///
        /// Returns `None` if the message was already buffered or taken by a receiver.
        pub fn rescind(&mut self) -> Option<T> {
            self.0.cancel()
        }

        /// Try to resolve this future immediately without blocking
        ///
        /// This method will panic if this future has already resolved or rescinded.
        pub fn try_now(&mut self) -> Result<(), TrySendError<T>> {
            assert!(!self.is_terminated(), "SendFut.try_now called after terminated");
            self.resolve(Timeout::NonBlocking)
        }

        /// Block until this future resolves
        ///
        /// This method will panic if this future has already resolved or rescinded.
        pub fn block(&mut self) -> Result<(), SendError<T>> {
            assert!(!self.is_terminated(), "SendFut.block called after terminated");
            match poll(self, Timeout::Never) {
                Some(result) => result,
                None => unreachable!("poll timed out with Timeout::Never"),
            }
        }

        /// Block until this future resolves or a timeout elapses
        ///
        /// This method will panic if this future has already resolved or rescinded.
        pub fn block_timeout(&mut self, timeout: Duration) -> Result<(), TrySendError<T>> {
            self.block_deadline(Instant::now() + timeout)
        }

        /// Block until this future resolves or the deadline is reached
        ///
        /// If the deadline is reached while the message is still on offer to a waiting receiver,
        /// the offer is withdrawn and the message handed back. This method will panic if this
        /// future has already resolved or rescinded.
        pub fn block_deadline(&mut self, deadline: Instant) -> Result<(), TrySendError<T>> {
            assert!(!self.is_terminated(), "SendFut.block called after terminated");
            self.resolve(Timeout::At(deadline))
        }

        /// Whether this future has already resolved or rescinded
        pub fn is_terminated(&self) -> bool {
            self.0.is_terminated()
        }

        // poll with a timeout, rescinding on timeout. an offer taken between the last poll and
        // the rescind still counts as sent.
        fn resolve(&mut self, timeout: Timeout) -> Result<(), TrySendError<T>> {
            match poll(self, timeout) {
                Some(result) => result.map_err(TrySendError::from),
                None => match self.rescind() {
                    Some(msg) => Err(TrySendError { msg, cause: WouldBlockError.into() }),
                    None => Ok(()),
                },
            }
        }
    }

    #[cfg(feature = "futures")]
    impl<'a, T> futures::future::FusedFuture for SendFut<'a, T> {
        fn is_terminated(&self) -> bool {
            Self::is_terminated(self)
        }
    }


    /// Future for receiving from a [`Receiver`]
    ///
    /// Resolves to `None` to represent the end of the stream: the channel has been closed and all
    /// buffered messages have been received. This state is sticky.
    ///
    /// A message will not be dequeued from the channel until this future resolves. If this future
    /// has not yet resolved, the receive operation may be aborted by calling
    /// [`abort`](Self::abort) (or by dropping).
    pub struct RecvFut<'a, T>(pub(super) core::Recv<'a, T>);

    impl<'a, T> Future for RecvFut<'a, T> {
        type Output = Option<T>;

        fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
            let this = self.get_mut();
            // for implementation of FusedFuture
            if this.is_terminated() {
                return Poll::Pending;
            }
            this.0.poll(cx)
        }
    }

    impl<'a, T> RecvFut<'a, T> {
        /// Abort this receive operation
        ///
        /// Does nothing if this future has already resolved or aborted. This method never panics.
        pub fn abort(&mut self) {
            self.0.cancel();
        }

        /// Block until this future resolves
        ///
        /// This method will panic if this future has already resolved or aborted.
        pub fn block(&mut self) -> Option<T> {
            assert!(!self.is_terminated(), "RecvFut.block called after terminated");
            match poll(self, Timeout::Never) {
                Some(result) => result,
                None => unreachable!("poll timed out with Timeout::Never"),
            }
        }

        /// Try to resolve this future immediately without blocking
        ///
        /// This method will panic if this future has already resolved or aborted.
        pub fn try_now(&mut self) -> Result<T, TryRecvError> {
            assert!(!self.is_terminated(), "RecvFut.try_now called after terminated");
            self.resolve(Timeout::NonBlocking)
        }

        /// Block until this future resolves or a timeout elapses
        ///
        /// This method will panic if this future has already resolved or aborted.
        pub fn block_timeout(&mut self, timeout: Duration) -> Result<T, TryRecvError> {
            self.block_deadline(Instant::now() + timeout)
        }

        /// Block until this future resolves or the deadline is reached
        ///
        /// This method will panic if this future has already resolved or aborted.
        pub fn block_deadline(&mut self, deadline: Instant) -> Result<T, TryRecvError> {
            assert!(!self.is_terminated(), "RecvFut.block called after terminated");
            self.resolve(Timeout::At(deadline))
        }

        /// Whether this future has already resolved or aborted
        pub fn is_terminated(&self) -> bool {
            self.0.is_terminated()
        }

        // poll with a timeout, aborting on timeout.
        fn resolve(&mut self, timeout: Timeout) -> Result<T, TryRecvError> {
            match poll(self, timeout) {
                Some(Some(msg)) => Ok(msg),
                Some(None) => Err(TryRecvError::Finished),
                None => {
                    self.abort();
                    Err(WouldBlockError.into())
                }
            }
        }
    }

    #[cfg(feature = "futures")]
    impl<'a, T> futures::future::FusedFuture for RecvFut<'a, T> {
        fn is_terminated(&self) -> bool {
            Self::is_terminated(self)
        }
    }
}


// ==== tests ====


#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        future::Future,
        pin::Pin,
        sync::{
            atomic::{AtomicBool, Ordering::SeqCst},
            Arc,
        },
        task::{Context, Poll, Waker},
        thread,
    };

    // poll once, with a waker that does nothing.
    fn noop_poll<F: Future + Unpin>(fut: &mut F) -> Poll<F::Output> {
        Pin::new(fut).poll(&mut Context::from_waker(Waker::noop()))
    }

    #[test]
    fn basic_1000_test() {
        let (send, recv) = channel(500);

        let join_1 = thread::spawn(move || {
            for i in 1..=1000 {
                send.send(i).block_timeout(Duration::from_secs(5)).unwrap();
                if i < 1000 && i % 100 == 0 {
                    thread::sleep(Duration::from_millis(50));
                }
            }
            send.close();
        });
        let join_2 = thread::spawn(move || {
            for i in 1..=1000 {
                let j = recv.recv_timeout(Duration::from_secs(5)).unwrap();
                assert_eq!(i, j);
            }
            assert_eq!(recv.recv_timeout(Duration::from_millis(10)), Err(TryRecvError::Finished));
        });
        join_1.join().unwrap();
        join_2.join().unwrap();
    }

    #[test]
    fn capacity_sends_do_not_block() {
        let (send, recv) = channel(3);
        for i in 0..3 {
            send.try_send(i).unwrap();
        }
        let e = send.try_send(3).unwrap_err();
        assert!(e.is_would_block());
        assert_eq!(e.into_inner(), 3);
        assert_eq!(send.len(), 3);
        assert_eq!(recv.try_recv(), Ok(0));
    }

    #[test]
    fn send_past_capacity_blocks_until_recv() {
        let (send, recv) = channel(2);
        send.send_blocking(0).unwrap();
        send.send_blocking(1).unwrap();

        let sent = Arc::new(AtomicBool::new(false));
        let join = thread::spawn({
            let sent = Arc::clone(&sent);
            move || {
                send.send_blocking(2).unwrap();
                sent.store(true, SeqCst);
            }
        });

        thread::sleep(Duration::from_millis(100));
        assert!(!sent.load(SeqCst), "third send should block on a full channel");
        assert_eq!(recv.recv_blocking(), Some(0));
        join.join().unwrap();
        assert!(sent.load(SeqCst));
        assert_eq!(recv.try_recv(), Ok(1));
        assert_eq!(recv.try_recv(), Ok(2));
    }

    #[test]
    fn rendezvous_send_waits_for_receiver() {
        let (send, recv) = channel(0);
        assert!(send.try_send(1).unwrap_err().is_would_block());
        assert_eq!(send.send_timeout(1, Duration::from_millis(20)).unwrap_err().msg, 1);

        let sent = Arc::new(AtomicBool::new(false));
        let join = thread::spawn({
            let sent = Arc::clone(&sent);
            move || {
                send.send_blocking(2).unwrap();
                sent.store(true, SeqCst);
                send
            }
        });

        thread::sleep(Duration::from_millis(100));
        assert!(!sent.load(SeqCst), "rendezvous send should wait for a receiver");
        assert_eq!(recv.recv_blocking(), Some(2));
        let send = join.join().unwrap();
        assert!(sent.load(SeqCst));
        assert_eq!(send.len(), 0);
    }

    #[test]
    fn rendezvous_producer_cannot_run_ahead() {
        let (send, recv) = channel(0);
        let join = thread::spawn(move || {
            for i in 0..5 {
                send.send_blocking(i).unwrap();
            }
        });

        for i in 0..5 {
            thread::sleep(Duration::from_millis(20));
            // nothing is ever buffered ahead of the consumer
            assert_eq!(recv.len(), 0);
            assert_eq!(recv.recv_blocking(), Some(i));
        }
        join.join().unwrap();
        assert_eq!(recv.recv_blocking(), None);
    }

    #[test]
    fn drain_before_end_of_stream() {
        let (send, recv) = channel(4);
        for i in 0..3 {
            send.send_blocking(i).unwrap();
        }
        send.close();
        assert!(recv.is_closed());
        assert!(!recv.is_finished());

        for i in 0..3 {
            assert_eq!(recv.recv_blocking(), Some(i));
        }
        assert_eq!(recv.recv_blocking(), None);
        assert!(recv.is_finished());
    }

    #[test]
    fn end_of_stream_is_sticky() {
        let (send, recv) = channel::<u32>(1);
        send.close();
        for _ in 0..100 {
            assert_eq!(recv.recv_blocking(), None);
            assert_eq!(recv.try_recv(), Err(TryRecvError::Finished));
            assert_eq!(recv.recv_timeout(Duration::from_secs(10)), Err(TryRecvError::Finished));
        }
    }

    #[test]
    fn send_after_close_fails() {
        let (send, _recv) = channel(4);
        send.close();
        send.close();

        let e = send.send_blocking("late").unwrap_err();
        assert!(e.is_closed());
        assert_eq!(e.cause, SendErrorCause::Closed(ClosedChannelError));
        assert_eq!(e.into_inner(), "late");

        let e = send.try_send("later").unwrap_err();
        assert_eq!(e.cause, TrySendErrorCause::Terminal(SendErrorCause::Closed(ClosedChannelError)));
    }

    #[test]
    fn close_releases_blocked_sender() {
        let (send, recv) = channel(1);
        send.send_blocking(0).unwrap();

        let join = thread::spawn({
            let send = send.clone();
            move || send.send_blocking(1)
        });
        thread::sleep(Duration::from_millis(50));
        send.close();

        let e = join.join().unwrap().unwrap_err();
        assert!(e.is_closed());
        assert_eq!(e.msg, 1);
        assert_eq!(recv.recv_blocking(), Some(0));
        assert_eq!(recv.recv_blocking(), None);
    }

    #[test]
    fn close_releases_blocked_receiver() {
        let (send, recv) = channel::<()>(1);
        let join = thread::spawn(move || recv.recv_blocking());
        thread::sleep(Duration::from_millis(50));
        send.close();
        assert_eq!(join.join().unwrap(), None);
    }

    #[test]
    fn dropping_last_sender_closes() {
        let (send, recv) = channel(2);
        let send_2 = send.clone();
        send.send_blocking(1).unwrap();
        drop(send);
        assert!(!recv.is_closed());
        send_2.send_blocking(2).unwrap();
        drop(send_2);
        assert!(recv.is_closed());
        assert_eq!(recv.iter().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn dropping_all_receivers_fails_senders() {
        let (send, recv) = channel(0);
        let join = thread::spawn({
            let send = send.clone();
            move || send.send_blocking(5)
        });
        thread::sleep(Duration::from_millis(50));
        drop(recv);

        let e = join.join().unwrap().unwrap_err();
        assert_eq!(e.cause, SendErrorCause::NoReceivers(NoReceiversError));
        assert_eq!(
            send.try_send(6).unwrap_err().cause,
            TrySendErrorCause::Terminal(SendErrorCause::NoReceivers(NoReceiversError)),
        );
    }

    #[test]
    fn timeouts() {
        let (send, recv) = channel(1);
        assert_eq!(recv.recv_timeout(Duration::from_millis(10)), Err(TryRecvError::WouldBlock(WouldBlockError)));
        send.send_timeout(1, Duration::from_millis(10)).unwrap();
        let e = send.send_timeout(2, Duration::from_millis(10)).unwrap_err();
        assert!(e.is_would_block());
        assert_eq!(e.msg, 2);
        assert_eq!(recv.recv_timeout(Duration::from_millis(10)), Ok(1));
    }

    #[test]
    fn rescind_before_enqueue() {
        let (send, recv) = channel(0);
        let mut fut = send.send(9);
        assert!(fut.try_now().unwrap_err().is_would_block());
        assert!(fut.is_terminated());
        drop(fut);

        let mut fut = send.send(10);
        assert_eq!(fut.rescind(), Some(10));
        assert_eq!(recv.try_recv(), Err(TryRecvError::WouldBlock(WouldBlockError)));
    }

    #[test]
    fn try_send_does_not_strand_message_with_waiting_receiver() {
        let (send, recv) = channel(0);
        let mut fut = recv.recv();
        assert!(noop_poll(&mut fut).is_pending());

        let e = send.try_send(1).unwrap_err();
        assert!(e.is_would_block());
        assert_eq!(e.msg, 1);

        fut.abort();
        assert_eq!(send.len(), 0);
        assert_eq!(recv.try_recv(), Err(TryRecvError::WouldBlock(WouldBlockError)));
    }

    #[test]
    fn send_timeout_withdraws_offer_nobody_took() {
        let (send, recv) = channel(0);
        let mut fut = recv.recv();
        assert!(noop_poll(&mut fut).is_pending());

        // a receiver is waiting, but never gets around to taking the message
        let e = send.send_timeout(7, Duration::from_millis(50)).unwrap_err();
        assert!(e.is_would_block());
        assert_eq!(e.msg, 7);
        assert_eq!(recv.len(), 0);
        assert!(recv.len() <= recv.capacity());
        assert!(noop_poll(&mut fut).is_pending());
    }

    #[test]
    fn send_timeout_survives_receiver_abort() {
        let (send, recv) = channel(0);
        let mut fut = recv.recv();
        assert!(noop_poll(&mut fut).is_pending());

        let join = thread::spawn(move || {
            let result = send.send_timeout(8, Duration::from_millis(300));
            (result, send)
        });
        thread::sleep(Duration::from_millis(50));
        fut.abort();

        let (result, send) = join.join().unwrap();
        let e = result.unwrap_err();
        assert!(e.is_would_block());
        assert_eq!(e.msg, 8);
        assert_eq!(send.len(), 0);
        assert_eq!(recv.try_recv(), Err(TryRecvError::WouldBlock(WouldBlockError)));
    }

    #[test]
    fn rescinded_offer_is_handed_back() {
        let (send, recv) = channel(0);
        let mut recv_fut = recv.recv();
        assert!(noop_poll(&mut recv_fut).is_pending());

        let mut send_fut = send.send(3);
        assert!(noop_poll(&mut send_fut).is_pending());
        assert_eq!(send_fut.rescind(), Some(3));
        assert!(noop_poll(&mut recv_fut).is_pending());
        assert_eq!(recv.len(), 0);
    }

    #[test]
    fn blocked_send_outlives_abandoning_receiver() {
        let (send, recv) = channel(0);
        let mut fut = recv.recv();
        assert!(noop_poll(&mut fut).is_pending());

        let join = thread::spawn({
            let send = send.clone();
            move || send.send_blocking(5)
        });
        thread::sleep(Duration::from_millis(50));
        fut.abort();
        thread::sleep(Duration::from_millis(50));

        // the message went back to the sender, which keeps waiting for a receiver
        assert_eq!(recv.len(), 0);
        assert!(!join.is_finished());
        assert_eq!(recv.recv_blocking(), Some(5));
        join.join().unwrap().unwrap();
    }

    #[test]
    fn close_hands_back_pending_offer() {
        let (send, recv) = channel(0);
        let mut fut = recv.recv();
        assert!(noop_poll(&mut fut).is_pending());

        let join = thread::spawn({
            let send = send.clone();
            move || send.send_blocking(4)
        });
        thread::sleep(Duration::from_millis(50));
        send.close();

        let e = join.join().unwrap().unwrap_err();
        assert!(e.is_closed());
        assert_eq!(e.msg, 4);
        assert_eq!(noop_poll(&mut fut), Poll::Ready(None));
    }

    #[test]
    fn many_producers_many_consumers() {
        let (send, recv) = channel(4);
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let send = send.clone();
                thread::spawn(move || {
                    for i in 0..250 {
                        send.send_blocking(p * 1000 + i).unwrap();
                    }
                })
            })
            .collect();
        drop(send);
        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let recv = recv.clone();
                thread::spawn(move || recv.iter().collect::<Vec<u32>>())
            })
            .collect();
        drop(recv);

        for producer in producers {
            producer.join().unwrap();
        }
        let mut all: Vec<u32> = consumers
            .into_iter()
            .flat_map(|consumer| consumer.join().unwrap())
            .collect();
        all.sort();
        let mut expected: Vec<u32> = (0..4)
            .flat_map(|p| (0..250).map(move |i| p * 1000 + i))
            .collect();
        expected.sort();
        assert_eq!(all, expected);
    }

    #[tokio::test]
    async fn async_send_recv() {
        let (send, recv) = channel(1);
        let producer = tokio::spawn(async move {
            for i in 0..10u32 {
                send.send(i).await.unwrap();
            }
        });
        let mut got = Vec::new();
        while let Some(i) = recv.recv().await {
            got.push(i);
        }
        producer.await.unwrap();
        assert_eq!(got, (0..10).collect::<Vec<_>>());
    }

    #[cfg(feature = "futures")]
    #[tokio::test]
    async fn receiver_is_a_stream() {
        use futures::StreamExt;

        let (send, recv) = channel(0);
        let producer = tokio::spawn(async move {
            for i in 0..5u32 {
                send.send(i).await.unwrap();
            }
        });
        let got: Vec<u32> = recv.collect().await;
        producer.await.unwrap();
        assert_eq!(got, vec![0, 1, 2, 3, 4]);
    }
}
