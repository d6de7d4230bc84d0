// minimal safe API for the channel. the exposed API is a convenience wrapper around this.

use super::{
    error::*,
    waiters::{WaiterQueue, WaiterKey},
};
use std::{
    collections::VecDeque,
    sync::{
        atomic::AtomicUsize,
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
    },
    task::{Poll, Context, Waker},
};


// handle to a channel.
pub(crate) struct Channel<T>(Arc<Shared<T>>);

// channel shared state.
struct Shared<T> {
    // mutex around lockable state. this is the only lock in the channel.
    lockable: Mutex<Lockable<T>>,

    // sender handle count. the channel is closed when it drops to 0.
    send_count: AtomicUsize,
    // receiver handle count. senders enter the no receivers state when it drops to 0.
    recv_count: AtomicUsize,
}

// channel lockable state.
struct Lockable<T> {
    // buffered elements, front is oldest. never longer than bound.
    elems: VecDeque<T>,
    // elements offered directly to parked receivers, front is oldest. they are behind elems in
    // FIFO order and are not part of the buffer: the sender still owns the right to withdraw them.
    offers: VecDeque<Offer<T>>,
    // sequence number of the next offer.
    next_offer: u64,
    // elems maximum length.
    bound: usize,
    // once true, never becomes false again. elems may still be drained after this, offers not.
    closed: bool,
    // once true, never becomes false again. set when the last receiver handle is dropped.
    no_receivers: bool,
    // send operations parked on lack of room. senders with an outstanding offer are not in here.
    send_waiters: WaiterQueue,
    // parked recv operations, including standing multiplexer registrations.
    recv_waiters: WaiterQueue,
}

// element offered to a parked receiver, awaiting either being taken or being withdrawn.
struct Offer<T> {
    seq: u64,
    elem: T,
    // waker of the sending operation.
    sender: Waker,
}

// outcome of successfully enqueueing an element.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Enqueued {
    // element went into the buffer. the send is complete.
    Buffered,
    // element was offered to a parked receiver, under the given sequence number. the send is
    // complete once the offer is taken.
    Offered(u64),
}

// state of an outstanding offer.
pub(crate) enum OfferState<T> {
    // a receiver took the element.
    Taken,
    // still waiting for a receiver.
    Parked,
    // the element was withdrawn, because the channel closed or there are no longer enough parked
    // receivers to back the offer.
    Withdrawn(T),
}

impl<T> Channel<T> {
    // construct empty channel with send and recv counts of 1.
    pub(crate) fn new(bound: usize) -> Self {
        Channel(Arc::new(Shared {
            lockable: Mutex::new(Lockable {
                elems: VecDeque::with_capacity(bound),
                offers: VecDeque::new(),
                next_offer: 0,
                bound,
                closed: false,
                no_receivers: false,
                send_waiters: WaiterQueue::new(),
                recv_waiters: WaiterQueue::new(),
            }),
            send_count: AtomicUsize::new(1),
            recv_count: AtomicUsize::new(1),
        }))
    }

    // clone another handle to the channel.
    pub(crate) fn clone(&self) -> Self {
        Channel(Arc::clone(&self.0))
    }

    // sender handle count.
    pub(crate) fn send_count(&self) -> &AtomicUsize {
        &self.0.send_count
    }

    // receiver handle count.
    pub(crate) fn recv_count(&self) -> &AtomicUsize {
        &self.0.recv_count
    }

    // lock the channel.
    //
    // no user code runs while the lock is held except waker calls, and no state is left
    // half-updated across them, so a poisoned lock is still consistent.
    pub(crate) fn lock(&self) -> Lock<'_, T> {
        Lock {
            lock: self.0.lockable.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }

    // poll for receiving an element, registering the waker under `waiter` if pending.
    //
    // resolves to none once the channel is closed and drained.
    pub(crate) fn poll_recv(&self, waiter: &mut Option<WaiterKey>, cx: &mut Context) -> Poll<Option<T>> {
        let mut lock = self.lock();
        match lock.try_dequeue() {
            Ok(elem) => {
                lock.remove_receiver(waiter);
                Poll::Ready(Some(elem))
            }
            Err(TryRecvError::Finished) => {
                lock.remove_receiver(waiter);
                Poll::Ready(None)
            }
            Err(TryRecvError::WouldBlock(_)) => {
                lock.register_receiver(waiter, cx);
                Poll::Pending
            }
        }
    }

    // poll for the channel having an element or being finished, without dequeueing anything.
    //
    // the registration under `waiter` is left in place even when this resolves. it keeps counting
    // as a parked receiver, so senders may offer to it, until it is explicitly removed.
    pub(crate) fn poll_ready(&self, waiter: &mut Option<WaiterKey>, cx: &mut Context) -> Poll<()> {
        let mut lock = self.lock();
        if lock.has_elem() || lock.lock.closed {
            Poll::Ready(())
        } else {
            lock.register_receiver(waiter, cx);
            Poll::Pending
        }
    }

    // keep a receive-side registration backing offers, but stop it absorbing wakeups until it is
    // refreshed by polling again. a wakeup it received but did not act on is passed on.
    pub(crate) fn idle_receiver(&self, waiter: &Option<WaiterKey>) {
        if waiter.is_none() {
            return;
        }
        let mut lock = self.lock();
        if lock.lock.recv_waiters.mark_notified(waiter) && lock.has_elem() {
            lock.lock.recv_waiters.wake_one();
        }
    }

    // remove a receive-side registration, avoiding locking if there is none.
    pub(crate) fn remove_receiver(&self, waiter: &mut Option<WaiterKey>) {
        if waiter.is_some() {
            self.lock().remove_receiver(waiter);
        }
    }
}

// lock on a channel.
pub(crate) struct Lock<'a, T> {
    lock: MutexGuard<'a, Lockable<T>>,
}

impl<'a, T> Lock<'a, T> {
    // number of buffered elements. never exceeds the bound.
    pub(crate) fn len(&self) -> usize {
        self.lock.elems.len()
    }

    // configured bound.
    pub(crate) fn bound(&self) -> usize {
        self.lock.bound
    }

    // whether the channel has been closed.
    pub(crate) fn is_closed(&self) -> bool {
        self.lock.closed
    }

    // whether the channel is closed and nothing more will ever be received from it.
    pub(crate) fn is_finished(&self) -> bool {
        self.lock.closed && self.lock.elems.is_empty()
    }

    // number of outstanding offers.
    #[cfg(test)]
    pub(crate) fn offers(&self) -> usize {
        self.lock.offers.len()
    }

    // whether a receiver could take an element right now.
    fn has_elem(&self) -> bool {
        !self.lock.elems.is_empty() || (!self.lock.closed && !self.lock.offers.is_empty())
    }

    // whether a sender could enqueue an element right now, not counting terminal states.
    fn has_room(&self) -> bool {
        self.lock.elems.len() < self.lock.bound
            || self.lock.offers.len() < self.lock.recv_waiters.len()
    }

    // wake the senders of every offer.
    fn wake_offers(&self) {
        for offer in &self.lock.offers {
            offer.sender.wake_by_ref();
        }
    }

    // close the channel, waking all parked operations. outstanding offers get withdrawn when their
    // senders next poll. returns false if already closed.
    pub(crate) fn close(&mut self) -> bool {
        if self.lock.closed {
            return false;
        }
        self.lock.closed = true;
        self.lock.send_waiters.wake_all();
        self.lock.recv_waiters.wake_all();
        self.wake_offers();
        true
    }

    // enter the no receivers state, waking parked send operations.
    pub(crate) fn set_no_receivers(&mut self) {
        self.lock.no_receivers = true;
        self.lock.send_waiters.wake_all();
        self.wake_offers();
    }

    // check for terminal send states.
    fn check_open(&self) -> Result<(), SendErrorCause> {
        if self.lock.closed {
            Err(ClosedChannelError.into())
        } else if self.lock.no_receivers {
            Err(NoReceiversError.into())
        } else {
            Ok(())
        }
    }

    // try to push an element into the buffer without blocking. never makes an offer.
    pub(crate) fn try_push(&mut self, elem: T) -> Result<(), (TrySendErrorCause, T)> {
        if let Err(cause) = self.check_open() {
            return Err((cause.into(), elem));
        }
        if self.lock.elems.len() >= self.lock.bound {
            return Err((WouldBlockError.into(), elem));
        }
        self.lock.elems.push_back(elem);
        self.lock.recv_waiters.wake_one();
        Ok(())
    }

    // try to enqueue an element without blocking.
    //
    // pushes into the buffer if it has room. otherwise, if there are more parked receivers than
    // outstanding offers, offers the element to them, and `sender` is woken once the offer is
    // taken or needs withdrawing.
    pub(crate) fn try_enqueue(&mut self, elem: T, sender: &Waker) -> Result<Enqueued, (TrySendErrorCause, T)> {
        let elem = match self.try_push(elem) {
            Err((TrySendErrorCause::WouldBlock(_), elem)) => elem,
            result => return result.map(|()| Enqueued::Buffered),
        };
        let lock = &mut *self.lock;
        if lock.offers.len() >= lock.recv_waiters.len() {
            return Err((WouldBlockError.into(), elem));
        }
        let seq = lock.next_offer;
        lock.next_offer += 1;
        lock.offers.push_back(Offer { seq, elem, sender: sender.clone() });
        lock.recv_waiters.wake_one();
        Ok(Enqueued::Offered(seq))
    }

    // check on an outstanding offer, refreshing its waker if it stays parked.
    //
    // an offer is withdrawn if the channel closed, if all receivers are gone, or if it is no longer
    // backed by a parked receiver because one left.
    pub(crate) fn poll_offer(&mut self, seq: u64, sender: &Waker) -> OfferState<T> {
        let lock = &mut *self.lock;
        let Some(index) = lock.offers.iter().position(|offer| offer.seq == seq) else {
            return OfferState::Taken;
        };
        if lock.closed || lock.no_receivers || index >= lock.recv_waiters.len() {
            match lock.offers.remove(index) {
                Some(offer) => OfferState::Withdrawn(offer.elem),
                None => OfferState::Taken,
            }
        } else {
            let offer = &mut lock.offers[index];
            if !offer.sender.will_wake(sender) {
                offer.sender = sender.clone();
            }
            OfferState::Parked
        }
    }

    // withdraw an outstanding offer. returns none if it was already taken.
    pub(crate) fn withdraw(&mut self, seq: u64) -> Option<T> {
        let index = self.lock.offers.iter().position(|offer| offer.seq == seq)?;
        let offer = self.lock.offers.remove(index)?;
        if self.has_room() {
            self.lock.send_waiters.wake_one();
        }
        Some(offer.elem)
    }

    // try to pop an element without blocking.
    //
    // buffered elements come first. if there is an offer, the front one then moves into the buffer
    // to keep FIFO order. offers are not taken once the channel is closed.
    pub(crate) fn try_dequeue(&mut self) -> Result<T, TryRecvError> {
        let lock = &mut *self.lock;
        let offer = if lock.closed { None } else { lock.offers.pop_front() };
        let elem = match (lock.elems.pop_front(), offer) {
            (Some(elem), offer) => {
                if let Some(offer) = offer {
                    lock.elems.push_back(offer.elem);
                    offer.sender.wake();
                }
                elem
            }
            (None, Some(offer)) => {
                offer.sender.wake();
                offer.elem
            }
            (None, None) if lock.closed => return Err(TryRecvError::Finished),
            (None, None) => return Err(WouldBlockError.into()),
        };
        if self.has_room() {
            self.lock.send_waiters.wake_one();
        }
        Ok(elem)
    }

    // register or refresh a parked send operation.
    pub(crate) fn register_sender(&mut self, waiter: &mut Option<WaiterKey>, cx: &mut Context) {
        self.lock.send_waiters.register(waiter, cx.waker());
    }

    // remove a parked send operation. a wakeup it received but did not act on is passed on.
    pub(crate) fn remove_sender(&mut self, waiter: &mut Option<WaiterKey>) {
        if self.lock.send_waiters.remove(waiter) && self.has_room() {
            self.lock.send_waiters.wake_one();
        }
    }

    // register or refresh a parked recv operation.
    //
    // a new registration backs one more offer, so it wakes a sender.
    pub(crate) fn register_receiver(&mut self, waiter: &mut Option<WaiterKey>, cx: &mut Context) {
        if self.lock.recv_waiters.register(waiter, cx.waker()) {
            self.lock.send_waiters.wake_one();
        }
    }

    // remove a parked recv operation.
    //
    // offers left without a backing receiver have their senders woken so they withdraw, and a
    // wakeup the receiver received but did not act on is passed on.
    pub(crate) fn remove_receiver(&mut self, waiter: &mut Option<WaiterKey>) {
        if waiter.is_none() {
            return;
        }
        let notified = self.lock.recv_waiters.remove(waiter);
        let backed = self.lock.recv_waiters.len();
        for offer in self.lock.offers.iter().skip(backed) {
            offer.sender.wake_by_ref();
        }
        if notified && self.has_elem() {
            self.lock.recv_waiters.wake_one();
        }
    }
}

// send operation state.
enum SendState<T> {
    // element not yet enqueued.
    Enqueue(T),
    // element offered under the given sequence number, not yet taken.
    Offered(u64),
    // resolved or cancelled.
    Done,
}

// send future. internally locks the channel when polled, cancelled, or dropped.
//
// dropping it withdraws an outstanding offer, so an element is only ever left in the channel by a
// send that resolved to ok.
pub(crate) struct Send<'a, T> {
    channel: &'a Channel<T>,
    state: SendState<T>,
    waiter: Option<WaiterKey>,
}

impl<'a, T> Send<'a, T> {
    // construct a send operation which has not yet been polled.
    pub(crate) fn new(channel: &'a Channel<T>, elem: T) -> Self {
        Send { channel, state: SendState::Enqueue(elem), waiter: None }
    }

    // poll the future.
    //
    // - resolves to ok once the element is buffered or an offer of it was taken.
    // - if the channel enters a terminal send state first, resolves to err with the cause and the
    //   element. this includes an offer being withdrawn because the channel closed.
    //
    // panics if already resolved or cancelled.
    pub(crate) fn poll(&mut self, cx: &mut Context) -> Poll<Result<(), (SendErrorCause, T)>> {
        let mut lock = self.channel.lock();
        loop {
            match std::mem::replace(&mut self.state, SendState::Done) {
                SendState::Done => panic!("send future polled after already resolved or cancelled"),
                SendState::Enqueue(elem) => return match lock.try_enqueue(elem, cx.waker()) {
                    Ok(Enqueued::Buffered) => {
                        lock.remove_sender(&mut self.waiter);
                        Poll::Ready(Ok(()))
                    }
                    Ok(Enqueued::Offered(seq)) => {
                        trace!(seq, "send parked on offer");
                        lock.remove_sender(&mut self.waiter);
                        self.state = SendState::Offered(seq);
                        Poll::Pending
                    }
                    Err((TrySendErrorCause::WouldBlock(_), elem)) => {
                        self.state = SendState::Enqueue(elem);
                        lock.register_sender(&mut self.waiter, cx);
                        Poll::Pending
                    }
                    Err((TrySendErrorCause::Terminal(cause), elem)) => {
                        lock.remove_sender(&mut self.waiter);
                        Poll::Ready(Err((cause, elem)))
                    }
                },
                SendState::Offered(seq) => match lock.poll_offer(seq, cx.waker()) {
                    OfferState::Taken => return Poll::Ready(Ok(())),
                    OfferState::Parked => {
                        self.state = SendState::Offered(seq);
                        return Poll::Pending;
                    }
                    OfferState::Withdrawn(elem) => {
                        trace!(seq, "offer withdrawn");
                        self.state = SendState::Enqueue(elem);
                    }
                },
            }
        }
    }

    // if not already resolved or cancelled, cancel the future.
    //
    // returns the element unless it was already delivered, withdrawing it if it was on offer.
    // never panics.
    pub(crate) fn cancel(&mut self) -> Option<T> {
        match std::mem::replace(&mut self.state, SendState::Done) {
            SendState::Offered(seq) => self.channel.lock().withdraw(seq),
            state => {
                if self.waiter.is_some() {
                    self.channel.lock().remove_sender(&mut self.waiter);
                }
                match state {
                    SendState::Enqueue(elem) => Some(elem),
                    _ => None,
                }
            }
        }
    }

    // whether already resolved or cancelled.
    pub(crate) fn is_terminated(&self) -> bool {
        matches!(self.state, SendState::Done)
    }
}

impl<'a, T> Drop for Send<'a, T> {
    fn drop(&mut self) {
        self.cancel();
    }
}

// recv future. internally locks the channel when polled, cancelled, or dropped.
pub(crate) struct Recv<'a, T> {
    channel: &'a Channel<T>,
    waiter: Option<WaiterKey>,
    done: bool,
}

impl<'a, T> Recv<'a, T> {
    // construct a recv operation which has not yet been polled.
    pub(crate) fn new(channel: &'a Channel<T>) -> Self {
        Recv { channel, waiter: None, done: false }
    }

    // poll the future.
    //
    // resolves to some upon receiving, or none once the channel is closed and drained. panics if
    // already resolved or cancelled.
    pub(crate) fn poll(&mut self, cx: &mut Context) -> Poll<Option<T>> {
        assert!(!self.done, "recv future polled after already resolved or cancelled");
        let poll = self.channel.poll_recv(&mut self.waiter, cx);
        if poll.is_ready() {
            self.done = true;
        }
        poll
    }

    // if not already resolved or cancelled, cancel the future. never panics.
    pub(crate) fn cancel(&mut self) {
        self.channel.remove_receiver(&mut self.waiter);
        self.done = true;
    }

    // whether already resolved or cancelled.
    pub(crate) fn is_terminated(&self) -> bool {
        self.done
    }
}

impl<'a, T> Drop for Recv<'a, T> {
    fn drop(&mut self) {
        self.channel.remove_receiver(&mut self.waiter);
    }
}
