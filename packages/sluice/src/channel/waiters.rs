// queue of parked operations waiting on a channel.
//
// this plays the role of a linked node queue, but keyed by a monotonically increasing id rather
// than by pointer, so it needs no unsafe code. iteration order of the map is registration order,
// so waking one at a time is FIFO.

use std::{
    collections::BTreeMap,
    task::Waker,
};


// key identifying a registration in a WaiterQueue.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub(crate) struct WaiterKey(u64);

// registered waker.
struct Entry {
    waker: Waker,
    // woken since it last registered or refreshed. such entries are skipped by wake_one, since
    // they are already going to re-poll.
    notified: bool,
}

// queue of registered wakers.
#[derive(Default)]
pub(crate) struct WaiterQueue {
    // registered wakers, in registration order.
    entries: BTreeMap<u64, Entry>,
    // next id to hand out. never reused.
    next_id: u64,
}

impl WaiterQueue {
    // construct empty queue.
    pub(crate) fn new() -> Self {
        WaiterQueue::default()
    }

    // number of registrations.
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    // register a waker, or refresh the waker of an existing registration.
    //
    // returns true if this created a new registration rather than refreshing one. a key whose
    // registration was previously removed gets a fresh registration at the back.
    pub(crate) fn register(&mut self, key: &mut Option<WaiterKey>, waker: &Waker) -> bool {
        if let Some(WaiterKey(id)) = *key {
            if let Some(entry) = self.entries.get_mut(&id) {
                if !entry.waker.will_wake(waker) {
                    entry.waker = waker.clone();
                }
                entry.notified = false;
                return false;
            }
        }
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(id, Entry { waker: waker.clone(), notified: false });
        *key = Some(WaiterKey(id));
        true
    }

    // remove a registration, if present. leaves the key as None.
    //
    // returns whether the removed registration had been woken without re-polling, in which case
    // the caller may need to pass the wakeup on.
    pub(crate) fn remove(&mut self, key: &mut Option<WaiterKey>) -> bool {
        key.take()
            .and_then(|WaiterKey(id)| self.entries.remove(&id))
            .map(|entry| entry.notified)
            .unwrap_or(false)
    }

    // mark a registration as woken without waking it, so wake_one passes over it until it is
    // refreshed. returns whether it was already marked.
    pub(crate) fn mark_notified(&mut self, key: &Option<WaiterKey>) -> bool {
        match key.and_then(|WaiterKey(id)| self.entries.get_mut(&id)) {
            Some(entry) => std::mem::replace(&mut entry.notified, true),
            None => false,
        }
    }

    // wake the oldest registration not already woken, if any.
    pub(crate) fn wake_one(&mut self) {
        if let Some(entry) = self.entries.values_mut().find(|entry| !entry.notified) {
            entry.notified = true;
            entry.waker.wake_by_ref();
        }
    }

    // wake every registration without removing them.
    //
    // woken operations stay registered until they re-poll and either resolve or refresh.
    pub(crate) fn wake_all(&mut self) {
        for entry in self.entries.values_mut() {
            entry.notified = true;
            entry.waker.wake_by_ref();
        }
    }
}
