// implementation of the bounded channel.
//
// the basic architecture is vaguely inspired by flume. it is as such:
//
// channel handles wrap around Arc<Mutex<shared state>>
//                                         |
//          /------------------------------/
//          v
//       shared state
//          |
//          |------ it contains a VecDeque<T> holding the buffered elements, and the closed flag.
//          |       both are only ever touched with the mutex held. the buffer never grows past
//          |       the bound.
//          |
//          |------ it contains a queue of "offers":
//          |
//          |       when the buffer is full but receivers are parked, a sender may offer its
//          |       element to them instead, up to one offer per parked receiver. the offer stays
//          |       owned by its sender until a receiver takes it, and goes back to the sender if
//          |       it gives up or the channel closes. the same happens when a parked receiver
//          |       leaves and the offer is no longer backed. this is what makes capacity 0 work.
//          |
//          |------ it contains a "send waiter queue":
//          |
//          |       this is a queue of wakers, each corresponding to a pending send future that
//          |       found no room. each pop that leaves room wakes the oldest of them.
//          |
//          \------ it contains a "recv waiter queue", which is the same idea for recv futures
//                  and for multiplexer readiness waits. each push wakes the oldest of them.
//
// waking is one at a time, in FIFO order. an operation that was woken but leaves without acting
// on it passes the wakeup on. only close and the no receivers state wake everyone.
//
// blocking versions of operations are built as a layer on top of the futures, in the polling
// module, which parks the thread on a condvar until a waker fires.
//
// the organization of these modules is as such:
//
//      These are used like
//      library utilities:
//    /--------------------\
//
//      waiters<---------------core: Channel state and the send/recv futures. Panics if futures
//                             ^     are misused, but otherwise upholds all channel invariants.
//                             |
//      polling<---------------api: This is a wrapper around core that adapts it into an API that
//                                  is convenient and defensive. The crate re-exports this API
//                                  publically.
//
// there is also the error module, which contains the relevant error types, which is also
// re-exported publically.

pub(crate) mod error;
pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod polling;

mod waiters;

pub(crate) use self::waiters::WaiterKey;
