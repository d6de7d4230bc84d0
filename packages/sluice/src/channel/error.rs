// channel error types.

use std::fmt::{self, Formatter, Debug, Display};
use thiserror::Error;


// ==== base error types ====


/// Error for trying to send into a channel which has been closed
///
/// Sending after close is a protocol violation by the producer side, so this is always surfaced
/// and never retried internally.
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[error("sending on a closed channel")]
pub struct ClosedChannelError;

/// Error for trying to send into a channel for which all receivers have been dropped
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[error("sending on a channel with no receivers")]
pub struct NoReceiversError;

/// Error for attempting to use a channel with no or limited blocking, and the operation not
/// completing immediately or by the specified deadline
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[error("operation would block")]
pub struct WouldBlockError;


// ==== compound error types ====


macro_rules! compound_from {
    ($compound:ident {$(
        $variant:ident($inner:ty),
    )*})=>{$(
        impl From<$inner> for $compound {
            fn from(inner: $inner) -> Self {
                Self::$variant(inner)
            }
        }
    )*};
}

/// Terminal error state for trying to send into a channel
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum SendErrorCause {
    /// The channel was closed before the message could be enqueued
    #[error(transparent)]
    Closed(ClosedChannelError),
    /// All receiver handles have been dropped
    #[error(transparent)]
    NoReceivers(NoReceiversError),
}

compound_from!(SendErrorCause {
    Closed(ClosedChannelError),
    NoReceivers(NoReceiversError),
});

/// Error for trying to send into a channel with no or limited blocking
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum TrySendErrorCause {
    /// The channel has entered some terminal state for senders
    #[error(transparent)]
    Terminal(SendErrorCause),
    /// The operation could not be resolved immediately or by the specified deadline
    #[error(transparent)]
    WouldBlock(WouldBlockError),
}

compound_from!(TrySendErrorCause {
    Terminal(SendErrorCause),
    WouldBlock(WouldBlockError),
});

impl From<ClosedChannelError> for TrySendErrorCause {
    fn from(inner: ClosedChannelError) -> Self {
        TrySendErrorCause::Terminal(inner.into())
    }
}

impl From<NoReceiversError> for TrySendErrorCause {
    fn from(inner: NoReceiversError) -> Self {
        TrySendErrorCause::Terminal(inner.into())
    }
}

/// Error for trying to send into a channel, handing the message back
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct SendError<T> {
    /// The message that could not be sent
    pub msg: T,
    /// The reason the message could not be sent
    pub cause: SendErrorCause,
}

/// Error for trying to send into a channel with no or limited blocking, handing the message back
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct TrySendError<T> {
    /// The message that could not be sent
    pub msg: T,
    /// The reason the message could not be sent
    pub cause: TrySendErrorCause,
}

impl<T> SendError<T> {
    /// Take back the message that could not be sent
    pub fn into_inner(self) -> T {
        self.msg
    }

    /// Whether this failed because the channel was closed
    pub fn is_closed(&self) -> bool {
        matches!(self.cause, SendErrorCause::Closed(_))
    }
}

impl<T> TrySendError<T> {
    /// Take back the message that could not be sent
    pub fn into_inner(self) -> T {
        self.msg
    }

    /// Whether this failed only because the operation would have blocked
    pub fn is_would_block(&self) -> bool {
        matches!(self.cause, TrySendErrorCause::WouldBlock(_))
    }
}

impl<T> From<SendError<T>> for TrySendError<T> {
    fn from(e: SendError<T>) -> Self {
        TrySendError { msg: e.msg, cause: e.cause.into() }
    }
}

// messages are not required to be Debug, so these print only the cause.

impl<T> Debug for SendError<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("SendError").field("cause", &self.cause).finish_non_exhaustive()
    }
}

impl<T> Display for SendError<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        Display::fmt(&self.cause, f)
    }
}

impl<T> std::error::Error for SendError<T> {}

impl<T> Debug for TrySendError<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("TrySendError").field("cause", &self.cause).finish_non_exhaustive()
    }
}

impl<T> Display for TrySendError<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        Display::fmt(&self.cause, f)
    }
}

impl<T> std::error::Error for TrySendError<T> {}

/// Error for trying to receive from a channel with no or limited blocking
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum TryRecvError {
    /// The "finished" state, where the channel is closed and no more buffered messages remain
    ///
    /// This is the end-of-stream signal rather than a failure. It is sticky: once returned, it is
    /// returned by every further receive operation.
    #[error("channel closed and drained")]
    Finished,
    /// The operation could not be resolved immediately or by the specified deadline
    #[error(transparent)]
    WouldBlock(WouldBlockError),
}

compound_from!(TryRecvError {
    WouldBlock(WouldBlockError),
});
