//! Bounded channels, a worker pool built on them, and a fair multiplexer for merging several
//! channels into one consumer.
//!
//! ```
//! let (send, recv) = sluice::channel(2);
//! send.send_blocking("hello").unwrap();
//! send.send_blocking("world").unwrap();
//! drop(send);
//! assert_eq!(recv.iter().collect::<Vec<_>>(), ["hello", "world"]);
//! ```

#[macro_use]
extern crate tracing;

mod channel;
pub mod clock;
pub mod pool;
pub mod producer;
pub mod select;

pub use crate::channel::api::*;

/// Error types
pub mod error {
    pub use crate::channel::error::*;
    pub use crate::pool::{PoolError, ProcessingError};
}

/// Future types
pub mod future {
    pub use crate::channel::api::future::*;
    pub use crate::select::WaitAny;
}
