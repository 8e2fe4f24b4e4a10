//! Bounded, thread-safe FIFO for handing data between threads.
//!
//! Used wherever data crosses from one OS thread to another, such as
//! decoded media hand-off or session events forwarded to a logging thread.
//!
//! ```rust
//! use control_queue::{BoundedBlockingQueue, OfferError};
//!
//! let queue = BoundedBlockingQueue::new(1);
//! queue.offer("first").unwrap();
//! assert!(matches!(queue.offer("second"), Err(OfferError::BoundExceeded("second"))));
//! assert_eq!(queue.wait_and_take(), Ok("first"));
//!
//! queue.offer("left over").unwrap();
//! assert_eq!(queue.destroy().collect::<Vec<_>>(), vec!["left over"]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod blocking;
pub mod error;

pub use blocking::{BoundedBlockingQueue, Remaining};
pub use error::{OfferError, TakeError};
