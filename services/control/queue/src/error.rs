//! Queue error types.

use thiserror::Error;

/// Reasons an offer was refused. The rejected item is always handed back.
#[derive(Error)]
pub enum OfferError<T> {
    /// The queue already holds `bound` items
    #[error("queue bound exceeded")]
    BoundExceeded(T),

    /// Storage for the new entry could not be allocated
    #[error("out of memory")]
    OutOfMemory(T),

    /// The queue has been torn down
    #[error("queue interrupted")]
    Interrupted(T),
}

impl<T> OfferError<T> {
    /// Recover the rejected item
    pub fn into_inner(self) -> T {
        match self {
            OfferError::BoundExceeded(item)
            | OfferError::OutOfMemory(item)
            | OfferError::Interrupted(item) => item,
        }
    }
}

// Payloads need not be Debug
impl<T> std::fmt::Debug for OfferError<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OfferError::BoundExceeded(_) => f.write_str("BoundExceeded(..)"),
            OfferError::OutOfMemory(_) => f.write_str("OutOfMemory(..)"),
            OfferError::Interrupted(_) => f.write_str("Interrupted(..)"),
        }
    }
}

/// Reasons a take returned without an item
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakeError {
    /// The queue was torn down while waiting
    #[error("queue interrupted")]
    Interrupted,

    /// No item arrived before the deadline
    #[error("timed out waiting for an item")]
    TimedOut,
}
