//! Client side of the local store.
//!
//! A store applies a list of operations as one transaction. It may refuse the
//! whole list because it is too large to transfer, without telling how large
//! a list it would have accepted.

use thiserror::Error;

use crate::operation::{OperationRequest, OperationResult};

/// Failure reported by [`StoreClient::apply_batch`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The batch could not be transferred or applied because of its size.
    /// Nothing has been applied.
    #[error("transaction too large")]
    TooLarge,

    /// The store rejected the batch for business or referential reasons.
    /// Nothing has been applied.
    #[error("operation application failed: {0}")]
    ApplyFailed(String),

    /// Any other failure of the store or the channel to it.
    #[error("store fault: {0}")]
    Fault(String),
}

/// Connection to a local store, implemented by the sync adapter for its provider.
#[cfg_attr(test, mockall::automock)]
pub trait StoreClient {
    /// Applies all `operations` atomically and returns one result per operation,
    /// in order.
    ///
    /// Value back references in `operations` address positions within this list.
    fn apply_batch(
        &mut self,
        operations: &[OperationRequest],
    ) -> Result<Vec<OperationResult>, StoreError>;
}

impl<S: StoreClient + ?Sized> StoreClient for &mut S {
    fn apply_batch(
        &mut self,
        operations: &[OperationRequest],
    ) -> Result<Vec<OperationResult>, StoreError> {
        (**self).apply_batch(operations)
    }
}
