//! Batch operations for local sync stores.
//!
//! Sync adapters turn remote calendar, contact and task data into inserts,
//! updates and deletes against a local store. This crate queues those
//! operations and commits them as one transaction:
//! - `operation`: builders for single operations, including back references
//!   to rows created earlier in the same batch
//! - `batch`: the queue and its commit, which splits the batch into smaller
//!   transactions when the store refuses it as too large
//! - `store`: the client interface a store has to implement
//! - `profile` and `config`: per-backend yield point limits

pub mod batch;
pub mod config;
pub mod error;
pub mod operation;
pub mod profile;
pub mod store;
pub mod values;

pub use batch::{BatchOperation, CommitError};
pub use config::{ResultCountPolicy, StorageConfig};
pub use error::{ConfigError, InvalidOperationDescriptor, LocalStorageError};
pub use operation::{
    BackReference, OperationBuilder, OperationKind, OperationRequest, OperationResult, Selection,
};
pub use profile::BackendProfile;
pub use store::{StoreClient, StoreError};
pub use values::{Value, Values};
