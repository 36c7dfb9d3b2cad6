//! Key/value storage.
//!
//! Two parts of the pipeline talk to storage:
//!  - the [artifact store](crate::artifact) persists merged manifests under deterministic keys, and
//!  - [`LogicalDataset::retrieve_chunk_bytes`](crate::dataset::LogicalDataset::retrieve_chunk_bytes) reads chunk byte ranges out of source files.
//!
//! Both go through the abstract interfaces defined here, so a [`FilesystemStore`](store::FilesystemStore) can be swapped for a [`MemoryStore`](store::MemoryStore) in tests.

mod storage_sync;
pub mod store;
mod store_key;

use thiserror::Error;

use crate::byte_range::InvalidByteRangeError;

pub use store_key::{StoreKey, StoreKeyError};

pub use self::storage_sync::{
    ReadableStorageTraits, ReadableWritableStorageTraits, WritableStorageTraits,
};

/// The bytes of a stored value.
pub type Bytes = Vec<u8>;

/// Optional bytes, [`None`] if a key does not exist.
pub type MaybeBytes = Option<Bytes>;

/// A storage error.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A write operation was attempted on a read only store.
    #[error("a write operation was attempted on a read only store")]
    ReadOnly,
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    /// An invalid store key.
    #[error(transparent)]
    InvalidStoreKey(#[from] StoreKeyError),
    /// An invalid byte range.
    #[error(transparent)]
    InvalidByteRangeError(#[from] InvalidByteRangeError),
    /// Any other error.
    #[error("{0}")]
    Other(String),
}

impl From<&str> for StorageError {
    fn from(err: &str) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<String> for StorageError {
    fn from(err: String) -> Self {
        Self::Other(err)
    }
}
