//! Stores.
//!
//! A [`FilesystemStore`] keeps artifacts on disk and reads byte ranges of source files.
//! A [`MemoryStore`] is useful for tests and for pipelines that do not need durable artifacts.

mod filesystem_store;
mod memory_store;

pub use filesystem_store::{FilesystemStore, FilesystemStoreCreateError};
pub use memory_store::MemoryStore;

#[cfg(test)]
mod test_util;
