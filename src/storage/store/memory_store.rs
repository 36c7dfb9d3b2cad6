//! An in-memory store.

use parking_lot::RwLock;

use crate::{
    byte_range::{extract_byte_range, ByteRange},
    storage::{MaybeBytes, ReadableStorageTraits, StorageError, StoreKey, WritableStorageTraits},
};

use std::{collections::BTreeMap, sync::Arc};

/// An in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data_map: RwLock<BTreeMap<StoreKey, Arc<Vec<u8>>>>,
}

impl MemoryStore {
    /// Create a new, empty memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReadableStorageTraits for MemoryStore {
    fn get_byte_range(
        &self,
        key: &StoreKey,
        byte_range: ByteRange,
    ) -> Result<MaybeBytes, StorageError> {
        let data = self.data_map.read().get(key).cloned();
        data.map(|data| extract_byte_range(&data, byte_range).map_err(StorageError::from))
            .transpose()
    }

    fn size_key(&self, key: &StoreKey) -> Result<Option<u64>, StorageError> {
        Ok(self
            .data_map
            .read()
            .get(key)
            .map(|data| data.len() as u64))
    }
}

impl WritableStorageTraits for MemoryStore {
    fn set(&self, key: &StoreKey, value: &[u8]) -> Result<(), StorageError> {
        self.data_map
            .write()
            .insert(key.clone(), Arc::new(value.to_vec()));
        Ok(())
    }

    fn erase(&self, key: &StoreKey) -> Result<bool, StorageError> {
        Ok(self.data_map.write().remove(key).is_some())
    }
}
