use std::error::Error;

use crate::{
    byte_range::ByteRange,
    storage::{ReadableStorageTraits, StoreKey, WritableStorageTraits},
};

pub fn store_write<T: WritableStorageTraits>(store: &T) -> Result<(), Box<dyn Error>> {
    store.set(&"a/b".try_into()?, &[0, 1, 2, 3])?;
    store.set(&"a/c".try_into()?, &[4])?;
    store.set(&"a/d/e".try_into()?, &[5, 6])?;
    store.set(&"a/d/f".try_into()?, &[])?;
    store.set(&"a/d/f".try_into()?, &[7, 8, 9])?;
    store.set(&"z".try_into()?, &[10])?;
    assert!(store.erase(&"z".try_into()?)?);
    assert!(!store.erase(&"z".try_into()?)?);
    Ok(())
}

pub fn store_read<T: ReadableStorageTraits>(store: &T) -> Result<(), Box<dyn Error>> {
    let key_b: StoreKey = "a/b".try_into()?;
    assert_eq!(store.get(&key_b)?, Some(vec![0, 1, 2, 3]));
    assert_eq!(store.get(&"a/d/f".try_into()?)?, Some(vec![7, 8, 9]));
    assert!(store.get(&"z".try_into()?)?.is_none());
    assert_eq!(store.size_key(&key_b)?, Some(4));
    assert_eq!(store.size_key(&"a/c".try_into()?)?, Some(1));
    assert!(store.size_key(&"a/x".try_into()?)?.is_none());
    assert_eq!(
        store.get_byte_range(&key_b, ByteRange::new(1, Some(2)))?,
        Some(vec![1, 2])
    );
    assert_eq!(
        store.get_byte_range(&key_b, ByteRange::new(3, None))?,
        Some(vec![3])
    );
    assert!(store
        .get_byte_range(&key_b, ByteRange::new(3, Some(2)))
        .is_err());
    Ok(())
}
