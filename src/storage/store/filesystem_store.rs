//! A filesystem store.

use crate::{
    byte_range::{ByteRange, InvalidByteRangeError},
    storage::{MaybeBytes, ReadableStorageTraits, StorageError, StoreKey, WritableStorageTraits},
};

use parking_lot::{Mutex, RwLock};
use thiserror::Error;

use std::{
    collections::HashMap,
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

/// A synchronous file system store.
///
/// Keys map to paths relative to a base directory.
/// Values are written to a sibling temporary file and renamed into place, so a reader never observes a partially written artifact.
#[derive(Debug)]
pub struct FilesystemStore {
    base_path: PathBuf,
    readonly: bool,
    files: Mutex<HashMap<StoreKey, Arc<RwLock<()>>>>,
}

impl FilesystemStore {
    /// Create a new file system store at a given `base_path`.
    ///
    /// # Errors
    /// Returns a [`FilesystemStoreCreateError`] if `base_path`:
    ///   - is not valid, or
    ///   - it points to an existing file rather than a directory.
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, FilesystemStoreCreateError> {
        let base_path = base_path.as_ref().to_path_buf();
        if base_path.to_str().is_none() {
            return Err(FilesystemStoreCreateError::InvalidBasePath(base_path));
        }
        if base_path.is_file() {
            return Err(FilesystemStoreCreateError::NotADirectory(base_path));
        }

        let readonly = if base_path.exists() {
            let md = std::fs::metadata(&base_path)?;
            md.permissions().readonly()
        } else {
            // the path does not exist, so try and create it. If this succeeds, the filesystem is not read only
            std::fs::create_dir_all(&base_path)?;
            false
        };

        Ok(Self {
            base_path,
            readonly,
            files: Mutex::default(),
        })
    }

    /// Create a read only file system store at a given `base_path`.
    ///
    /// Unlike [`FilesystemStore::new`], the base directory is never created.
    /// This is the store used to resolve chunk locators into source files.
    ///
    /// # Errors
    /// Returns a [`FilesystemStoreCreateError`] if `base_path` is not valid or is a file.
    pub fn new_readonly<P: AsRef<Path>>(base_path: P) -> Result<Self, FilesystemStoreCreateError> {
        let base_path = base_path.as_ref().to_path_buf();
        if base_path.to_str().is_none() {
            return Err(FilesystemStoreCreateError::InvalidBasePath(base_path));
        }
        if base_path.is_file() {
            return Err(FilesystemStoreCreateError::NotADirectory(base_path));
        }
        Ok(Self {
            base_path,
            readonly: true,
            files: Mutex::default(),
        })
    }

    /// Returns the base path of the store.
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Maps a [`StoreKey`] to a filesystem [`PathBuf`].
    #[must_use]
    pub fn key_to_fspath(&self, key: &StoreKey) -> PathBuf {
        let mut path = self.base_path.clone();
        path.push(key.as_str());
        path
    }

    fn get_file_mutex(&self, key: &StoreKey) -> Arc<RwLock<()>> {
        let mut files = self.files.lock();
        files
            .entry(key.clone())
            .or_insert_with(|| Arc::new(RwLock::default()))
            .clone()
    }
}

impl ReadableStorageTraits for FilesystemStore {
    fn get_byte_range(
        &self,
        key: &StoreKey,
        byte_range: ByteRange,
    ) -> Result<MaybeBytes, StorageError> {
        let file = self.get_file_mutex(key);
        let _lock = file.read();

        let mut file = match File::open(self.key_to_fspath(key)) {
            Ok(file) => file,
            Err(err) => {
                if err.kind() == std::io::ErrorKind::NotFound {
                    return Ok(None);
                }
                return Err(err.into());
            }
        };

        let size = file.metadata()?.len();
        if !byte_range.is_within(size) {
            return Err(InvalidByteRangeError::new(byte_range, size).into());
        }
        file.seek(SeekFrom::Start(byte_range.start()))?;
        let length = usize::try_from(byte_range.length(size))
            .map_err(|_| StorageError::from(format!("byte range {byte_range} exceeds usize")))?;
        let mut buffer = vec![0; length];
        file.read_exact(&mut buffer)?;
        Ok(Some(buffer))
    }

    fn size_key(&self, key: &StoreKey) -> Result<Option<u64>, StorageError> {
        let key_path = self.key_to_fspath(key);
        match std::fs::metadata(key_path) {
            Ok(metadata) if metadata.is_file() => Ok(Some(metadata.len())),
            Ok(_) => Ok(None),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

impl WritableStorageTraits for FilesystemStore {
    fn set(&self, key: &StoreKey, value: &[u8]) -> Result<(), StorageError> {
        if self.readonly {
            return Err(StorageError::ReadOnly);
        }

        let file = self.get_file_mutex(key);
        let _lock = file.write();

        let key_path = self.key_to_fspath(key);
        if let Some(parent) = key_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // temporary files are per process
        let mut temp_path = key_path.clone().into_os_string();
        temp_path.push(format!(".{}.partial", std::process::id()));
        let temp_path = PathBuf::from(temp_path);
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)?;
            file.write_all(value)?;
            file.sync_all()?;
        }
        std::fs::rename(&temp_path, &key_path)?;
        Ok(())
    }

    fn erase(&self, key: &StoreKey) -> Result<bool, StorageError> {
        if self.readonly {
            return Err(StorageError::ReadOnly);
        }

        let file = self.get_file_mutex(key);
        let _lock = file.write();

        match std::fs::remove_file(self.key_to_fspath(key)) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}

/// A filesystem store creation error.
#[derive(Debug, Error)]
pub enum FilesystemStoreCreateError {
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    /// The path is not valid on this system.
    #[error("base path {} is not valid", .0.display())]
    InvalidBasePath(PathBuf),
    /// The path points to a file.
    #[error("base path {} is a file, not a directory", .0.display())]
    NotADirectory(PathBuf),
}
