//! The artifact store: a durable cache of assembled subset manifests.
//!
//! An assembled manifest is identified by an [`ArtifactId`], the `(experiment, data kind, subset)` triple it was assembled for.
//! Assembly is deterministic, so a stored artifact can be returned in place of re-assembling its subset.

use std::sync::Arc;

use thiserror::Error;

use crate::{
    manifest::{Manifest, ManifestError},
    source::DataKind,
    storage::{ReadableWritableStorageTraits, StorageError, StoreKey, StoreKeyError},
    subset::Subset,
};

/// The identity of an assembled subset manifest.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ArtifactId {
    experiment: String,
    data_kind: DataKind,
    subset: Subset,
}

impl ArtifactId {
    /// Create a new artifact identity.
    #[must_use]
    pub fn new(experiment: impl Into<String>, data_kind: DataKind, subset: Subset) -> Self {
        Self {
            experiment: experiment.into(),
            data_kind,
            subset,
        }
    }

    /// The experiment name.
    #[must_use]
    pub fn experiment(&self) -> &str {
        &self.experiment
    }

    /// The data kind.
    #[must_use]
    pub const fn data_kind(&self) -> DataKind {
        self.data_kind
    }

    /// The subset.
    #[must_use]
    pub const fn subset(&self) -> Subset {
        self.subset
    }

    /// The store key of the artifact, `{experiment}/{data_kind}/{subset}.json`.
    ///
    /// # Errors
    /// Returns a [`StoreKeyError`] if the experiment name does not form a valid key.
    pub fn store_key(&self) -> Result<StoreKey, StoreKeyError> {
        StoreKey::new(format!(
            "{}/{}/{}.json",
            self.experiment, self.data_kind, self.subset
        ))
    }
}

impl std::fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.experiment, self.data_kind, self.subset)
    }
}

/// A stored artifact could not be parsed.
#[derive(Debug, Error)]
#[error("cached artifact {id} is corrupt: {source}")]
pub struct CacheCorruptionError {
    id: ArtifactId,
    source: ManifestError,
}

impl CacheCorruptionError {
    /// Create a new cache corruption error.
    #[must_use]
    pub fn new(id: ArtifactId, source: ManifestError) -> Self {
        Self { id, source }
    }

    /// The identity of the corrupt artifact.
    #[must_use]
    pub fn id(&self) -> &ArtifactId {
        &self.id
    }
}

/// An artifact store error.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// The underlying store failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// A stored artifact could not be parsed.
    #[error(transparent)]
    CacheCorruption(#[from] CacheCorruptionError),
    /// A manifest could not be serialised.
    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

impl From<StoreKeyError> for ArtifactError {
    fn from(err: StoreKeyError) -> Self {
        Self::Storage(err.into())
    }
}

/// Durable storage of assembled manifests.
pub trait ArtifactStoreTraits: Send + Sync {
    /// Returns true if an artifact is stored for `id`.
    ///
    /// The artifact is not read or parsed.
    ///
    /// # Errors
    /// Returns an [`ArtifactError`] if the underlying store fails.
    fn exists(&self, id: &ArtifactId) -> Result<bool, ArtifactError>;

    /// Retrieve the artifact stored for `id`.
    ///
    /// Returns [`None`] if no artifact is stored.
    ///
    /// # Errors
    /// Returns [`ArtifactError::CacheCorruption`] if the stored artifact cannot be parsed, or another [`ArtifactError`] if the underlying store fails.
    fn get(&self, id: &ArtifactId) -> Result<Option<Manifest>, ArtifactError>;

    /// Store `manifest` as the artifact for `id`, replacing any existing artifact.
    ///
    /// # Errors
    /// Returns an [`ArtifactError`] if the manifest cannot be serialised or stored.
    fn put(&self, id: &ArtifactId, manifest: &Manifest) -> Result<(), ArtifactError>;

    /// Remove the artifact stored for `id`, returning true if it existed.
    ///
    /// # Errors
    /// Returns an [`ArtifactError`] if the underlying store fails.
    fn remove(&self, id: &ArtifactId) -> Result<bool, ArtifactError>;
}

/// An artifact store backed by a key/value store.
///
/// Artifacts are stored as JSON reference documents at [`ArtifactId::store_key`].
#[derive(Debug)]
pub struct StorageArtifactStore<TStorage: ?Sized> {
    storage: Arc<TStorage>,
}

impl<TStorage: ?Sized> StorageArtifactStore<TStorage> {
    /// Create a new artifact store.
    #[must_use]
    pub fn new(storage: Arc<TStorage>) -> Self {
        Self { storage }
    }

    /// The underlying storage.
    #[must_use]
    pub fn storage(&self) -> &Arc<TStorage> {
        &self.storage
    }
}

impl<TStorage: ?Sized + ReadableWritableStorageTraits> ArtifactStoreTraits
    for StorageArtifactStore<TStorage>
{
    fn exists(&self, id: &ArtifactId) -> Result<bool, ArtifactError> {
        Ok(self.storage.size_key(&id.store_key()?)?.is_some())
    }

    fn get(&self, id: &ArtifactId) -> Result<Option<Manifest>, ArtifactError> {
        let Some(bytes) = self.storage.get(&id.store_key()?)? else {
            return Ok(None);
        };
        Manifest::from_reference_json(&bytes)
            .map(Some)
            .map_err(|err| CacheCorruptionError::new(id.clone(), err).into())
    }

    fn put(&self, id: &ArtifactId, manifest: &Manifest) -> Result<(), ArtifactError> {
        let bytes = manifest.to_reference_json()?;
        self.storage.set(&id.store_key()?, &bytes)?;
        Ok(())
    }

    fn remove(&self, id: &ArtifactId) -> Result<bool, ArtifactError> {
        Ok(self.storage.erase(&id.store_key()?)?)
    }
}
