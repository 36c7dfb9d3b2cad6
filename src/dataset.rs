//! Logical datasets and merging.
//!
//! A [`LogicalDataset`] is a [`Manifest`] whose dimensions have been resolved to a single length each.
//! Chunk bytes are only read on request, through [`LogicalDataset::retrieve_chunk_bytes`].

use std::collections::BTreeMap;

use itertools::Itertools;
use thiserror::Error;

use crate::{
    byte_range::ByteRange,
    manifest::{ArrayDescriptor, Attributes, ChunkKey, ChunkRef, Manifest, ManifestError},
    storage::{Bytes, ReadableStorageTraits, StorageError, StoreKey},
    subset::DimensionConflictError,
};

/// A dataset error.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// Arrays disagree on the length of a dimension.
    #[error(transparent)]
    DimensionConflict(#[from] DimensionConflictError),
    /// The dataset has no such array.
    #[error("array {0} does not exist")]
    UnknownArray(String),
    /// Chunk indices do not match the dimensionality of the array.
    #[error("chunk indices {indices:?} are invalid for array {array} with chunk grid {grid_shape:?}")]
    InvalidChunkIndices {
        /// The array name.
        array: String,
        /// The chunk indices.
        indices: Vec<u64>,
        /// The chunk grid shape of the array.
        grid_shape: Vec<u64>,
    },
    /// The source file of a chunk does not exist.
    #[error("the source {path} of chunk {key} does not exist")]
    MissingSource {
        /// The chunk key.
        key: ChunkKey,
        /// The locator path.
        path: String,
    },
    /// A storage error.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// An invalid manifest.
    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

/// A dataset with a single length per dimension.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct LogicalDataset {
    dims: BTreeMap<String, u64>,
    manifest: Manifest,
}

impl LogicalDataset {
    /// Create a logical dataset from a manifest.
    ///
    /// # Errors
    /// Returns [`DimensionConflictError::LengthMismatch`] if arrays disagree on the length of a dimension.
    pub fn from_manifest(manifest: Manifest) -> Result<Self, DatasetError> {
        let mut dims: BTreeMap<String, u64> = BTreeMap::new();
        for (name, array) in manifest.arrays() {
            for (dim, &len) in std::iter::zip(array.dims(), array.shape()) {
                let expected = *dims.entry(dim.clone()).or_insert(len);
                if expected != len {
                    return Err(DimensionConflictError::LengthMismatch {
                        dim: dim.clone(),
                        array: name.clone(),
                        expected,
                        found: len,
                    }
                    .into());
                }
            }
        }
        Ok(Self { dims, manifest })
    }

    /// The dimensions and their lengths.
    #[must_use]
    pub fn dims(&self) -> &BTreeMap<String, u64> {
        &self.dims
    }

    /// The length of dimension `dim`.
    #[must_use]
    pub fn dimension_len(&self, dim: &str) -> Option<u64> {
        self.dims.get(dim).copied()
    }

    /// The descriptor of array `name`.
    #[must_use]
    pub fn array(&self, name: &str) -> Option<&ArrayDescriptor> {
        self.manifest.array(name)
    }

    /// The arrays, by name.
    #[must_use]
    pub fn arrays(&self) -> &BTreeMap<String, ArrayDescriptor> {
        self.manifest.arrays()
    }

    /// The global attributes.
    #[must_use]
    pub fn attributes(&self) -> &Attributes {
        self.manifest.attributes()
    }

    /// The chunk ref of chunk `chunk_indices` of array `array`.
    ///
    /// Returns [`None`] if the chunk has no ref, i.e. it is entirely fill value.
    #[must_use]
    pub fn chunk_ref(&self, array: &str, chunk_indices: &[u64]) -> Option<&ChunkRef> {
        self.manifest
            .chunk(&ChunkKey::new(array, chunk_indices.to_vec()))
    }

    /// The underlying manifest.
    #[must_use]
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Convert to a manifest.
    #[must_use]
    pub fn to_manifest(&self) -> Manifest {
        self.manifest.clone()
    }

    /// Retrieve the encoded bytes of chunk `chunk_indices` of array `array`.
    ///
    /// Inline chunks are returned directly.
    /// Locator chunks are read from `storage`, with the locator path mapped to a key by [`StoreKey::from_locator_path`].
    /// Returns [`None`] if the chunk has no ref.
    ///
    /// # Errors
    /// Returns a [`DatasetError`] if the array does not exist, the indices are outside its chunk grid, the source of the chunk does not exist, or there is an underlying storage error.
    pub fn retrieve_chunk_bytes(
        &self,
        array: &str,
        chunk_indices: &[u64],
        storage: &dyn ReadableStorageTraits,
    ) -> Result<Option<Bytes>, DatasetError> {
        let descriptor = self
            .array(array)
            .ok_or_else(|| DatasetError::UnknownArray(array.to_string()))?;
        let grid_shape = descriptor.metadata().chunk_grid_shape();
        let in_bounds = chunk_indices.len() == grid_shape.len()
            && std::iter::zip(chunk_indices, &grid_shape).all(|(index, len)| index < len);
        if !in_bounds {
            return Err(DatasetError::InvalidChunkIndices {
                array: array.to_string(),
                indices: chunk_indices.to_vec(),
                grid_shape,
            });
        }

        let key = ChunkKey::new(array, chunk_indices.to_vec());
        match self.manifest.chunk(&key) {
            None => Ok(None),
            Some(ChunkRef::Inline(bytes)) => Ok(Some(bytes.clone())),
            Some(chunk_ref @ ChunkRef::Locator { path, .. }) => {
                let store_key = StoreKey::from_locator_path(path).map_err(StorageError::from)?;
                let byte_range = chunk_ref.byte_range().unwrap_or(ByteRange::ALL);
                match storage.get_byte_range(&store_key, byte_range)? {
                    Some(bytes) => Ok(Some(bytes)),
                    None => Err(DatasetError::MissingSource {
                        key,
                        path: path.clone(),
                    }),
                }
            }
        }
    }
}

impl std::fmt::Display for LogicalDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "<LogicalDataset>")?;
        writeln!(
            f,
            "Dimensions: ({})",
            self.dims
                .iter()
                .map(|(dim, len)| format!("{dim}: {len}"))
                .join(", ")
        )?;
        writeln!(f, "Arrays:")?;
        let width = self.arrays().keys().map(String::len).max().unwrap_or_default();
        for (name, array) in self.arrays() {
            let dtype = match &array.metadata().dtype {
                serde_json::Value::String(dtype) => dtype.clone(),
                dtype => dtype.to_string(),
            };
            writeln!(
                f,
                "    {name:<width$}  ({}) {dtype}, {} chunks",
                array.dims().join(", "),
                self.manifest.array_chunks(name).count()
            )?;
        }
        write!(f, "Attributes:")?;
        for (key, value) in self.attributes() {
            write!(f, "\n    {key}: {value}")?;
        }
        Ok(())
    }
}

/// Merge datasets with override precedence.
///
/// A single dataset is returned unchanged.
/// Otherwise datasets are merged in order: an array present in more than one dataset is replaced, descriptor and chunks, by the later one.
/// Global attributes are merged key by key with the same precedence.
/// Dimensions are the union over all datasets, with the length of a repeated dimension taken from the later dataset.
/// Merging no datasets yields an empty dataset.
///
/// # Errors
/// Returns a [`DatasetError`] if the merged manifest is invalid.
pub fn merge(datasets: Vec<LogicalDataset>) -> Result<LogicalDataset, DatasetError> {
    if datasets.len() <= 1 {
        return Ok(datasets.into_iter().next().unwrap_or_default());
    }

    let mut dims = BTreeMap::new();
    let mut attributes = Attributes::new();
    let mut arrays = BTreeMap::new();
    let mut chunks: BTreeMap<ChunkKey, ChunkRef> = BTreeMap::new();
    for dataset in datasets {
        dims.extend(dataset.dims);
        let (dataset_attributes, dataset_arrays, dataset_chunks) = dataset.manifest.into_parts();
        for (key, value) in dataset_attributes {
            attributes.insert(key, value);
        }
        for (name, array) in dataset_arrays {
            if arrays.insert(name.clone(), array).is_some() {
                tracing::debug!("Overriding array {name}");
                chunks.retain(|key, _| key.array() != name);
            }
        }
        chunks.extend(dataset_chunks);
    }
    let manifest = Manifest::new(attributes, arrays, chunks)?;
    Ok(LogicalDataset { dims, manifest })
}
