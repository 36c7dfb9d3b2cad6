//! Concatenation of tile manifests into one manifest.
//!
//! The [`GridConcatenator`] stitches a complete `nx` × `ny` grid of tile manifests along the two grid dimensions of a [`Subset`].
//! Chunks are never copied or re-encoded: each chunk ref keeps pointing into its tile's source file, only its chunk key is shifted to the tile's position in the stitched array.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::{
    manifest::{ArrayDescriptor, ChunkKey, Manifest, ManifestError},
    source::{validate_tile_grid, ConcatenationOrderError, TileIndex},
    subset::{DimensionConflictError, Subset},
};

/// A concatenation error.
#[derive(Debug, Error)]
pub enum ConcatenateError {
    /// The tiles do not form a complete grid.
    #[error(transparent)]
    ConcatenationOrder(#[from] ConcatenationOrderError),
    /// Arrays disagree on their dimensions.
    #[error(transparent)]
    DimensionConflict(#[from] DimensionConflictError),
    /// A tile lacks an array that the other tiles have.
    #[error("tile {tile} has no array {array}")]
    MissingArray {
        /// The array name.
        array: String,
        /// The tile.
        tile: TileIndex,
    },
    /// An array has different chunk shapes in different tiles.
    #[error("array {array} has chunk shape {found:?} in tile {tile}, expected {expected:?}")]
    ChunkShapeMismatch {
        /// The array name.
        array: String,
        /// The tile with the conflicting chunk shape.
        tile: TileIndex,
        /// The chunk shape seen first.
        expected: Vec<u64>,
        /// The conflicting chunk shape.
        found: Vec<u64>,
    },
    /// A tile does not start on a chunk boundary of the stitched array.
    #[error("array {array} cannot be concatenated along {dim}: tile offset {offset} is not a multiple of the chunk length {chunk_len}")]
    IrregularChunks {
        /// The array name.
        array: String,
        /// The concatenation dimension.
        dim: String,
        /// The offset of the tile along `dim`.
        offset: u64,
        /// The chunk length along `dim`.
        chunk_len: u64,
    },
    /// The stitched manifest is invalid.
    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

/// Concatenates the manifests of a tile grid into one manifest.
pub trait ManifestConcatenatorTraits: Send + Sync {
    /// Concatenate `tiles` along the two grid dimensions of `subset`.
    ///
    /// # Errors
    /// Returns a [`ConcatenateError`] if the tiles do not form a complete grid or cannot be stitched.
    fn concatenate(
        &self,
        tiles: &[(TileIndex, Manifest)],
        subset: &Subset,
    ) -> Result<Manifest, ConcatenateError>;
}

/// A regular grid concatenator.
///
/// An array that lacks a concatenation dimension is taken from the first row or column of tiles only, e.g. an `xt` coordinate comes from the `y = 0` row and `time` from tile `(0, 0)`.
/// Per-tile extents are read from array shapes, so tiles may differ in size as long as every tile starts on a chunk boundary.
/// Global attributes are taken from tile `(0, 0)`.
#[derive(Clone, Copy, Debug, Default)]
pub struct GridConcatenator;

impl GridConcatenator {
    /// Create a new grid concatenator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// The extents of tiles along one concatenation dimension, indexed by the tile coordinate along that axis.
struct AxisExtents<'a> {
    dim: &'a str,
    extents: BTreeMap<u64, u64>,
}

impl<'a> AxisExtents<'a> {
    fn new(dim: &'a str) -> Self {
        Self {
            dim,
            extents: BTreeMap::new(),
        }
    }

    fn record(&mut self, array: &str, coordinate: u64, len: u64) -> Result<(), DimensionConflictError> {
        let expected = *self.extents.entry(coordinate).or_insert(len);
        if expected == len {
            Ok(())
        } else {
            Err(DimensionConflictError::LengthMismatch {
                dim: self.dim.to_string(),
                array: array.to_string(),
                expected,
                found: len,
            })
        }
    }

    /// The prefix sums of the extents, and the total length.
    fn offsets(&self, n: u64) -> (BTreeMap<u64, u64>, u64) {
        let mut offsets = BTreeMap::new();
        let mut total = 0;
        for coordinate in 0..n {
            offsets.insert(coordinate, total);
            total += self.extents.get(&coordinate).copied().unwrap_or_default();
        }
        (offsets, total)
    }
}

impl ManifestConcatenatorTraits for GridConcatenator {
    fn concatenate(
        &self,
        tiles: &[(TileIndex, Manifest)],
        subset: &Subset,
    ) -> Result<Manifest, ConcatenateError> {
        let (nx, ny) = validate_tile_grid(tiles.iter().map(|(tile, _)| *tile))?;
        let tiles: BTreeMap<TileIndex, &Manifest> =
            tiles.iter().map(|(tile, manifest)| (*tile, manifest)).collect();
        let [x_dim, y_dim] = subset.dims();
        let mut x_extents = AxisExtents::new(x_dim);
        let mut y_extents = AxisExtents::new(y_dim);

        let names: BTreeSet<&str> = tiles
            .values()
            .flat_map(|manifest| manifest.arrays().keys().map(String::as_str))
            .collect();

        // Find the participating tiles of every array and check they agree
        let mut participants: BTreeMap<&str, Vec<(TileIndex, &ArrayDescriptor)>> =
            BTreeMap::new();
        for name in names {
            let Some(reference) = tiles.values().find_map(|manifest| manifest.array(name)) else {
                continue;
            };
            let has_x = reference.dim_position(x_dim).is_some();
            let has_y = reference.dim_position(y_dim).is_some();
            let mut arrays = Vec::new();
            for (tile, manifest) in &tiles {
                // dims must agree in every tile, participating or not
                if let Some(array) = manifest.array(name) {
                    if array.dims() != reference.dims() {
                        return Err(DimensionConflictError::DimsMismatch {
                            array: name.to_string(),
                            expected: reference.dims().to_vec(),
                            found: array.dims().to_vec(),
                        }
                        .into());
                    }
                }
                if (!has_x && tile.x != 0) || (!has_y && tile.y != 0) {
                    continue;
                }
                let array = manifest
                    .array(name)
                    .ok_or_else(|| ConcatenateError::MissingArray {
                        array: name.to_string(),
                        tile: *tile,
                    })?;
                if array.chunk_shape() != reference.chunk_shape() {
                    return Err(ConcatenateError::ChunkShapeMismatch {
                        array: name.to_string(),
                        tile: *tile,
                        expected: reference.chunk_shape().to_vec(),
                        found: array.chunk_shape().to_vec(),
                    });
                }
                for ((dim, &len), &expected) in
                    std::iter::zip(array.dims(), array.shape()).zip(reference.shape())
                {
                    if dim == x_dim {
                        x_extents.record(name, tile.x, len)?;
                    } else if dim == y_dim {
                        y_extents.record(name, tile.y, len)?;
                    } else if len != expected {
                        return Err(DimensionConflictError::LengthMismatch {
                            dim: dim.clone(),
                            array: name.to_string(),
                            expected,
                            found: len,
                        }
                        .into());
                    }
                }
                arrays.push((*tile, array));
            }
            participants.insert(name, arrays);
        }

        let (x_offsets, x_len) = x_extents.offsets(nx);
        let (y_offsets, y_len) = y_extents.offsets(ny);

        // Stitch
        let mut arrays = BTreeMap::new();
        let mut chunks = BTreeMap::new();
        for (name, tile_arrays) in participants {
            let Some((_, reference)) = tile_arrays.first() else {
                continue;
            };
            let mut descriptor = (*reference).clone();
            for (position, dim) in reference.dims().iter().enumerate() {
                if dim == x_dim {
                    descriptor = descriptor.with_dim_len(position, x_len);
                } else if dim == y_dim {
                    descriptor = descriptor.with_dim_len(position, y_len);
                }
            }

            for (tile, array) in &tile_arrays {
                let mut shift = vec![0; array.dims().len()];
                for (position, dim) in array.dims().iter().enumerate() {
                    let offset = if dim == x_dim {
                        x_offsets.get(&tile.x)
                    } else if dim == y_dim {
                        y_offsets.get(&tile.y)
                    } else {
                        None
                    };
                    let offset = offset.copied().unwrap_or_default();
                    let chunk_len = array.chunk_shape()[position];
                    if offset % chunk_len != 0 {
                        return Err(ConcatenateError::IrregularChunks {
                            array: name.to_string(),
                            dim: dim.clone(),
                            offset,
                            chunk_len,
                        });
                    }
                    shift[position] = offset / chunk_len;
                }
                for (key, chunk_ref) in tiles[tile].array_chunks(name) {
                    let indices = std::iter::zip(key.indices(), &shift)
                        .map(|(index, shift)| index + shift)
                        .collect();
                    chunks.insert(ChunkKey::new(name, indices), chunk_ref.clone());
                }
            }
            arrays.insert(name.to_string(), descriptor);
        }

        let attributes = tiles
            .get(&TileIndex::new(0, 0))
            .map(|manifest| manifest.attributes().clone())
            .unwrap_or_default();
        tracing::debug!(
            "Concatenated {nx}x{ny} tiles along {x_dim} ({x_len}) and {y_dim} ({y_len}): {} arrays, {} chunks",
            arrays.len(),
            chunks.len()
        );
        Ok(Manifest::new(attributes, arrays, chunks)?)
    }
}

#[cfg(test)]
mod tests {
    use itertools::Itertools;

    use super::*;
    use crate::manifest::{ArrayMetadataV2, Attributes, ChunkRef};

    fn dim_shape(dim: &str, block: u64, chunk: u64) -> (u64, u64) {
        match dim {
            "time" => (2, 1),
            "zt" | "zm" => (4, 4),
            _ => (block, chunk),
        }
    }

    fn tile_manifest(tile: TileIndex, block: u64, chunk: u64, arrays: &[(&str, &[&str])]) -> Manifest {
        let path = format!("rico.{:04}{:04}.nc", tile.x, tile.y);
        let mut descriptors = BTreeMap::new();
        let mut chunks = BTreeMap::new();
        let mut offset = 0;
        for (name, dims) in arrays {
            let (shape, chunk_shape): (Vec<u64>, Vec<u64>) =
                dims.iter().map(|dim| dim_shape(dim, block, chunk)).unzip();
            let metadata = ArrayMetadataV2::new(shape, chunk_shape);
            for indices in metadata
                .chunk_grid_shape()
                .into_iter()
                .map(|n| 0..n)
                .multi_cartesian_product()
            {
                chunks.insert(
                    ChunkKey::new(*name, indices),
                    ChunkRef::locator(path.clone(), offset, 100),
                );
                offset += 100;
            }
            descriptors.insert(
                (*name).to_string(),
                ArrayDescriptor::new(
                    dims.iter().map(ToString::to_string).collect(),
                    metadata,
                    Attributes::new(),
                )
                .unwrap(),
            );
        }
        let mut attributes = Attributes::new();
        attributes.insert("tile".to_string(), format!("{tile}").into());
        Manifest::new(attributes, descriptors, chunks).unwrap()
    }

    const CENTER_ARRAYS: &[(&str, &[&str])] = &[
        ("time", &["time"]),
        ("xt", &["xt"]),
        ("yt", &["yt"]),
        ("zt", &["zt"]),
        ("thl", &["time", "zt", "yt", "xt"]),
    ];

    fn grid(nx: u64, ny: u64, block: u64, chunk: u64) -> Vec<(TileIndex, Manifest)> {
        (0..nx)
            .cartesian_product(0..ny)
            .map(|(x, y)| {
                let tile = TileIndex::new(x, y);
                (tile, tile_manifest(tile, block, chunk, CENTER_ARRAYS))
            })
            .collect()
    }

    #[test]
    fn concatenate_grid() {
        let manifest = GridConcatenator::new()
            .concatenate(&grid(2, 3, 32, 32), &Subset::CENTER)
            .unwrap();
        assert_eq!(manifest.array("xt").unwrap().shape(), &[64]);
        assert_eq!(manifest.array("yt").unwrap().shape(), &[96]);
        assert_eq!(manifest.array("time").unwrap().shape(), &[2]);
        assert_eq!(manifest.array("thl").unwrap().shape(), &[2, 4, 96, 64]);
        assert_eq!(manifest.array_chunks("xt").count(), 2);
        assert_eq!(manifest.array_chunks("yt").count(), 3);
        assert_eq!(manifest.array_chunks("time").count(), 2);
        assert_eq!(manifest.array_chunks("thl").count(), 2 * 3 * 2);
        assert_eq!(manifest.attributes()["tile"], "(0, 0)");

        let ChunkRef::Locator { path, .. } = manifest
            .chunk(&ChunkKey::new("thl", vec![1, 0, 2, 1]))
            .unwrap()
        else {
            panic!("expected a locator")
        };
        assert_eq!(path, "rico.00010002.nc");
        let ChunkRef::Locator { path, .. } =
            manifest.chunk(&ChunkKey::new("xt", vec![1])).unwrap()
        else {
            panic!("expected a locator")
        };
        assert_eq!(path, "rico.00010000.nc");
    }

    #[test]
    fn concatenate_input_order_independent() {
        let mut tiles = grid(2, 2, 16, 8);
        let expected = GridConcatenator::new()
            .concatenate(&tiles, &Subset::CENTER)
            .unwrap();
        tiles.reverse();
        let manifest = GridConcatenator::new()
            .concatenate(&tiles, &Subset::CENTER)
            .unwrap();
        assert_eq!(manifest, expected);
        assert_eq!(manifest.array_chunks("thl").count(), 2 * 4 * 4);
    }

    #[test]
    fn concatenate_missing_tile() {
        let mut tiles = grid(2, 3, 32, 32);
        tiles.remove(3);
        assert!(matches!(
            GridConcatenator::new().concatenate(&tiles, &Subset::CENTER),
            Err(ConcatenateError::ConcatenationOrder(
                ConcatenationOrderError::MissingTile { .. }
            ))
        ));
    }

    #[test]
    fn concatenate_irregular_chunks() {
        assert!(matches!(
            GridConcatenator::new().concatenate(&grid(2, 1, 32, 20), &Subset::CENTER),
            Err(ConcatenateError::IrregularChunks { offset: 32, chunk_len: 20, .. })
        ));
    }

    #[test]
    fn concatenate_length_mismatch() {
        let mut tiles = grid(2, 2, 32, 16);
        tiles[3] = (
            TileIndex::new(1, 1),
            tile_manifest(TileIndex::new(1, 1), 48, 16, CENTER_ARRAYS),
        );
        assert!(matches!(
            GridConcatenator::new().concatenate(&tiles, &Subset::CENTER),
            Err(ConcatenateError::DimensionConflict(
                DimensionConflictError::LengthMismatch { .. }
            ))
        ));
    }

    #[test]
    fn concatenate_dims_mismatch() {
        let mut tiles = grid(1, 2, 32, 32);
        tiles[1] = (
            TileIndex::new(0, 1),
            tile_manifest(
                TileIndex::new(0, 1),
                32,
                32,
                &[("yt", &["yt"]), ("thl", &["time", "zt", "xt", "yt"])],
            ),
        );
        assert!(matches!(
            GridConcatenator::new().concatenate(&tiles, &Subset::CENTER),
            Err(ConcatenateError::DimensionConflict(
                DimensionConflictError::DimsMismatch { .. }
            ))
        ));
    }

    #[test]
    fn concatenate_dims_mismatch_outside_first_row() {
        // time only participates from tile (0, 0), but its dims are checked in every tile
        let mut tiles = grid(2, 1, 32, 32);
        let mut arrays = CENTER_ARRAYS.to_vec();
        arrays[0] = ("time", &["zt"]);
        tiles[1] = (
            TileIndex::new(1, 0),
            tile_manifest(TileIndex::new(1, 0), 32, 32, &arrays),
        );
        assert!(matches!(
            GridConcatenator::new().concatenate(&tiles, &Subset::CENTER),
            Err(ConcatenateError::DimensionConflict(
                DimensionConflictError::DimsMismatch { array, .. }
            )) if array == "time"
        ));
    }

    #[test]
    fn concatenate_missing_array() {
        let mut tiles = grid(2, 1, 32, 32);
        tiles[1] = (
            TileIndex::new(1, 0),
            tile_manifest(TileIndex::new(1, 0), 32, 32, &CENTER_ARRAYS[..4]),
        );
        assert!(matches!(
            GridConcatenator::new().concatenate(&tiles, &Subset::CENTER),
            Err(ConcatenateError::MissingArray { array, .. }) if array == "thl"
        ));
    }
}
