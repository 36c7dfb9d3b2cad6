#![allow(dead_code)]

use std::collections::BTreeMap;

use itertools::Itertools;
use tilestitch::{
    manifest::{ArrayDescriptor, ArrayMetadataV2, Attributes, ChunkKey, ChunkRef, Manifest},
    source::TileIndex,
};

/// The arrays of a volumetric tile file on a staggered grid.
pub const VOLUMETRIC_ARRAYS: &[(&str, &[&str])] = &[
    ("time", &["time"]),
    ("zt", &["zt"]),
    ("zm", &["zm"]),
    ("xt", &["xt"]),
    ("xm", &["xm"]),
    ("yt", &["yt"]),
    ("ym", &["ym"]),
    ("thl", &["time", "zt", "yt", "xt"]),
    ("u", &["time", "zt", "yt", "xm"]),
    ("v", &["time", "zt", "ym", "xt"]),
    ("w", &["time", "zm", "yt", "xt"]),
];

pub fn tile_file_name(experiment: &str, tile: TileIndex) -> String {
    format!("{experiment}.{:04}{:04}.nc", tile.x, tile.y)
}

/// The manifest of a volumetric tile with a horizontal extent of `block` × `block`.
pub fn tile_manifest(experiment: &str, tile: TileIndex, block: u64) -> Manifest {
    tile_manifest_with(experiment, tile, block, VOLUMETRIC_ARRAYS)
}

/// The manifest of a tile holding `tile_arrays`, given as names and dimension names.
pub fn tile_manifest_with(
    experiment: &str,
    tile: TileIndex,
    block: u64,
    tile_arrays: &[(&str, &[&str])],
) -> Manifest {
    let path = format!("/data/{}", tile_file_name(experiment, tile));
    let mut arrays = BTreeMap::new();
    let mut chunks = BTreeMap::new();
    let mut offset = 0;
    for (name, dims) in tile_arrays {
        let (shape, chunk_shape): (Vec<u64>, Vec<u64>) = dims
            .iter()
            .map(|dim| match *dim {
                "time" => (2, 1),
                "zt" | "zm" => (4, 4),
                _ => (block, block),
            })
            .unzip();
        let metadata = ArrayMetadataV2::new(shape, chunk_shape);
        for indices in metadata
            .chunk_grid_shape()
            .into_iter()
            .map(|n| 0..n)
            .multi_cartesian_product()
        {
            chunks.insert(
                ChunkKey::new(*name, indices),
                ChunkRef::locator(path.clone(), offset, 64),
            );
            offset += 64;
        }
        let mut attributes = Attributes::new();
        attributes.insert("long_name".to_string(), (*name).into());
        arrays.insert(
            (*name).to_string(),
            ArrayDescriptor::new(
                dims.iter().map(ToString::to_string).collect(),
                metadata,
                attributes,
            )
            .unwrap(),
        );
    }
    let mut attributes = Attributes::new();
    attributes.insert("title".to_string(), experiment.into());
    Manifest::new(attributes, arrays, chunks).unwrap()
}
