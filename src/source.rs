//! Source files and their tile coordinates.
//!
//! Each source file holds one tile of the horizontal domain. The tile coordinate is encoded in the file name:
//!  - volumetric output: `{experiment}.XXXXYYYY.nc`,
//!  - planar (cross-section) output: `{experiment}.out.{plane}.XXXX.YYYY.nc`.
//!
//! Tiles are always ordered by their coordinate, never by directory listing order, since the order of tiles decides where their chunks land in the stitched arrays.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    str::FromStr,
};

use itertools::Itertools;
use thiserror::Error;
use walkdir::WalkDir;

use crate::subset::Subset;

/// The coordinate of a tile in the horizontal tile grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileIndex {
    /// The tile index along x.
    pub x: u64,
    /// The tile index along y.
    pub y: u64,
}

impl TileIndex {
    /// Create a new tile index.
    #[must_use]
    pub const fn new(x: u64, y: u64) -> Self {
        Self { x, y }
    }
}

impl std::fmt::Display for TileIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// A source file and its tile coordinate.
///
/// Source files order by tile, then by path.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceFile {
    tile: TileIndex,
    path: PathBuf,
}

impl SourceFile {
    /// Create a new source file.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, tile: TileIndex) -> Self {
        Self {
            tile,
            path: path.into(),
        }
    }

    /// The path of the file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The tile coordinate of the file.
    #[must_use]
    pub const fn tile(&self) -> TileIndex {
        self.tile
    }
}

/// A cross-section plane of planar output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Plane {
    /// A horizontal cross-section.
    Xy,
    /// A vertical cross-section along x.
    Xz,
    /// A vertical cross-section along y.
    Yz,
}

impl Plane {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Xy => "xy",
            Self::Xz => "xz",
            Self::Yz => "yz",
        }
    }
}

/// The kind of source data to stitch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataKind {
    /// Volumetric output, all tiles (`3d`).
    Volumetric,
    /// Volumetric output, the first `nx` × `ny` tiles (`3d__first_{nx}x{ny}`).
    VolumetricCropped {
        /// The number of tiles along x.
        nx: u64,
        /// The number of tiles along y.
        ny: u64,
    },
    /// Planar output, all tiles (`xy`, `xz`, `yz`).
    Planar(Plane),
    /// Planar output, the first `nx` × `ny` tiles (e.g. `xy__first_{nx}x{ny}`).
    PlanarCropped {
        /// The cross-section plane.
        plane: Plane,
        /// The number of tiles along x.
        nx: u64,
        /// The number of tiles along y.
        ny: u64,
    },
}

const VOLUMETRIC_SUBSETS: [Subset; 3] = [Subset::CENTER, Subset::X_EDGE, Subset::Y_EDGE];
const PLANAR_SUBSETS: [Subset; 1] = [Subset::CENTER];

impl DataKind {
    /// The subsets the data is partitioned into.
    ///
    /// Volumetric data has scalars on cell centers and velocities on the two staggered grids, planar data has a single subset.
    #[must_use]
    pub fn subsets(&self) -> &'static [Subset] {
        match self {
            Self::Volumetric | Self::VolumetricCropped { .. } => &VOLUMETRIC_SUBSETS,
            Self::Planar(_) | Self::PlanarCropped { .. } => &PLANAR_SUBSETS,
        }
    }

    /// The tile grid extent of a cropped data kind.
    #[must_use]
    pub const fn crop(&self) -> Option<(u64, u64)> {
        match self {
            Self::VolumetricCropped { nx, ny } | Self::PlanarCropped { nx, ny, .. } => {
                Some((*nx, *ny))
            }
            Self::Volumetric | Self::Planar(_) => None,
        }
    }

    /// Parse the tile coordinate of `file_name` if it is a source file of `experiment` of this data kind.
    ///
    /// Files outside the crop window of a cropped data kind do not match.
    #[must_use]
    pub fn match_file_name(&self, experiment: &str, file_name: &str) -> Option<TileIndex> {
        let stem = file_name
            .strip_prefix(experiment)?
            .strip_prefix('.')?
            .strip_suffix(".nc")?;
        let tile = match self {
            Self::Volumetric | Self::VolumetricCropped { .. } => {
                if stem.len() != 8 {
                    return None;
                }
                TileIndex::new(parse_digits(&stem[..4])?, parse_digits(&stem[4..])?)
            }
            Self::Planar(plane) | Self::PlanarCropped { plane, .. } => {
                let stem = stem.strip_prefix("out.")?.strip_prefix(plane.as_str())?;
                let (x, y) = stem.strip_prefix('.')?.split_once('.')?;
                TileIndex::new(parse_digits(x)?, parse_digits(y)?)
            }
        };
        match self.crop() {
            Some((nx, ny)) if tile.x >= nx || tile.y >= ny => None,
            _ => Some(tile),
        }
    }
}

/// Parse exactly four decimal digits.
fn parse_digits(digits: &str) -> Option<u64> {
    if digits.len() == 4 && digits.bytes().all(|b| b.is_ascii_digit()) {
        digits.parse().ok()
    } else {
        None
    }
}

impl std::fmt::Display for DataKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Volumetric => write!(f, "3d"),
            Self::VolumetricCropped { nx, ny } => write!(f, "3d__first_{nx}x{ny}"),
            Self::Planar(plane) => write!(f, "{}", plane.as_str()),
            Self::PlanarCropped { plane, nx, ny } => {
                write!(f, "{}__first_{nx}x{ny}", plane.as_str())
            }
        }
    }
}

/// An unknown data kind.
#[derive(Debug, Error)]
#[error("unknown data kind {0}, expected 3d, xy, xz, yz, optionally followed by __first_NxM")]
pub struct DataKindParseError(String);

impl FromStr for DataKind {
    type Err = DataKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || DataKindParseError(s.to_string());
        let (base, crop) = match s.split_once("__first_") {
            Some((base, crop)) => {
                let (nx, ny) = crop.split_once('x').ok_or_else(err)?;
                let nx: u64 = nx.parse().map_err(|_| err())?;
                let ny: u64 = ny.parse().map_err(|_| err())?;
                if nx == 0 || ny == 0 {
                    return Err(err());
                }
                (base, Some((nx, ny)))
            }
            None => (s, None),
        };
        let plane = match base {
            "3d" => None,
            "xy" => Some(Plane::Xy),
            "xz" => Some(Plane::Xz),
            "yz" => Some(Plane::Yz),
            _ => return Err(err()),
        };
        Ok(match (plane, crop) {
            (None, None) => Self::Volumetric,
            (None, Some((nx, ny))) => Self::VolumetricCropped { nx, ny },
            (Some(plane), None) => Self::Planar(plane),
            (Some(plane), Some((nx, ny))) => Self::PlanarCropped { plane, nx, ny },
        })
    }
}

/// Source files cannot be placed in a complete, deterministic tile grid.
#[derive(Debug, Error)]
pub enum ConcatenationOrderError {
    /// There are no tiles.
    #[error("there are no tiles to concatenate")]
    Empty,
    /// More than one source has the same tile coordinate.
    #[error("tile {0} is provided by more than one source")]
    DuplicateTile(TileIndex),
    /// A tile of the grid has no source.
    #[error("tile {tile} of the {nx}x{ny} tile grid is missing")]
    MissingTile {
        /// The missing tile.
        tile: TileIndex,
        /// The number of tiles along x.
        nx: u64,
        /// The number of tiles along y.
        ny: u64,
    },
}

/// Check that `tiles` form a complete `nx` × `ny` grid anchored at `(0, 0)`, with each tile present once.
///
/// Returns `(nx, ny)`.
///
/// # Errors
/// Returns a [`ConcatenationOrderError`] if the grid is empty, has a duplicate tile, or has a hole.
pub fn validate_tile_grid(
    tiles: impl IntoIterator<Item = TileIndex>,
) -> Result<(u64, u64), ConcatenationOrderError> {
    let mut counts: BTreeMap<TileIndex, usize> = BTreeMap::new();
    for tile in tiles {
        *counts.entry(tile).or_default() += 1;
    }
    if let Some((tile, _)) = counts.iter().find(|(_, &count)| count > 1) {
        return Err(ConcatenationOrderError::DuplicateTile(*tile));
    }
    let nx = counts.keys().map(|tile| tile.x + 1).max().ok_or(ConcatenationOrderError::Empty)?;
    let ny = counts.keys().map(|tile| tile.y + 1).max().ok_or(ConcatenationOrderError::Empty)?;
    if let Some(tile) = (0..nx)
        .cartesian_product(0..ny)
        .map(|(x, y)| TileIndex::new(x, y))
        .find(|tile| !counts.contains_key(tile))
    {
        return Err(ConcatenationOrderError::MissingTile { tile, nx, ny });
    }
    Ok((nx, ny))
}

/// A source enumeration error.
#[derive(Debug, Error)]
pub enum SourceEnumerationError {
    /// The source directory could not be listed.
    #[error(transparent)]
    WalkDir(#[from] walkdir::Error),
    /// No source files matched.
    #[error("no {data_kind} source files of experiment {experiment} in {}", path.display())]
    NoSourceFiles {
        /// The source directory.
        path: PathBuf,
        /// The experiment name.
        experiment: String,
        /// The data kind.
        data_kind: DataKind,
    },
    /// The matched files do not form a complete tile grid.
    #[error(transparent)]
    Order(#[from] ConcatenationOrderError),
}

/// Find the source files of `experiment` of kind `data_kind` in `path`, sorted by tile.
///
/// # Errors
/// Returns a [`SourceEnumerationError`] if `path` cannot be listed, nothing matches, or the tiles of a cropped data kind do not cover the crop window.
pub fn enumerate_sources(
    path: &Path,
    experiment: &str,
    data_kind: DataKind,
) -> Result<Vec<SourceFile>, SourceEnumerationError> {
    let mut sources = Vec::new();
    for entry in WalkDir::new(path).min_depth(1).max_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(file_name) = entry.file_name().to_str() else {
            continue;
        };
        if let Some(tile) = data_kind.match_file_name(experiment, file_name) {
            sources.push(SourceFile::new(entry.path(), tile));
        }
    }
    sources.sort();
    tracing::info!(
        "Found {} {data_kind} source files of {experiment} in {}",
        sources.len(),
        path.display()
    );

    if sources.is_empty() {
        return Err(SourceEnumerationError::NoSourceFiles {
            path: path.to_path_buf(),
            experiment: experiment.to_string(),
            data_kind,
        });
    }
    let (nx, ny) = validate_tile_grid(sources.iter().map(SourceFile::tile))?;
    if let Some((crop_nx, crop_ny)) = data_kind.crop() {
        if (nx, ny) != (crop_nx, crop_ny) {
            let tile = TileIndex::new(
                nx.min(crop_nx.saturating_sub(1)),
                ny.min(crop_ny.saturating_sub(1)),
            );
            return Err(ConcatenationOrderError::MissingTile {
                tile,
                nx: crop_nx,
                ny: crop_ny,
            }
            .into());
        }
    }
    Ok(sources)
}
