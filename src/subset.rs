//! Staggered-grid subsets and the subset filter.
//!
//! Arrays of a tiled dataset live on different staggered grids: a scalar such as `thl` varies over cell centers (`xt`, `yt`),
//! the velocity `u` over x cell edges (`xm`, `yt`), and `v` over y cell edges (`xt`, `ym`).
//! Tiles can only be concatenated along one pair of dimensions at a time, so every per-file [`Manifest`] is split into [`Subset`]s first.
//!
//! An array is assigned to subsets by its *split-dimension set*: its dimensions minus the [non-split dimensions](crate::config::Config#non-split-dimensions) (time and vertical levels).
//! See [`SplitClass`] for the rules.

use std::str::FromStr;

use itertools::Itertools;
use thiserror::Error;

use crate::{config::global_config, manifest::Manifest};

/// A horizontal grid axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Axis {
    /// The x axis.
    X,
    /// The y axis.
    Y,
}

/// Where a quantity is sampled within a grid cell along one axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stagger {
    /// Cell centers.
    Center,
    /// Cell edges.
    Edge,
}

/// A horizontal grid dimension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridDim {
    axis: Axis,
    stagger: Stagger,
}

impl GridDim {
    /// `xt`: x cell centers.
    pub const XT: Self = Self::new(Axis::X, Stagger::Center);
    /// `xm`: x cell edges.
    pub const XM: Self = Self::new(Axis::X, Stagger::Edge);
    /// `yt`: y cell centers.
    pub const YT: Self = Self::new(Axis::Y, Stagger::Center);
    /// `ym`: y cell edges.
    pub const YM: Self = Self::new(Axis::Y, Stagger::Edge);

    /// Create a new grid dimension.
    #[must_use]
    pub const fn new(axis: Axis, stagger: Stagger) -> Self {
        Self { axis, stagger }
    }

    /// The axis of the dimension.
    #[must_use]
    pub const fn axis(&self) -> Axis {
        self.axis
    }

    /// The stagger of the dimension.
    #[must_use]
    pub const fn stagger(&self) -> Stagger {
        self.stagger
    }

    /// The dimension name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match (self.axis, self.stagger) {
            (Axis::X, Stagger::Center) => "xt",
            (Axis::X, Stagger::Edge) => "xm",
            (Axis::Y, Stagger::Center) => "yt",
            (Axis::Y, Stagger::Edge) => "ym",
        }
    }

    /// Look up a grid dimension by name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        [Self::XT, Self::XM, Self::YT, Self::YM]
            .into_iter()
            .find(|dim| dim.name() == name)
    }
}

impl std::fmt::Display for GridDim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// An invalid subset.
#[derive(Debug, Error)]
#[error("invalid subset {0}: a subset pairs one x grid dimension (xt, xm) with one y grid dimension (yt, ym)")]
pub struct InvalidSubsetError(String);

/// An unordered pair of one x and one y [`GridDim`].
///
/// A subset is one staggered-grid partition of the dataset, and its two dimensions are the concatenation dimensions of its tiles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Subset {
    x: GridDim,
    y: GridDim,
}

impl Subset {
    /// Cell centers: `{xt, yt}`.
    pub const CENTER: Self = Self {
        x: GridDim::XT,
        y: GridDim::YT,
    };
    /// x cell edges: `{xm, yt}`.
    pub const X_EDGE: Self = Self {
        x: GridDim::XM,
        y: GridDim::YT,
    };
    /// y cell edges: `{xt, ym}`.
    pub const Y_EDGE: Self = Self {
        x: GridDim::XT,
        y: GridDim::YM,
    };

    /// Create a subset from two grid dimensions, in either order.
    ///
    /// # Errors
    /// Returns [`InvalidSubsetError`] unless one dimension is on the x axis and the other on the y axis.
    pub fn new(a: GridDim, b: GridDim) -> Result<Self, InvalidSubsetError> {
        match (a.axis(), b.axis()) {
            (Axis::X, Axis::Y) => Ok(Self { x: a, y: b }),
            (Axis::Y, Axis::X) => Ok(Self { x: b, y: a }),
            _ => Err(InvalidSubsetError(format!("{{{a}, {b}}}"))),
        }
    }

    /// The x dimension.
    #[must_use]
    pub const fn x(&self) -> GridDim {
        self.x
    }

    /// The y dimension.
    #[must_use]
    pub const fn y(&self) -> GridDim {
        self.y
    }

    /// The dimension names, x first.
    #[must_use]
    pub const fn dims(&self) -> [&'static str; 2] {
        [self.x.name(), self.y.name()]
    }

    /// Returns true if `dim` is one of the two dimensions of the subset.
    #[must_use]
    pub fn contains(&self, dim: &str) -> bool {
        self.x.name() == dim || self.y.name() == dim
    }

    /// Returns true if `{a, b}` is this subset, in either order.
    #[must_use]
    pub fn is_pair(&self, a: &str, b: &str) -> bool {
        let [x, y] = self.dims();
        (a == x && b == y) || (a == y && b == x)
    }
}

impl std::fmt::Display for Subset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.x, self.y)
    }
}

impl FromStr for Subset {
    type Err = InvalidSubsetError;

    /// Parse `xt_yt`, `xt,yt` or `yt,xt`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidSubsetError(s.to_string());
        let (a, b) = s.split_once([',', '_']).ok_or_else(invalid)?;
        let a = GridDim::from_name(a.trim()).ok_or_else(invalid)?;
        let b = GridDim::from_name(b.trim()).ok_or_else(invalid)?;
        Self::new(a, b)
    }
}

/// The classification of an array by its split-dimension set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SplitClass<'a> {
    /// No split dimensions (e.g. `time`, `zt`, or a scalar): the array belongs to every subset.
    Agnostic,
    /// One split dimension (e.g. the `xm` coordinate): the array belongs to every subset containing it.
    Single(&'a str),
    /// Two split dimensions (e.g. `u` over `xm`, `yt`): the array belongs to exactly that subset.
    Pair(&'a str, &'a str),
    /// More than two split dimensions, or a repeated split dimension.
    Unsupported(Vec<&'a str>),
}

impl<'a> SplitClass<'a> {
    /// Classify an array with dimension names `dims`, excluding `non_split_dims`.
    #[must_use]
    pub fn classify(dims: &'a [String], non_split_dims: &[String]) -> Self {
        let split_dims: Vec<&str> = dims
            .iter()
            .map(String::as_str)
            .filter(|dim| !non_split_dims.iter().any(|non_split| non_split == dim))
            .collect();
        if !split_dims.iter().all_unique() {
            return Self::Unsupported(split_dims);
        }
        match split_dims.len() {
            0 => Self::Agnostic,
            1 => Self::Single(split_dims[0]),
            2 => Self::Pair(split_dims[0], split_dims[1]),
            _ => Self::Unsupported(split_dims),
        }
    }

    /// Returns true if an array of this class belongs to `subset`.
    ///
    /// # Errors
    /// Returns the split dimensions of an [`Unsupported`](SplitClass::Unsupported) class.
    pub fn belongs_to(&self, subset: &Subset) -> Result<bool, Vec<String>> {
        match self {
            Self::Agnostic => Ok(true),
            Self::Single(dim) => Ok(subset.contains(dim)),
            Self::Pair(a, b) => Ok(subset.is_pair(a, b)),
            Self::Unsupported(split_dims) => {
                Err(split_dims.iter().map(ToString::to_string).collect())
            }
        }
    }
}

/// An inconsistency in the dimensions of the arrays being stitched.
#[derive(Debug, Error)]
pub enum DimensionConflictError {
    /// An array's split-dimension set cannot be assigned to a subset.
    #[error("array {array} has unsupported split dimensions {split_dims:?}")]
    UnsupportedSplitDimensions {
        /// The array name.
        array: String,
        /// The split dimensions of the array.
        split_dims: Vec<String>,
    },
    /// The same array has different dimension names in different manifests.
    #[error("array {array} has dimensions {found:?}, expected {expected:?}")]
    DimsMismatch {
        /// The array name.
        array: String,
        /// The dimension names seen first.
        expected: Vec<String>,
        /// The conflicting dimension names.
        found: Vec<String>,
    },
    /// An array with split dimensions belongs to none of the subsets being assembled.
    #[error("array {array} with split dimensions {split_dims:?} belongs to none of the subsets {subsets}")]
    UnassignedArray {
        /// The array name.
        array: String,
        /// The split dimensions of the array.
        split_dims: Vec<String>,
        /// The subsets being assembled.
        subsets: String,
    },
    /// A dimension has different lengths in different arrays or tiles.
    #[error("dimension {dim} has length {found} in {array}, expected {expected}")]
    LengthMismatch {
        /// The dimension name.
        dim: String,
        /// The array with the conflicting length.
        array: String,
        /// The length seen first.
        expected: u64,
        /// The conflicting length.
        found: u64,
    },
}

/// Restrict `manifest` to the arrays that belong to `subset`, using the global [non-split dimensions](crate::config::Config#non-split-dimensions).
///
/// # Errors
/// Returns [`DimensionConflictError::UnsupportedSplitDimensions`] if any array has an unsupported split-dimension set.
pub fn filter(manifest: &Manifest, subset: &Subset) -> Result<Manifest, DimensionConflictError> {
    let non_split_dims = global_config().non_split_dimensions().to_vec();
    filter_with(manifest, subset, &non_split_dims)
}

/// Restrict `manifest` to the arrays that belong to `subset`, excluding `non_split_dims` from classification.
///
/// Chunks of retained arrays and the global attributes are passed through unchanged.
///
/// # Errors
/// Returns [`DimensionConflictError::UnsupportedSplitDimensions`] if any array has an unsupported split-dimension set.
pub fn filter_with(
    manifest: &Manifest,
    subset: &Subset,
    non_split_dims: &[String],
) -> Result<Manifest, DimensionConflictError> {
    for (name, array) in manifest.arrays() {
        if let SplitClass::Unsupported(split_dims) =
            SplitClass::classify(array.dims(), non_split_dims)
        {
            return Err(DimensionConflictError::UnsupportedSplitDimensions {
                array: name.clone(),
                split_dims: split_dims.iter().map(ToString::to_string).collect(),
            });
        }
    }
    Ok(manifest.retain_arrays(|_, array| {
        SplitClass::classify(array.dims(), non_split_dims)
            .belongs_to(subset)
            .unwrap_or(false)
    }))
}

/// Check that every array of `manifest` is kept by at least one of `subsets`.
///
/// A coordinate over a known grid dimension that no subset contains (e.g. `xm` in planar data) is not assembled and is only logged.
///
/// # Errors
/// Returns [`DimensionConflictError::UnsupportedSplitDimensions`] if any array has an unsupported split-dimension set, or
/// [`DimensionConflictError::UnassignedArray`] if an array over two split dimensions or an unknown split dimension belongs to no subset.
pub fn check_assignment(
    manifest: &Manifest,
    subsets: &[Subset],
    non_split_dims: &[String],
) -> Result<(), DimensionConflictError> {
    for (name, array) in manifest.arrays() {
        let class = SplitClass::classify(array.dims(), non_split_dims);
        let mut kept = false;
        for subset in subsets {
            kept |= class.belongs_to(subset).map_err(|split_dims| {
                DimensionConflictError::UnsupportedSplitDimensions {
                    array: name.clone(),
                    split_dims,
                }
            })?;
        }
        if kept {
            continue;
        }
        match class {
            SplitClass::Single(dim) if GridDim::from_name(dim).is_some() => {
                tracing::debug!("Coordinate {name} over {dim} is not part of any assembled subset");
            }
            SplitClass::Single(dim) => {
                return Err(unassigned(name, &[dim], subsets));
            }
            SplitClass::Pair(a, b) => {
                return Err(unassigned(name, &[a, b], subsets));
            }
            SplitClass::Agnostic | SplitClass::Unsupported(_) => {}
        }
    }
    Ok(())
}

fn unassigned(array: &str, split_dims: &[&str], subsets: &[Subset]) -> DimensionConflictError {
    DimensionConflictError::UnassignedArray {
        array: array.to_string(),
        split_dims: split_dims.iter().map(ToString::to_string).collect(),
        subsets: subsets.iter().join(", "),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::manifest::{ArrayDescriptor, ArrayMetadataV2, Attributes, ChunkKey, ChunkRef};

    fn non_split() -> Vec<String> {
        ["time", "zt", "zm"].map(String::from).to_vec()
    }

    fn manifest(arrays: &[(&str, &[&str])]) -> Manifest {
        let mut descriptors = BTreeMap::new();
        let mut chunks = BTreeMap::new();
        for (name, dims) in arrays {
            let shape = vec![4; dims.len()];
            descriptors.insert(
                (*name).to_string(),
                ArrayDescriptor::new(
                    dims.iter().map(ToString::to_string).collect(),
                    ArrayMetadataV2::new(shape.clone(), shape),
                    Attributes::new(),
                )
                .unwrap(),
            );
            chunks.insert(
                ChunkKey::new(*name, vec![0; dims.len()]),
                ChunkRef::locator("tile.nc", 0, 64),
            );
        }
        let mut attributes = Attributes::new();
        attributes.insert("title".to_string(), "rico".into());
        Manifest::new(attributes, descriptors, chunks).unwrap()
    }

    fn uclales_manifest() -> Manifest {
        manifest(&[
            ("time", &["time"]),
            ("zt", &["zt"]),
            ("xt", &["xt"]),
            ("xm", &["xm"]),
            ("yt", &["yt"]),
            ("ym", &["ym"]),
            ("thl", &["time", "zt", "yt", "xt"]),
            ("u", &["time", "zt", "yt", "xm"]),
            ("v", &["time", "zt", "ym", "xt"]),
            ("w", &["time", "zm", "yt", "xt"]),
        ])
    }

    fn names(manifest: &Manifest) -> Vec<&str> {
        manifest.arrays().keys().map(String::as_str).collect()
    }

    #[test]
    fn subset_new() {
        assert_eq!(Subset::new(GridDim::YT, GridDim::XM).unwrap(), Subset::X_EDGE);
        assert!(Subset::new(GridDim::XT, GridDim::XM).is_err());
        assert_eq!(Subset::CENTER.dims(), ["xt", "yt"]);
        assert_eq!(Subset::Y_EDGE.to_string(), "xt_ym");
    }

    #[test]
    fn subset_from_str() {
        assert_eq!("xt_yt".parse::<Subset>().unwrap(), Subset::CENTER);
        assert_eq!("yt,xm".parse::<Subset>().unwrap(), Subset::X_EDGE);
        assert!("xt_zt".parse::<Subset>().is_err());
        assert!("xt".parse::<Subset>().is_err());
    }

    #[test]
    fn split_class() {
        let non_split = non_split();
        let dims = |dims: &[&str]| dims.iter().map(ToString::to_string).collect::<Vec<_>>();
        let time = dims(&["time", "zt"]);
        assert_eq!(SplitClass::classify(&time, &non_split), SplitClass::Agnostic);
        let xm = dims(&["xm"]);
        assert_eq!(SplitClass::classify(&xm, &non_split), SplitClass::Single("xm"));
        let u = dims(&["time", "zt", "yt", "xm"]);
        assert_eq!(
            SplitClass::classify(&u, &non_split),
            SplitClass::Pair("yt", "xm")
        );
        let three = dims(&["xt", "yt", "xm"]);
        assert!(matches!(
            SplitClass::classify(&three, &non_split),
            SplitClass::Unsupported(_)
        ));
        let repeated = dims(&["xt", "xt"]);
        assert!(matches!(
            SplitClass::classify(&repeated, &non_split),
            SplitClass::Unsupported(_)
        ));
    }

    #[test]
    fn filter_center() {
        let filtered = filter_with(&uclales_manifest(), &Subset::CENTER, &non_split()).unwrap();
        assert_eq!(names(&filtered), ["thl", "time", "w", "xt", "yt", "zt"]);
        assert_eq!(filtered.chunks().len(), 6);
        assert_eq!(filtered.attributes()["title"], "rico");
    }

    #[test]
    fn filter_staggered() {
        let filtered = filter_with(&uclales_manifest(), &Subset::X_EDGE, &non_split()).unwrap();
        assert_eq!(names(&filtered), ["time", "u", "xm", "yt", "zt"]);
        let filtered = filter_with(&uclales_manifest(), &Subset::Y_EDGE, &non_split()).unwrap();
        assert_eq!(names(&filtered), ["time", "v", "xt", "ym", "zt"]);
    }

    #[test]
    fn filter_agnostic_in_every_subset() {
        let manifest = uclales_manifest();
        for subset in [Subset::CENTER, Subset::X_EDGE, Subset::Y_EDGE] {
            let filtered = filter_with(&manifest, &subset, &non_split()).unwrap();
            for name in ["time", "zt"] {
                assert_eq!(filtered.array(name), manifest.array(name));
                assert_eq!(
                    filtered.array_chunks(name).collect::<Vec<_>>(),
                    manifest.array_chunks(name).collect::<Vec<_>>()
                );
            }
        }
    }

    #[test]
    fn filter_pairs_partition() {
        let manifest = uclales_manifest();
        let subsets = [Subset::CENTER, Subset::X_EDGE, Subset::Y_EDGE];
        for name in ["thl", "u", "v", "w"] {
            let count = subsets
                .iter()
                .filter(|subset| {
                    filter_with(&manifest, subset, &non_split())
                        .unwrap()
                        .array(name)
                        .is_some()
                })
                .count();
            assert_eq!(count, 1, "{name}");
        }
    }

    #[test]
    fn filter_idempotent() {
        let manifest = uclales_manifest();
        for subset in [Subset::CENTER, Subset::X_EDGE, Subset::Y_EDGE] {
            let once = filter_with(&manifest, &subset, &non_split()).unwrap();
            let twice = filter_with(&once, &subset, &non_split()).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn filter_unsupported() {
        let manifest = manifest(&[("odd", &["xt", "yt", "xm"])]);
        assert!(matches!(
            filter_with(&manifest, &Subset::CENTER, &non_split()),
            Err(DimensionConflictError::UnsupportedSplitDimensions { array, .. }) if array == "odd"
        ));
    }

    #[test]
    fn check_assignment_volumetric() {
        let subsets = [Subset::CENTER, Subset::X_EDGE, Subset::Y_EDGE];
        check_assignment(&uclales_manifest(), &subsets, &non_split()).unwrap();

        let corner = manifest(&[("time", &["time"]), ("vort", &["time", "zt", "ym", "xm"])]);
        assert!(matches!(
            check_assignment(&corner, &subsets, &non_split()),
            Err(DimensionConflictError::UnassignedArray { array, split_dims, .. })
                if array == "vort" && split_dims == ["ym", "xm"]
        ));

        let unknown = manifest(&[("lat", &["lat"])]);
        assert!(matches!(
            check_assignment(&unknown, &subsets, &non_split()),
            Err(DimensionConflictError::UnassignedArray { array, .. }) if array == "lat"
        ));
    }

    #[test]
    fn check_assignment_planar() {
        let planar = manifest(&[
            ("xt", &["xt"]),
            ("xm", &["xm"]),
            ("yt", &["yt"]),
            ("lwp", &["time", "yt", "xt"]),
        ]);
        check_assignment(&planar, &[Subset::CENTER], &non_split()).unwrap();

        let staggered = manifest(&[("u", &["time", "yt", "xm"])]);
        assert!(check_assignment(&staggered, &[Subset::CENTER], &non_split()).is_err());
    }
}
