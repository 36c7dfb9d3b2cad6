//! Stitch tiled simulation output into a single virtual Zarr (V2) dataset, without copying data.
//!
//! A large-eddy simulation run on a horizontally decomposed domain writes one file per tile.
//! `tilestitch` indexes those files as chunk [`manifests`](manifest::Manifest) and stitches the tiles of each staggered-grid [`Subset`](subset::Subset) into one manifest per subset, then merges the subsets into a single [`LogicalDataset`](dataset::LogicalDataset).
//!
//! ## Pipeline
//!  1. [`source`]: enumerate the tile files of an experiment and parse their tile coordinates.
//!  2. [`generator`]: produce a manifest per tile file.
//!  3. [`subset`]: classify arrays by their split dimensions and filter each manifest to one subset.
//!  4. [`concatenate`]: stitch the filtered tile manifests along the subset's grid dimensions.
//!  5. [`assemble`]: run 2 to 4 for each subset, caching results in the [`artifact`] store.
//!  6. [`dataset`]: merge the subset manifests into one dataset.
//!
//! [`pipeline::Pipeline`] runs all of the above for a source directory.
//!
//! ## Example
//! ```rust,no_run
//! # use std::path::Path;
//! use tilestitch::{pipeline::Pipeline, source::DataKind};
//!
//! let output = Pipeline::new().run(Path::new("/data/rico"), "rico", DataKind::Volumetric)?;
//! println!("{}", output.dataset);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Licence
//! `tilestitch` is licensed under either of
//!  - the Apache License, Version 2.0 [LICENSE-APACHE](./LICENCE-APACHE) or <http://www.apache.org/licenses/LICENSE-2.0> or
//!  - the MIT license [LICENSE-MIT](./LICENCE-MIT) or <http://opensource.org/licenses/MIT>, at your option.
//!
//! Unless you explicitly state otherwise, any contribution intentionally submitted for inclusion in the work by you, as defined in the Apache-2.0 license, shall be dual licensed as above, without any additional terms or conditions.

#![warn(unused_variables)]
#![warn(dead_code)]
#![deny(missing_docs)]
// #![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![deny(clippy::missing_panics_doc)]

pub mod artifact;
pub mod assemble;
pub mod byte_range;
pub mod concatenate;
pub mod config;
pub mod dataset;
pub mod generator;
pub mod manifest;
pub mod pipeline;
pub mod source;
pub mod storage;
pub mod subset;
