//! Per-file manifest generation.
//!
//! A [`ManifestGeneratorTraits`] implementation turns one [`SourceFile`] into a [`Manifest`].
//! [`generate_all`] runs a generator over many source files concurrently, retrying each file a bounded number of times.

use std::{
    io::Read,
    path::{Path, PathBuf},
};

use rayon::iter::{IntoParallelIterator, ParallelIterator};
use rayon_iter_concurrent_limit::iter_concurrent_limit;
use thiserror::Error;

use crate::{
    manifest::{Manifest, ManifestError},
    source::SourceFile,
};

/// A source file could not be turned into a manifest.
#[derive(Debug, Error)]
pub enum SourceReadError {
    /// The source file or its reference document could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// The path that failed to read.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },
    /// The reference document of a source file does not exist.
    #[error("{} has no reference document at {}", source_path.display(), reference_path.display())]
    MissingReference {
        /// The source file.
        source_path: PathBuf,
        /// The expected reference document path.
        reference_path: PathBuf,
    },
    /// The source file is not a recognised container.
    #[error("{} is not a HDF5 or NetCDF3 file", path.display())]
    UnrecognizedContainer {
        /// The source file.
        path: PathBuf,
    },
    /// The reference document of a source file is malformed.
    #[error("invalid reference document {}: {source}", path.display())]
    InvalidReference {
        /// The reference document path.
        path: PathBuf,
        /// The underlying error.
        source: ManifestError,
    },
    /// Generation failed on every attempt.
    #[error("failed to generate a manifest for {} after {attempts} attempts: {source}", path.display())]
    RetriesExhausted {
        /// The source file.
        path: PathBuf,
        /// The number of attempts made.
        attempts: usize,
        /// The error of the last attempt.
        source: Box<SourceReadError>,
    },
    /// Any other error.
    #[error("{0}")]
    Other(String),
}

impl From<String> for SourceReadError {
    fn from(err: String) -> Self {
        Self::Other(err)
    }
}

/// Produces the manifest of a single source file.
pub trait ManifestGeneratorTraits: Send + Sync {
    /// Generate the manifest of `source`.
    ///
    /// # Errors
    /// Returns a [`SourceReadError`] if `source` cannot be read.
    fn generate(&self, source: &SourceFile) -> Result<Manifest, SourceReadError>;
}

/// A binary container format, identified by its signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerFormat {
    /// HDF5, which includes NetCDF4.
    Hdf5,
    /// NetCDF3 classic.
    NetCdf3Classic,
    /// NetCDF3 with 64-bit offsets.
    NetCdf3Offset64,
}

const HDF5_SIGNATURE: &[u8; 8] = b"\x89HDF\r\n\x1a\n";
const NETCDF3_CLASSIC_SIGNATURE: &[u8; 4] = b"CDF\x01";
const NETCDF3_OFFSET64_SIGNATURE: &[u8; 4] = b"CDF\x02";

impl ContainerFormat {
    /// Identify the container format from the leading bytes of a file.
    #[must_use]
    pub fn from_signature(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(HDF5_SIGNATURE) {
            Some(Self::Hdf5)
        } else if bytes.starts_with(NETCDF3_CLASSIC_SIGNATURE) {
            Some(Self::NetCdf3Classic)
        } else if bytes.starts_with(NETCDF3_OFFSET64_SIGNATURE) {
            Some(Self::NetCdf3Offset64)
        } else {
            None
        }
    }

    /// Identify the container format of the file at `path`.
    ///
    /// Returns [`None`] if the signature is not recognised.
    ///
    /// # Errors
    /// Returns a [`SourceReadError::Io`] if the file cannot be read.
    pub fn detect(path: &Path) -> Result<Option<Self>, SourceReadError> {
        let io_err = |source| SourceReadError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut signature = Vec::with_capacity(HDF5_SIGNATURE.len());
        std::fs::File::open(path)
            .map_err(io_err)?
            .take(HDF5_SIGNATURE.len() as u64)
            .read_to_end(&mut signature)
            .map_err(io_err)?;
        Ok(Self::from_signature(&signature))
    }
}

/// A generator that loads a pre-computed reference document for each source file.
///
/// The reference document of `dir/name.nc` is `dir/name.nc.json`, or `reference_dir/name.nc.json` if a reference directory is set.
#[derive(Clone, Debug)]
pub struct ReferenceFileGenerator {
    reference_dir: Option<PathBuf>,
    check_container: bool,
}

impl Default for ReferenceFileGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceFileGenerator {
    /// Create a generator reading reference documents stored next to their source files.
    ///
    /// Source files are checked to be a recognised [`ContainerFormat`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            reference_dir: None,
            check_container: true,
        }
    }

    /// Read reference documents from `reference_dir` instead.
    #[must_use]
    pub fn with_reference_dir(mut self, reference_dir: impl Into<PathBuf>) -> Self {
        self.reference_dir = Some(reference_dir.into());
        self
    }

    /// Enable or disable the container format check.
    #[must_use]
    pub const fn with_container_check(mut self, check_container: bool) -> Self {
        self.check_container = check_container;
        self
    }

    /// The reference document path of `source_path`.
    #[must_use]
    pub fn reference_path(&self, source_path: &Path) -> PathBuf {
        let mut file_name = source_path.file_name().unwrap_or_default().to_os_string();
        file_name.push(".json");
        match &self.reference_dir {
            Some(reference_dir) => reference_dir.join(file_name),
            None => source_path.with_file_name(file_name),
        }
    }
}

impl ManifestGeneratorTraits for ReferenceFileGenerator {
    fn generate(&self, source: &SourceFile) -> Result<Manifest, SourceReadError> {
        let source_path = source.path();
        if self.check_container {
            match ContainerFormat::detect(source_path)? {
                Some(format) => tracing::debug!("{} is {format:?}", source_path.display()),
                None => {
                    return Err(SourceReadError::UnrecognizedContainer {
                        path: source_path.to_path_buf(),
                    })
                }
            }
        }

        let reference_path = self.reference_path(source_path);
        let bytes = match std::fs::read(&reference_path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(SourceReadError::MissingReference {
                    source_path: source_path.to_path_buf(),
                    reference_path,
                })
            }
            Err(source) => {
                return Err(SourceReadError::Io {
                    path: reference_path,
                    source,
                })
            }
        };
        Manifest::from_reference_json(&bytes).map_err(|source| SourceReadError::InvalidReference {
            path: reference_path,
            source,
        })
    }
}

/// Generate the manifest of `source`, retrying up to `retries` times on failure.
///
/// # Errors
/// Returns [`SourceReadError::RetriesExhausted`] with the last error if every attempt fails.
pub fn generate_with_retries(
    generator: &dyn ManifestGeneratorTraits,
    source: &SourceFile,
    retries: usize,
) -> Result<Manifest, SourceReadError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match generator.generate(source) {
            Ok(manifest) => return Ok(manifest),
            Err(err) if attempt > retries => {
                return Err(SourceReadError::RetriesExhausted {
                    path: source.path().to_path_buf(),
                    attempts: attempt,
                    source: Box::new(err),
                })
            }
            Err(err) => {
                tracing::warn!(
                    "Attempt {attempt} of {} failed for {}: {err}",
                    retries + 1,
                    source.path().display()
                );
            }
        }
    }
}

/// Generate the manifests of `sources` concurrently, in the order of `sources`.
///
/// At most `concurrent_limit` files are processed at once (unlimited if zero) and each file is retried up to `retries` times.
///
/// # Errors
/// Returns a [`SourceReadError`] if any file exhausts its retries.
pub fn generate_all(
    generator: &dyn ManifestGeneratorTraits,
    sources: &[SourceFile],
    retries: usize,
    concurrent_limit: usize,
) -> Result<Vec<Manifest>, SourceReadError> {
    if sources.is_empty() {
        return Ok(vec![]);
    }
    let concurrent_limit = if concurrent_limit == 0 {
        sources.len()
    } else {
        concurrent_limit
    }
    .max(1);
    tracing::debug!(
        "Generating {} manifests, concurrent limit {concurrent_limit}",
        sources.len()
    );
    iter_concurrent_limit!(concurrent_limit, sources, map, |source: &SourceFile| {
        generate_with_retries(generator, source, retries)
    })
    .collect()
}
