//! The end-to-end pipeline: a directory of tile files to one merged manifest.
//!
//! For a source directory `data/rico` the pipeline writes:
//!  - `data/rico__zarr/src_refs__{data_kind}/`: the assembled subset manifests (the artifact store), and
//!  - `data/rico__zarr/{experiment}.json`: the merged manifest.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use thiserror::Error;

use crate::{
    artifact::StorageArtifactStore,
    assemble::{AssembleError, SubsetAssembler},
    concatenate::{GridConcatenator, ManifestConcatenatorTraits},
    dataset::{merge, DatasetError, LogicalDataset},
    generator::{ManifestGeneratorTraits, ReferenceFileGenerator},
    manifest::ManifestError,
    source::{enumerate_sources, DataKind, SourceEnumerationError},
    storage::{
        store::{FilesystemStore, FilesystemStoreCreateError},
        StorageError, StoreKey, WritableStorageTraits,
    },
};

/// A pipeline error.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The source files could not be enumerated.
    #[error(transparent)]
    SourceEnumeration(#[from] SourceEnumerationError),
    /// A subset could not be assembled.
    #[error(transparent)]
    Assemble(#[from] AssembleError),
    /// The subset datasets could not be merged.
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    /// The merged manifest could not be serialised.
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    /// A store could not be created.
    #[error(transparent)]
    StoreCreate(#[from] FilesystemStoreCreateError),
    /// A storage error.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
}

/// The result of a pipeline run.
#[derive(Debug)]
pub struct PipelineOutput {
    /// The path of the merged manifest.
    pub manifest_path: PathBuf,
    /// The merged dataset.
    pub dataset: LogicalDataset,
}

/// The end-to-end pipeline.
pub struct Pipeline {
    generator: Arc<dyn ManifestGeneratorTraits>,
    concatenator: Arc<dyn ManifestConcatenatorTraits>,
    retries: Option<usize>,
    concurrent_limit: Option<usize>,
    refresh: bool,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    /// Create a pipeline using a [`ReferenceFileGenerator`] and a [`GridConcatenator`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            generator: Arc::new(ReferenceFileGenerator::new()),
            concatenator: Arc::new(GridConcatenator::new()),
            retries: None,
            concurrent_limit: None,
            refresh: false,
        }
    }

    /// Use `generator` for per-file manifests.
    #[must_use]
    pub fn with_generator(mut self, generator: Arc<dyn ManifestGeneratorTraits>) -> Self {
        self.generator = generator;
        self
    }

    /// Use `concatenator` to stitch tiles.
    #[must_use]
    pub fn with_concatenator(mut self, concatenator: Arc<dyn ManifestConcatenatorTraits>) -> Self {
        self.concatenator = concatenator;
        self
    }

    /// Override the [generation retries](crate::config::Config#generation-retries).
    #[must_use]
    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Override the [generation concurrent limit](crate::config::Config#generation-concurrent-limit).
    #[must_use]
    pub fn with_concurrent_limit(mut self, concurrent_limit: usize) -> Self {
        self.concurrent_limit = Some(concurrent_limit);
        self
    }

    /// If `refresh` is true, cached subset manifests are ignored and overwritten.
    #[must_use]
    pub fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    /// The destination directory of `source_dir`: a sibling named `{source_dir}__zarr`.
    ///
    /// # Errors
    /// Returns an [`std::io::Error`] if `source_dir` has no final component and cannot be canonicalised.
    pub fn destination(source_dir: &Path) -> Result<PathBuf, std::io::Error> {
        let source_dir = match source_dir.file_name() {
            Some(_) => source_dir.to_path_buf(),
            None => source_dir.canonicalize()?,
        };
        let mut name = source_dir.file_name().unwrap_or_default().to_os_string();
        name.push("__zarr");
        Ok(source_dir.with_file_name(name))
    }

    /// Run the pipeline for `experiment` in `source_dir`.
    ///
    /// Subset manifests are assembled (or loaded from the artifact store), merged, and the merged manifest is written to `{destination}/{experiment}.json`.
    ///
    /// # Errors
    /// Returns a [`PipelineError`] if any stage fails.
    pub fn run(
        &self,
        source_dir: &Path,
        experiment: &str,
        data_kind: DataKind,
    ) -> Result<PipelineOutput, PipelineError> {
        let sources = enumerate_sources(source_dir, experiment, data_kind)?;

        let destination = Self::destination(source_dir)?;
        let artifact_storage = Arc::new(FilesystemStore::new(
            destination.join(format!("src_refs__{data_kind}")),
        )?);
        tracing::info!(
            "Caching subset manifests in {}",
            artifact_storage.base_path().display()
        );

        let mut assembler = SubsetAssembler::new(
            experiment,
            data_kind,
            self.generator.clone(),
            self.concatenator.clone(),
            Arc::new(StorageArtifactStore::new(artifact_storage)),
        )
        .with_refresh(self.refresh);
        if let Some(retries) = self.retries {
            assembler = assembler.with_retries(retries);
        }
        if let Some(concurrent_limit) = self.concurrent_limit {
            assembler = assembler.with_concurrent_limit(concurrent_limit);
        }
        let handles = assembler.assemble_all(data_kind.subsets(), &sources)?;

        let datasets = handles
            .iter()
            .map(|handle| LogicalDataset::from_manifest(handle.manifest().as_ref().clone()))
            .collect::<Result<Vec<_>, _>>()?;
        let dataset = merge(datasets)?;

        let store = FilesystemStore::new(&destination)?;
        let key = StoreKey::new(format!("{experiment}.json")).map_err(StorageError::from)?;
        store.set(&key, &dataset.manifest().to_reference_json()?)?;
        let manifest_path = store.key_to_fspath(&key);
        tracing::info!("Wrote {}", manifest_path.display());
        tracing::info!("{dataset}");

        Ok(PipelineOutput {
            manifest_path,
            dataset,
        })
    }
}
