//! Subset assembly: source files to one stitched manifest per subset, with caching.

use std::sync::Arc;

use rayon::iter::{IndexedParallelIterator, IntoParallelRefIterator, ParallelIterator};
use thiserror::Error;

use crate::{
    artifact::{ArtifactError, ArtifactId, ArtifactStoreTraits},
    concatenate::{ConcatenateError, ManifestConcatenatorTraits},
    config::global_config,
    generator::{generate_all, ManifestGeneratorTraits, SourceReadError},
    manifest::Manifest,
    source::{validate_tile_grid, ConcatenationOrderError, DataKind, SourceFile, TileIndex},
    subset::{check_assignment, filter_with, DimensionConflictError, Subset},
};

/// An assembly error.
#[derive(Debug, Error)]
pub enum AssembleError {
    /// A source file could not be read.
    #[error(transparent)]
    SourceRead(#[from] SourceReadError),
    /// Arrays disagree on their dimensions.
    #[error(transparent)]
    DimensionConflict(#[from] DimensionConflictError),
    /// The source files do not form a complete tile grid.
    #[error(transparent)]
    ConcatenationOrder(#[from] ConcatenationOrderError),
    /// The tile manifests could not be concatenated.
    #[error(transparent)]
    Concatenate(#[from] ConcatenateError),
    /// The artifact store failed.
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

/// An assembled subset manifest and its identity.
#[derive(Clone, Debug, PartialEq)]
pub struct ManifestHandle {
    id: ArtifactId,
    manifest: Arc<Manifest>,
}

impl ManifestHandle {
    /// Create a new manifest handle.
    #[must_use]
    pub fn new(id: ArtifactId, manifest: Arc<Manifest>) -> Self {
        Self { id, manifest }
    }

    /// The identity of the manifest.
    #[must_use]
    pub fn id(&self) -> &ArtifactId {
        &self.id
    }

    /// The manifest.
    #[must_use]
    pub fn manifest(&self) -> &Arc<Manifest> {
        &self.manifest
    }
}

/// Assembles the subset manifests of one experiment and data kind.
///
/// Retries, the concurrent limit, and the non-split dimensions default to the [global configuration](crate::config::Config).
pub struct SubsetAssembler {
    experiment: String,
    data_kind: DataKind,
    generator: Arc<dyn ManifestGeneratorTraits>,
    concatenator: Arc<dyn ManifestConcatenatorTraits>,
    artifact_store: Arc<dyn ArtifactStoreTraits>,
    retries: usize,
    concurrent_limit: usize,
    non_split_dimensions: Vec<String>,
    refresh: bool,
}

impl SubsetAssembler {
    /// Create a new subset assembler.
    #[must_use]
    pub fn new(
        experiment: impl Into<String>,
        data_kind: DataKind,
        generator: Arc<dyn ManifestGeneratorTraits>,
        concatenator: Arc<dyn ManifestConcatenatorTraits>,
        artifact_store: Arc<dyn ArtifactStoreTraits>,
    ) -> Self {
        let config = global_config();
        Self {
            experiment: experiment.into(),
            data_kind,
            generator,
            concatenator,
            artifact_store,
            retries: config.generation_retries(),
            concurrent_limit: config.generation_concurrent_limit(),
            non_split_dimensions: config.non_split_dimensions().to_vec(),
            refresh: false,
        }
    }

    /// Set the number of generation retries per source file.
    #[must_use]
    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }

    /// Set the maximum number of source files generated concurrently.
    #[must_use]
    pub fn with_concurrent_limit(mut self, concurrent_limit: usize) -> Self {
        self.concurrent_limit = concurrent_limit;
        self
    }

    /// Set the dimensions excluded from subset classification.
    #[must_use]
    pub fn with_non_split_dimensions(mut self, non_split_dimensions: Vec<String>) -> Self {
        self.non_split_dimensions = non_split_dimensions;
        self
    }

    /// If `refresh` is true, cached artifacts are ignored and overwritten.
    #[must_use]
    pub fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
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

    /// The artifact identity of `subset`.
    #[must_use]
    pub fn artifact_id(&self, subset: Subset) -> ArtifactId {
        ArtifactId::new(self.experiment.clone(), self.data_kind, subset)
    }

    /// Return the cached manifest of `id`, if there is a valid one.
    fn cached(&self, id: &ArtifactId) -> Result<Option<Manifest>, AssembleError> {
        if self.refresh || !self.artifact_store.exists(id)? {
            return Ok(None);
        }
        match self.artifact_store.get(id) {
            Ok(manifest) => Ok(manifest),
            Err(ArtifactError::CacheCorruption(err)) => {
                tracing::warn!("{err}, removing and regenerating");
                self.artifact_store.remove(id)?;
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Assemble the manifest of `subset` from `sources`.
    ///
    /// If a valid artifact is cached for the subset it is returned without reading any source file.
    /// Otherwise a manifest is generated for every source file, filtered to `subset`, concatenated in tile order, and stored as an artifact.
    ///
    /// # Errors
    /// Returns an [`AssembleError`] if a source file exhausts its retries, the sources do not form a complete tile grid, the tiles cannot be concatenated, or the artifact store fails.
    pub fn assemble(
        &self,
        subset: &Subset,
        sources: &[SourceFile],
    ) -> Result<ManifestHandle, AssembleError> {
        let id = self.artifact_id(*subset);
        if let Some(manifest) = self.cached(&id)? {
            tracing::info!("Using cached manifest {id}");
            return Ok(ManifestHandle::new(id, Arc::new(manifest)));
        }
        let tiles = self.generate_tiles(sources)?;
        self.assemble_tiles(subset, &tiles)
    }

    /// Assemble every subset in `subsets` from `sources`.
    ///
    /// Cached subsets are returned as is. If any subset is not cached, a manifest is generated once per source file and shared by the remaining subsets, which are assembled concurrently.
    /// Handles are returned in the order of `subsets`.
    ///
    /// # Errors
    /// Returns an [`AssembleError`] if any subset fails to assemble, or if an array of a source file belongs to none of `subsets`.
    pub fn assemble_all(
        &self,
        subsets: &[Subset],
        sources: &[SourceFile],
    ) -> Result<Vec<ManifestHandle>, AssembleError> {
        let mut cached = Vec::with_capacity(subsets.len());
        for subset in subsets {
            let id = self.artifact_id(*subset);
            cached.push(
                self.cached(&id)?
                    .map(|manifest| ManifestHandle::new(id, Arc::new(manifest))),
            );
        }
        if cached.iter().all(Option::is_some) {
            tracing::info!("Using cached manifests for all {} subsets", subsets.len());
            return Ok(cached.into_iter().flatten().collect());
        }

        let tiles = self.generate_tiles(sources)?;
        for (_, manifest) in &tiles {
            check_assignment(manifest, subsets, &self.non_split_dimensions)?;
        }
        subsets
            .par_iter()
            .zip(cached)
            .map(|(subset, cached)| match cached {
                Some(handle) => {
                    tracing::info!("Using cached manifest {}", handle.id());
                    Ok(handle)
                }
                None => self.assemble_tiles(subset, &tiles),
            })
            .collect()
    }

    /// Generate the manifest of every source file, in tile order.
    fn generate_tiles(
        &self,
        sources: &[SourceFile],
    ) -> Result<Vec<(TileIndex, Manifest)>, AssembleError> {
        let mut sources = sources.to_vec();
        sources.sort();
        validate_tile_grid(sources.iter().map(SourceFile::tile))?;

        tracing::info!("Generating manifests of {} source files", sources.len());
        let manifests = generate_all(
            self.generator.as_ref(),
            &sources,
            self.retries,
            self.concurrent_limit,
        )?;
        Ok(std::iter::zip(&sources, manifests)
            .map(|(source, manifest)| (source.tile(), manifest))
            .collect())
    }

    /// Filter `tiles` to `subset`, concatenate them, and store the result.
    fn assemble_tiles(
        &self,
        subset: &Subset,
        tiles: &[(TileIndex, Manifest)],
    ) -> Result<ManifestHandle, AssembleError> {
        let id = self.artifact_id(*subset);
        tracing::info!("Assembling {id} from {} tiles", tiles.len());
        let tiles = tiles
            .iter()
            .map(|(tile, manifest)| {
                filter_with(manifest, subset, &self.non_split_dimensions)
                    .map(|manifest| (*tile, manifest))
            })
            .collect::<Result<Vec<(TileIndex, Manifest)>, _>>()?;
        let manifest = self.concatenator.concatenate(&tiles, subset)?;

        self.artifact_store.put(&id, &manifest)?;
        tracing::info!(
            "Assembled {id}: {} arrays, {} chunks",
            manifest.arrays().len(),
            manifest.chunks().len()
        );
        Ok(ManifestHandle::new(id, Arc::new(manifest)))
    }
}
