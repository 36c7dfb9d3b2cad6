use itertools::Itertools;

/// A chunk key: the name of an array and the grid indices of one of its chunks.
///
/// Chunk keys order by array name first, so all chunks of one array are contiguous in a sorted map.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct ChunkKey {
    array: String,
    indices: Vec<u64>,
}

impl ChunkKey {
    /// Create a new chunk key.
    #[must_use]
    pub fn new(array: impl Into<String>, indices: Vec<u64>) -> Self {
        Self {
            array: array.into(),
            indices,
        }
    }

    /// The array name.
    #[must_use]
    pub fn array(&self) -> &str {
        &self.array
    }

    /// The chunk grid indices.
    #[must_use]
    pub fn indices(&self) -> &[u64] {
        &self.indices
    }

    /// Encode the key as a store key, e.g. `u/0.1.2` with separator `.`.
    ///
    /// Zero-dimensional arrays have the single chunk `0`.
    #[must_use]
    pub fn encode(&self, separator: &str) -> String {
        if self.indices.is_empty() {
            format!("{}/0", self.array)
        } else {
            format!("{}/{}", self.array, self.indices.iter().join(separator))
        }
    }

    /// Decode the chunk part of a store key (after `array/`) for an array of dimensionality `rank`.
    ///
    /// Returns [`None`] if `chunk` is not a valid chunk key.
    #[must_use]
    pub fn decode(array: &str, chunk: &str, separator: &str, rank: usize) -> Option<Self> {
        if rank == 0 {
            return (chunk == "0").then(|| Self::new(array, vec![]));
        }
        let indices: Vec<u64> = chunk
            .split(separator)
            .map(str::parse)
            .collect::<Result<_, _>>()
            .ok()?;
        (indices.len() == rank).then(|| Self::new(array, indices))
    }
}

impl std::fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.encode("."))
    }
}
