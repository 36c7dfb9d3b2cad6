//! Chunk manifests.
//!
//! A [`Manifest`] indexes a virtual zarr (V2) store: global attributes, the [`ArrayDescriptor`] of every array, and a [`ChunkRef`] for every chunk.
//! A chunk ref is either inline bytes or a byte range in a source file, so a manifest describes a dataset without copying its data.
//!
//! Manifests are persisted in the JSON reference format (version 1):
//! ```json
//! {"version": 1, "refs": {
//!   ".zgroup": "{\"zarr_format\":2}",
//!   ".zattrs": "{\"title\":\"rico\"}",
//!   "u/.zarray": "{\"zarr_format\":2,\"shape\":[4,32,32],\"chunks\":[1,32,32],...}",
//!   "u/.zattrs": "{\"_ARRAY_DIMENSIONS\":[\"time\",\"yt\",\"xm\"]}",
//!   "u/0.0.0": ["/data/rico.00000000.nc", 4096, 4096],
//!   "xm/0": "base64:AACAPwAAAEA="
//! }}
//! ```
//! Version 0 documents (a bare `refs` object) are accepted when reading.

mod array_descriptor;
mod array_metadata;
mod chunk_key;
mod chunk_ref;

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

pub use array_descriptor::{ArrayDescriptor, ARRAY_DIMENSIONS_ATTRIBUTE};
pub use array_metadata::ArrayMetadataV2;
pub use chunk_key::ChunkKey;
pub use chunk_ref::ChunkRef;

/// User attributes: a JSON object.
pub type Attributes = serde_json::Map<String, Value>;

/// A manifest error.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The document is not valid JSON.
    #[error(transparent)]
    InvalidJson(#[from] serde_json::Error),
    /// The document is not a reference document.
    #[error("invalid reference document: {0}")]
    InvalidDocument(String),
    /// The reference document version is not supported.
    #[error("reference document version {0} is not supported")]
    UnsupportedVersion(u64),
    /// Invalid metadata for a key.
    #[error("invalid metadata for {0}: {1}")]
    InvalidMetadata(String, String),
    /// An array has no dimension names.
    #[error("array {0} has no {ARRAY_DIMENSIONS_ATTRIBUTE} attribute")]
    MissingDimensionNames(String),
    /// A chunk refers to an array that is not in the manifest.
    #[error("chunk {0} does not belong to any array")]
    UnknownArray(String),
    /// A key is neither metadata nor a valid chunk key of its array.
    #[error("invalid chunk key {0}")]
    InvalidChunkKey(String),
    /// A chunk is outside the chunk grid of its array.
    #[error("chunk {0} is outside the chunk grid {1:?} of its array")]
    ChunkOutOfBounds(ChunkKey, Vec<u64>),
    /// An invalid chunk reference.
    #[error("invalid chunk reference for {0}: {1}")]
    InvalidChunkRef(String, String),
}

/// A chunk manifest.
///
/// Every chunk key names an array of the manifest and lies within that array's chunk grid.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Manifest {
    attributes: Attributes,
    arrays: BTreeMap<String, ArrayDescriptor>,
    chunks: BTreeMap<ChunkKey, ChunkRef>,
}

impl Manifest {
    /// Create a new manifest.
    ///
    /// # Errors
    /// Returns a [`ManifestError`] if a chunk key refers to an unknown array or lies outside its array's chunk grid.
    pub fn new(
        attributes: Attributes,
        arrays: BTreeMap<String, ArrayDescriptor>,
        chunks: BTreeMap<ChunkKey, ChunkRef>,
    ) -> Result<Self, ManifestError> {
        for key in chunks.keys() {
            let array = arrays
                .get(key.array())
                .ok_or_else(|| ManifestError::UnknownArray(key.to_string()))?;
            let grid_shape = array.metadata().chunk_grid_shape();
            let in_bounds = key.indices().len() == grid_shape.len()
                && std::iter::zip(key.indices(), &grid_shape).all(|(index, len)| index < len);
            if !in_bounds {
                return Err(ManifestError::ChunkOutOfBounds(key.clone(), grid_shape));
            }
        }
        Ok(Self {
            attributes,
            arrays,
            chunks,
        })
    }

    /// The global attributes.
    #[must_use]
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// The arrays, by name.
    #[must_use]
    pub fn arrays(&self) -> &BTreeMap<String, ArrayDescriptor> {
        &self.arrays
    }

    /// The descriptor of array `name`.
    #[must_use]
    pub fn array(&self, name: &str) -> Option<&ArrayDescriptor> {
        self.arrays.get(name)
    }

    /// All chunk refs, by key.
    #[must_use]
    pub fn chunks(&self) -> &BTreeMap<ChunkKey, ChunkRef> {
        &self.chunks
    }

    /// The chunk ref of `key`.
    #[must_use]
    pub fn chunk(&self, key: &ChunkKey) -> Option<&ChunkRef> {
        self.chunks.get(key)
    }

    /// The chunks of array `name`.
    pub fn array_chunks<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = (&'a ChunkKey, &'a ChunkRef)> + 'a {
        self.chunks
            .range(ChunkKey::new(name, vec![])..)
            .take_while(move |(key, _)| key.array() == name)
    }

    /// Consume the manifest, returning its attributes, arrays and chunks.
    #[must_use]
    pub fn into_parts(
        self,
    ) -> (
        Attributes,
        BTreeMap<String, ArrayDescriptor>,
        BTreeMap<ChunkKey, ChunkRef>,
    ) {
        (self.attributes, self.arrays, self.chunks)
    }

    /// Returns a manifest with only the arrays for which `predicate` returns true, and their chunks.
    ///
    /// The global attributes are retained.
    #[must_use]
    pub fn retain_arrays(&self, mut predicate: impl FnMut(&str, &ArrayDescriptor) -> bool) -> Self {
        let arrays: BTreeMap<String, ArrayDescriptor> = self
            .arrays
            .iter()
            .filter(|(name, array)| predicate(name, array))
            .map(|(name, array)| (name.clone(), array.clone()))
            .collect();
        let chunks = self
            .chunks
            .iter()
            .filter(|(key, _)| arrays.contains_key(key.array()))
            .map(|(key, chunk)| (key.clone(), chunk.clone()))
            .collect();
        Self {
            attributes: self.attributes.clone(),
            arrays,
            chunks,
        }
    }

    /// Parse a manifest from a JSON reference document.
    ///
    /// # Errors
    /// Returns a [`ManifestError`] if the document is not valid JSON, is not a version 0 or 1 reference document, or describes an invalid manifest.
    pub fn from_reference_json(bytes: &[u8]) -> Result<Self, ManifestError> {
        let document: Value = serde_json::from_slice(bytes)?;
        let Value::Object(mut document) = document else {
            return Err(ManifestError::InvalidDocument(
                "expected a JSON object".to_string(),
            ));
        };
        let refs = match document.remove("version") {
            Some(version) => {
                let version = version.as_u64().ok_or_else(|| {
                    ManifestError::InvalidDocument(format!("invalid version {version}"))
                })?;
                if version != 1 {
                    return Err(ManifestError::UnsupportedVersion(version));
                }
                for unsupported in ["templates", "gen"] {
                    let used = match document.get(unsupported) {
                        None | Some(Value::Null) => false,
                        Some(Value::Array(values)) => !values.is_empty(),
                        Some(Value::Object(values)) => !values.is_empty(),
                        Some(_) => true,
                    };
                    if used {
                        return Err(ManifestError::InvalidDocument(format!(
                            "{unsupported} are not supported"
                        )));
                    }
                }
                match document.remove("refs") {
                    Some(Value::Object(refs)) => refs,
                    _ => {
                        return Err(ManifestError::InvalidDocument(
                            "missing refs".to_string(),
                        ))
                    }
                }
            }
            None => document,
        };

        let mut attributes = Attributes::new();
        let mut array_metadata: BTreeMap<String, ArrayMetadataV2> = BTreeMap::new();
        let mut array_attributes: BTreeMap<String, Attributes> = BTreeMap::new();
        let mut chunk_refs = Vec::new();
        for (key, value) in refs {
            if key == ".zgroup" || key.ends_with("/.zgroup") {
                continue;
            } else if key == ".zattrs" {
                attributes = parse_metadata(&key, &value)?;
            } else if let Some(name) = key.strip_suffix("/.zarray") {
                let metadata: ArrayMetadataV2 = parse_metadata(&key, &value)?;
                metadata
                    .validate()
                    .map_err(|err| ManifestError::InvalidMetadata(key.clone(), err))?;
                array_metadata.insert(name.to_string(), metadata);
            } else if let Some(name) = key.strip_suffix("/.zattrs") {
                array_attributes.insert(name.to_string(), parse_metadata(&key, &value)?);
            } else {
                chunk_refs.push((key, value));
            }
        }

        let mut arrays = BTreeMap::new();
        for (name, metadata) in array_metadata {
            let mut attributes = array_attributes.remove(&name).unwrap_or_default();
            let dims = match attributes.remove(ARRAY_DIMENSIONS_ATTRIBUTE) {
                Some(dims) => serde_json::from_value::<Vec<String>>(dims).map_err(|err| {
                    ManifestError::InvalidMetadata(format!("{name}/.zattrs"), err.to_string())
                })?,
                None => return Err(ManifestError::MissingDimensionNames(name)),
            };
            let array = ArrayDescriptor::new(dims, metadata, attributes)
                .map_err(|err| ManifestError::InvalidMetadata(format!("{name}/.zarray"), err))?;
            arrays.insert(name, array);
        }

        let mut chunks = BTreeMap::new();
        for (key, value) in chunk_refs {
            let (name, array) = arrays
                .iter()
                .filter(|(name, _)| {
                    key.strip_prefix(name.as_str())
                        .is_some_and(|chunk| chunk.starts_with('/'))
                })
                .max_by_key(|(name, _)| name.len())
                .ok_or_else(|| ManifestError::UnknownArray(key.clone()))?;
            let chunk_key = ChunkKey::decode(
                name,
                &key[name.len() + 1..],
                &array.metadata().dimension_separator,
                array.shape().len(),
            )
            .ok_or_else(|| ManifestError::InvalidChunkKey(key.clone()))?;
            let chunk_ref = ChunkRef::from_value(&value)
                .map_err(|err| ManifestError::InvalidChunkRef(key.clone(), err))?;
            chunks.insert(chunk_key, chunk_ref);
        }

        Self::new(attributes, arrays, chunks)
    }

    /// Serialise the manifest as a version 1 JSON reference document.
    ///
    /// # Errors
    /// Returns a [`ManifestError`] if serialisation fails.
    pub fn to_reference_json(&self) -> Result<Vec<u8>, ManifestError> {
        let mut refs = serde_json::Map::new();
        refs.insert(
            ".zgroup".to_string(),
            Value::from(r#"{"zarr_format":2}"#),
        );
        refs.insert(
            ".zattrs".to_string(),
            Value::from(serde_json::to_string(&self.attributes)?),
        );
        for (name, array) in &self.arrays {
            refs.insert(
                format!("{name}/.zarray"),
                Value::from(serde_json::to_string(array.metadata())?),
            );
            refs.insert(
                format!("{name}/.zattrs"),
                Value::from(serde_json::to_string(&array.zattrs())?),
            );
        }
        for (key, chunk) in &self.chunks {
            // every chunk key names an array of the manifest
            let separator = self
                .arrays
                .get(key.array())
                .map_or(".", |array| array.metadata().dimension_separator.as_str());
            refs.insert(key.encode(separator), chunk.to_value());
        }

        let mut document = serde_json::Map::new();
        document.insert("version".to_string(), Value::from(1));
        document.insert("refs".to_string(), Value::Object(refs));
        Ok(serde_json::to_vec(&Value::Object(document))?)
    }
}

/// Parse a metadata value, which is either a JSON document embedded in a string or a JSON value.
fn parse_metadata<T: serde::de::DeserializeOwned>(
    key: &str,
    value: &Value,
) -> Result<T, ManifestError> {
    let parsed = match value {
        Value::String(string) => serde_json::from_str(string),
        value => serde_json::from_value(value.clone()),
    };
    parsed.map_err(|err| ManifestError::InvalidMetadata(key.to_string(), err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reference_document() -> Value {
        json!({
            "version": 1,
            "refs": {
                ".zgroup": "{\"zarr_format\":2}",
                ".zattrs": "{\"title\":\"rico\"}",
                "u/.zarray": "{\"zarr_format\":2,\"shape\":[2,32,32],\"chunks\":[1,32,32],\"dtype\":\"<f4\",\"compressor\":null,\"fill_value\":null,\"order\":\"C\",\"filters\":null}",
                "u/.zattrs": "{\"_ARRAY_DIMENSIONS\":[\"time\",\"yt\",\"xm\"],\"units\":\"m/s\"}",
                "u/0.0.0": ["/data/rico.00000000.nc", 4096, 4096],
                "u/1.0.0": ["/data/rico.00000000.nc", 8192, 4096],
                "time/.zarray": "{\"zarr_format\":2,\"shape\":[2],\"chunks\":[2],\"dtype\":\"<f8\",\"compressor\":null,\"fill_value\":null,\"order\":\"C\",\"filters\":null}",
                "time/.zattrs": "{\"_ARRAY_DIMENSIONS\":[\"time\"]}",
                "time/0": "base64:AAAAAAAAAAAAAAAAAABOQA=="
            }
        })
    }

    #[test]
    fn manifest_from_reference_json() {
        let bytes = serde_json::to_vec(&reference_document()).unwrap();
        let manifest = Manifest::from_reference_json(&bytes).unwrap();
        assert_eq!(manifest.attributes()["title"], "rico");
        assert_eq!(manifest.arrays().len(), 2);
        let u = manifest.array("u").unwrap();
        assert_eq!(u.dims(), &["time", "yt", "xm"]);
        assert_eq!(u.attributes()["units"], "m/s");
        assert!(u.attributes().get(ARRAY_DIMENSIONS_ATTRIBUTE).is_none());
        assert_eq!(manifest.array_chunks("u").count(), 2);
        assert_eq!(
            manifest.chunk(&ChunkKey::new("u", vec![1, 0, 0])),
            Some(&ChunkRef::locator("/data/rico.00000000.nc", 8192, 4096))
        );
        assert!(matches!(
            manifest.chunk(&ChunkKey::new("time", vec![0])),
            Some(ChunkRef::Inline(bytes)) if bytes.len() == 16
        ));
    }

    #[test]
    fn manifest_reference_json_round_trip() {
        let bytes = serde_json::to_vec(&reference_document()).unwrap();
        let manifest = Manifest::from_reference_json(&bytes).unwrap();
        let encoded = manifest.to_reference_json().unwrap();
        assert_eq!(Manifest::from_reference_json(&encoded).unwrap(), manifest);
    }

    #[test]
    fn manifest_version_0() {
        let mut document = reference_document();
        let refs = document["refs"].take();
        let manifest = Manifest::from_reference_json(&serde_json::to_vec(&refs).unwrap()).unwrap();
        assert_eq!(manifest.arrays().len(), 2);
    }

    #[test]
    fn manifest_unsupported_version() {
        let mut document = reference_document();
        document["version"] = json!(2);
        assert!(matches!(
            Manifest::from_reference_json(&serde_json::to_vec(&document).unwrap()),
            Err(ManifestError::UnsupportedVersion(2))
        ));
    }

    #[test]
    fn manifest_missing_dimension_names() {
        let mut document = reference_document();
        document["refs"]["u/.zattrs"] = json!("{}");
        assert!(matches!(
            Manifest::from_reference_json(&serde_json::to_vec(&document).unwrap()),
            Err(ManifestError::MissingDimensionNames(name)) if name == "u"
        ));
    }

    #[test]
    fn manifest_unknown_array() {
        let mut document = reference_document();
        document["refs"]["v/0.0.0"] = json!(["/data/rico.00000000.nc", 0, 10]);
        assert!(matches!(
            Manifest::from_reference_json(&serde_json::to_vec(&document).unwrap()),
            Err(ManifestError::UnknownArray(key)) if key == "v/0.0.0"
        ));
    }

    #[test]
    fn manifest_chunk_out_of_bounds() {
        let mut document = reference_document();
        document["refs"]["u/2.0.0"] = json!(["/data/rico.00000000.nc", 0, 10]);
        assert!(matches!(
            Manifest::from_reference_json(&serde_json::to_vec(&document).unwrap()),
            Err(ManifestError::ChunkOutOfBounds(..))
        ));
    }

    #[test]
    fn manifest_invalid_chunk_key() {
        let mut document = reference_document();
        document["refs"]["u/0.0"] = json!(["/data/rico.00000000.nc", 0, 10]);
        assert!(matches!(
            Manifest::from_reference_json(&serde_json::to_vec(&document).unwrap()),
            Err(ManifestError::InvalidChunkKey(_))
        ));
    }

    #[test]
    fn manifest_retain_arrays() {
        let bytes = serde_json::to_vec(&reference_document()).unwrap();
        let manifest = Manifest::from_reference_json(&bytes).unwrap();
        let retained = manifest.retain_arrays(|name, _| name == "time");
        assert_eq!(retained.arrays().len(), 1);
        assert_eq!(retained.chunks().len(), 1);
        assert_eq!(retained.attributes(), manifest.attributes());
    }
}
