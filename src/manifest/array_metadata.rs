use derive_more::Display;
use serde::{Deserialize, Serialize};

use super::Attributes;

/// Zarr V2 array metadata, as embedded in a `.zarray` reference.
///
/// Only the shape, chunk shape and chunk key separator are interpreted.
/// The data type, compressor, filters, fill value and order are carried through verbatim, since chunks are never decoded while stitching.
///
/// An example `JSON` document:
/// ```json
/// {
///     "chunks": [1, 10, 32, 32],
///     "compressor": null,
///     "dtype": "<f4",
///     "fill_value": 0.0,
///     "filters": null,
///     "order": "C",
///     "shape": [4, 10, 32, 32],
///     "zarr_format": 2
/// }
/// ```
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug, Display)]
#[display("{}", serde_json::to_string(self).unwrap_or_default())]
pub struct ArrayMetadataV2 {
    /// The version of the storage specification. Must be `2`.
    pub zarr_format: u64,
    /// The length of each dimension of the array.
    pub shape: Vec<u64>,
    /// The length of each dimension of a chunk of the array.
    pub chunks: Vec<u64>,
    /// The data type of the array.
    pub dtype: serde_json::Value,
    /// The primary compression codec, or null.
    #[serde(default)]
    pub compressor: serde_json::Value,
    /// The default value for uninitialized portions of the array.
    #[serde(default)]
    pub fill_value: serde_json::Value,
    /// Either “C” or “F”, defining the layout of bytes within each chunk of the array.
    #[serde(default = "order_default")]
    pub order: String,
    /// Codec configurations applied before the compressor, or null.
    #[serde(default)]
    pub filters: serde_json::Value,
    /// The separator placed between the dimensions of a chunk key.
    #[serde(
        default = "dimension_separator_default",
        skip_serializing_if = "is_default_dimension_separator"
    )]
    pub dimension_separator: String,
    /// Additional fields.
    #[serde(flatten)]
    pub additional_fields: Attributes,
}

fn order_default() -> String {
    "C".to_string()
}

fn dimension_separator_default() -> String {
    ".".to_string()
}

fn is_default_dimension_separator(separator: &str) -> bool {
    separator == "."
}

impl ArrayMetadataV2 {
    /// Create array metadata with uncompressed `<f4` data, used when building manifests by hand.
    #[must_use]
    pub fn new(shape: Vec<u64>, chunks: Vec<u64>) -> Self {
        Self {
            zarr_format: 2,
            shape,
            chunks,
            dtype: serde_json::Value::String("<f4".to_string()),
            compressor: serde_json::Value::Null,
            fill_value: serde_json::Value::Null,
            order: order_default(),
            filters: serde_json::Value::Null,
            dimension_separator: dimension_separator_default(),
            additional_fields: Attributes::new(),
        }
    }

    /// Validate the metadata, returning a description of the first problem found.
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.zarr_format != 2 {
            return Err(format!("zarr_format must be 2, got {}", self.zarr_format));
        }
        if self.shape.len() != self.chunks.len() {
            return Err(format!(
                "shape {:?} and chunks {:?} have different dimensionality",
                self.shape, self.chunks
            ));
        }
        if self.chunks.iter().any(|&chunk| chunk == 0) {
            return Err(format!("chunks {:?} contains a zero length", self.chunks));
        }
        if self.dimension_separator != "." && self.dimension_separator != "/" {
            return Err(format!(
                "dimension_separator must be . or /, got {}",
                self.dimension_separator
            ));
        }
        Ok(())
    }

    /// The number of chunks along each dimension.
    #[must_use]
    pub fn chunk_grid_shape(&self) -> Vec<u64> {
        std::iter::zip(&self.shape, &self.chunks)
            .map(|(&shape, &chunk)| shape.div_ceil(chunk))
            .collect()
    }
}
