use super::{ArrayMetadataV2, Attributes};

/// The attribute holding the dimension names of an array.
pub const ARRAY_DIMENSIONS_ATTRIBUTE: &str = "_ARRAY_DIMENSIONS";

/// The metadata of one array in a [`Manifest`](super::Manifest).
///
/// Dimension names are kept apart from the user attributes; they are written back as [`ARRAY_DIMENSIONS_ATTRIBUTE`] on serialization.
#[derive(Clone, PartialEq, Debug)]
pub struct ArrayDescriptor {
    dims: Vec<String>,
    metadata: ArrayMetadataV2,
    attributes: Attributes,
}

impl ArrayDescriptor {
    /// Create a new array descriptor.
    ///
    /// # Errors
    /// Returns a description of the problem if the metadata is invalid or the number of dimension names does not match the dimensionality of the array.
    pub fn new(
        dims: Vec<String>,
        metadata: ArrayMetadataV2,
        attributes: Attributes,
    ) -> Result<Self, String> {
        metadata.validate()?;
        if dims.len() != metadata.shape.len() {
            return Err(format!(
                "dimension names {dims:?} do not match shape {:?}",
                metadata.shape
            ));
        }
        Ok(Self {
            dims,
            metadata,
            attributes,
        })
    }

    /// The dimension names of the array.
    #[must_use]
    pub fn dims(&self) -> &[String] {
        &self.dims
    }

    /// The shape of the array.
    #[must_use]
    pub fn shape(&self) -> &[u64] {
        &self.metadata.shape
    }

    /// The chunk shape of the array.
    #[must_use]
    pub fn chunk_shape(&self) -> &[u64] {
        &self.metadata.chunks
    }

    /// The zarr array metadata.
    #[must_use]
    pub fn metadata(&self) -> &ArrayMetadataV2 {
        &self.metadata
    }

    /// The user attributes of the array.
    #[must_use]
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// The position of dimension `dim`, if the array has it.
    #[must_use]
    pub fn dim_position(&self, dim: &str) -> Option<usize> {
        self.dims.iter().position(|d| d == dim)
    }

    /// The length of dimension `dim`, if the array has it.
    #[must_use]
    pub fn dim_len(&self, dim: &str) -> Option<u64> {
        self.dim_position(dim).map(|position| self.shape()[position])
    }

    /// Returns a copy of this descriptor with the length of dimension `position` replaced.
    #[must_use]
    pub(crate) fn with_dim_len(mut self, position: usize, len: u64) -> Self {
        self.metadata.shape[position] = len;
        self
    }

    /// The attributes as stored in a `.zattrs` reference, including the dimension names.
    #[must_use]
    pub fn zattrs(&self) -> Attributes {
        let mut zattrs = Attributes::new();
        zattrs.insert(
            ARRAY_DIMENSIONS_ATTRIBUTE.to_string(),
            serde_json::Value::from(self.dims.clone()),
        );
        zattrs.extend(self.attributes.clone());
        zattrs
    }
}
