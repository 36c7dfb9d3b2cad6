use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::Value;

use crate::byte_range::{ByteLength, ByteOffset, ByteRange};

const BASE64_PREFIX: &str = "base64:";

/// Where the bytes of one chunk live.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum ChunkRef {
    /// The encoded chunk bytes, stored in the manifest itself.
    Inline(Vec<u8>),
    /// A byte range in a source file.
    Locator {
        /// The path (or URL) of the source file.
        path: String,
        /// The offset of the chunk in the source file.
        offset: ByteOffset,
        /// The length of the chunk, or [`None`] for the remainder of the file.
        length: Option<ByteLength>,
    },
}

impl ChunkRef {
    /// Create a locator for `length` bytes at `offset` of the file at `path`.
    #[must_use]
    pub fn locator(path: impl Into<String>, offset: ByteOffset, length: ByteLength) -> Self {
        Self::Locator {
            path: path.into(),
            offset,
            length: Some(length),
        }
    }

    /// The byte range of a locator in its source file, or [`None`] for inline chunks.
    #[must_use]
    pub fn byte_range(&self) -> Option<ByteRange> {
        match self {
            Self::Inline(_) => None,
            Self::Locator { offset, length, .. } => Some(ByteRange::new(*offset, *length)),
        }
    }

    /// Encode as a reference value.
    ///
    /// Inline bytes are written as a plain string when they are valid UTF-8, and base64 encoded otherwise.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Inline(bytes) => match std::str::from_utf8(bytes) {
                Ok(string) if !string.starts_with(BASE64_PREFIX) => Value::from(string),
                _ => Value::from(format!("{BASE64_PREFIX}{}", STANDARD.encode(bytes))),
            },
            Self::Locator {
                path,
                offset: 0,
                length: None,
            } => Value::from(vec![Value::from(path.as_str())]),
            Self::Locator {
                path,
                offset,
                length,
            } => Value::from(vec![
                Value::from(path.as_str()),
                Value::from(*offset),
                length.map_or(Value::Null, Value::from),
            ]),
        }
    }

    /// Decode a reference value.
    ///
    /// # Errors
    /// Returns a description of the problem if `value` is not a string, `[path]` or `[path, offset, length]`.
    pub fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::String(string) => {
                if let Some(encoded) = string.strip_prefix(BASE64_PREFIX) {
                    STANDARD
                        .decode(encoded)
                        .map(Self::Inline)
                        .map_err(|err| err.to_string())
                } else {
                    Ok(Self::Inline(string.as_bytes().to_vec()))
                }
            }
            Value::Array(elements) => match elements.as_slice() {
                [Value::String(path)] => Ok(Self::Locator {
                    path: path.clone(),
                    offset: 0,
                    length: None,
                }),
                [Value::String(path), offset, length] => {
                    let offset = offset
                        .as_u64()
                        .ok_or_else(|| format!("invalid offset {offset}"))?;
                    let length = match length {
                        Value::Null => None,
                        length => Some(
                            length
                                .as_u64()
                                .ok_or_else(|| format!("invalid length {length}"))?,
                        ),
                    };
                    Ok(Self::Locator {
                        path: path.clone(),
                        offset,
                        length,
                    })
                }
                _ => Err(format!("invalid locator {value}")),
            },
            _ => Err(format!("invalid chunk reference {value}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn chunk_ref_locator() {
        let chunk_ref = ChunkRef::from_value(&json!(["/data/rico.00000000.nc", 4096, 512])).unwrap();
        assert_eq!(
            chunk_ref,
            ChunkRef::locator("/data/rico.00000000.nc", 4096, 512)
        );
        assert_eq!(chunk_ref.byte_range(), Some(ByteRange::new(4096, Some(512))));
        assert_eq!(chunk_ref.to_value(), json!(["/data/rico.00000000.nc", 4096, 512]));
    }

    #[test]
    fn chunk_ref_whole_file() {
        let chunk_ref = ChunkRef::from_value(&json!(["s3://bucket/tile.nc"])).unwrap();
        assert_eq!(chunk_ref.byte_range(), Some(ByteRange::new(0, None)));
        assert_eq!(chunk_ref.to_value(), json!(["s3://bucket/tile.nc"]));
    }

    #[test]
    fn chunk_ref_inline() {
        let chunk_ref = ChunkRef::from_value(&json!("base64:AAABAg==")).unwrap();
        assert_eq!(chunk_ref, ChunkRef::Inline(vec![0, 0, 1, 2]));
        assert_eq!(chunk_ref.to_value(), json!("base64:AAABAg=="));
        assert_eq!(chunk_ref.byte_range(), None);

        let chunk_ref = ChunkRef::from_value(&json!("{\"a\":1}")).unwrap();
        assert_eq!(chunk_ref, ChunkRef::Inline(b"{\"a\":1}".to_vec()));
        assert_eq!(chunk_ref.to_value(), json!("{\"a\":1}"));
    }

    #[test]
    fn chunk_ref_invalid() {
        assert!(ChunkRef::from_value(&json!(["a", -1, 3])).is_err());
        assert!(ChunkRef::from_value(&json!(["a", 0])).is_err());
        assert!(ChunkRef::from_value(&json!(3)).is_err());
        assert!(ChunkRef::from_value(&json!("base64:@@@")).is_err());
    }
}
