use derive_more::{Display, From};
use thiserror::Error;

/// A store key.
///
/// A key is a `/` separated path relative to the root of a store.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display)]
pub struct StoreKey(String);

/// An invalid store key.
#[derive(Debug, From, Error)]
#[error("invalid store key {0}")]
pub struct StoreKeyError(String);

impl StoreKey {
    /// Create a new store key from `key`.
    ///
    /// # Errors
    /// Returns [`StoreKeyError`] if `key` is not valid according to [`StoreKey::validate()`].
    pub fn new(key: impl Into<String>) -> Result<Self, StoreKeyError> {
        let key = key.into();
        if Self::validate(&key) {
            Ok(Self(key))
        } else {
            Err(StoreKeyError(key))
        }
    }

    /// Create a store key from the path of a chunk locator.
    ///
    /// A `file://` scheme and any leading `/` are stripped, so an absolute path maps to a key of a store rooted at `/`.
    ///
    /// # Errors
    /// Returns [`StoreKeyError`] if the remaining path is not a valid key.
    pub fn from_locator_path(path: &str) -> Result<Self, StoreKeyError> {
        let path = path.strip_prefix("file://").unwrap_or(path);
        Self::new(path.trim_start_matches('/'))
    }

    /// Extracts a string slice of the underlying key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validates a key.
    ///
    /// A key must be non-empty, must not start or end with `/`, and must not contain `..` components.
    #[must_use]
    pub fn validate(key: &str) -> bool {
        !key.starts_with('/')
            && !key.ends_with('/')
            && !key.is_empty()
            && !key.split('/').any(|component| component == "..")
    }
}

impl TryFrom<&str> for StoreKey {
    type Error = StoreKeyError;

    fn try_from(key: &str) -> Result<Self, Self::Error> {
        Self::new(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_key() {
        assert!(StoreKey::new("a").is_ok());
        assert_eq!(StoreKey::new("a").unwrap().to_string(), "a");
        assert!(StoreKey::new("a/").is_err());
        assert_eq!(
            StoreKey::new("a/").unwrap_err().to_string(),
            "invalid store key a/"
        );
        assert!(StoreKey::new("/a").is_err());
        assert!(StoreKey::new("a/../b").is_err());
    }

    #[test]
    fn store_key_from_locator_path() {
        assert_eq!(
            StoreKey::from_locator_path("file:///data/rico.00000000.nc")
                .unwrap()
                .as_str(),
            "data/rico.00000000.nc"
        );
        assert_eq!(
            StoreKey::from_locator_path("/data/rico.00000000.nc")
                .unwrap()
                .as_str(),
            "data/rico.00000000.nc"
        );
        assert_eq!(
            StoreKey::from_locator_path("rico.00000000.nc")
                .unwrap()
                .as_str(),
            "rico.00000000.nc"
        );
        assert!(StoreKey::from_locator_path("/").is_err());
    }
}
