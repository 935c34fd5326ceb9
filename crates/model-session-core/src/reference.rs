//! Transport-safe references to saved model artifacts.

use std::{ffi::OsString, fmt, path::PathBuf};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reference decode error.
#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("Reference is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Reference does not decode to UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("Reference decodes to an empty path")]
    Empty,
}

/// Opaque reference to a saved model artifact.
///
/// The artifact path's raw bytes in unpadded URL-safe base64, so it survives
/// a round trip through a single query parameter or form field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelReference(String);

impl ModelReference {
    /// Encode an artifact path.
    #[must_use]
    pub fn encode(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self(URL_SAFE_NO_PAD.encode(path_to_bytes(path.into_os_string())))
    }

    /// Wrap an already encoded reference received from a caller.
    #[must_use]
    pub fn from_encoded(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    /// Decode back into the artifact path.
    ///
    /// # Errors
    /// Returns error if the text is not a reference produced by [`ModelReference::encode`].
    pub fn decode(&self) -> Result<PathBuf, ReferenceError> {
        let bytes = URL_SAFE_NO_PAD.decode(self.0.trim().trim_end_matches('='))?;
        if bytes.is_empty() {
            return Err(ReferenceError::Empty);
        }
        Ok(PathBuf::from(bytes_to_path(bytes)?))
    }

    /// The encoded text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(unix)]
fn path_to_bytes(path: OsString) -> Vec<u8> {
    use std::os::unix::ffi::OsStringExt;
    path.into_vec()
}

#[cfg(unix)]
#[allow(clippy::unnecessary_wraps)]
fn bytes_to_path(bytes: Vec<u8>) -> Result<OsString, ReferenceError> {
    use std::os::unix::ffi::OsStringExt;
    Ok(OsString::from_vec(bytes))
}

// Non-unix paths are not byte strings; only UTF-8 paths round trip there.
#[cfg(not(unix))]
fn path_to_bytes(path: OsString) -> Vec<u8> {
    path.to_string_lossy().into_owned().into_bytes()
}

#[cfg(not(unix))]
fn bytes_to_path(bytes: Vec<u8>) -> Result<OsString, ReferenceError> {
    Ok(OsString::from(String::from_utf8(bytes)?))
}

impl fmt::Display for ModelReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
