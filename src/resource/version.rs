//! Version tokens for optimistic concurrency.
//!
//! A version is an opaque string derived from resource content. Phantom types
//! keep the two wire forms apart at compile time:
//!
//! * [`RawVersion`] - the bare token, as stored in `meta.version` internally
//! * [`HttpVersion`] - the weak ETag form (`W/"abc123"`) used in headers and
//!   rendered resources
//!
//! ```rust
//! use scim_engine::resource::version::{HttpVersion, RawVersion};
//!
//! let raw = RawVersion::from_content(br#"{"userName":"bjensen"}"#);
//! let etag = HttpVersion::from(raw.clone()).to_string();
//! assert!(etag.starts_with("W/\""));
//!
//! let parsed: HttpVersion = etag.parse().unwrap();
//! assert_eq!(raw, parsed);
//! ```

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::{fmt, marker::PhantomData, str::FromStr};
use thiserror::Error;

use crate::error::ScimError;

/// Weak ETag format marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Http;

/// Bare token format marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Raw;

/// Opaque version token in a given wire format.
#[derive(Debug, Clone, Eq, Hash)]
pub struct ScimVersion<Format> {
    opaque: String,
    _format: PhantomData<Format>,
}

pub type HttpVersion = ScimVersion<Http>;

pub type RawVersion = ScimVersion<Raw>;

impl<Format> ScimVersion<Format> {
    /// Hash content into a version (SHA-256, first 8 bytes, base64).
    pub fn from_content(content: &[u8]) -> RawVersion {
        Self::digest(content, None)
    }

    /// Hash content together with a store revision number, so that two
    /// writes of identical content still produce distinct versions.
    pub fn for_revision(content: &[u8], revision: u64) -> RawVersion {
        Self::digest(content, Some(revision))
    }

    fn digest(content: &[u8], revision: Option<u64>) -> RawVersion {
        let mut hasher = Sha256::new();
        hasher.update(content);
        if let Some(revision) = revision {
            hasher.update(revision.to_be_bytes());
        }
        let hash = hasher.finalize();

        ScimVersion {
            opaque: BASE64.encode(&hash[..8]),
            _format: PhantomData,
        }
    }

    /// Wrap an externally produced token.
    pub fn from_hash(hash_string: impl AsRef<str>) -> RawVersion {
        ScimVersion {
            opaque: hash_string.as_ref().to_string(),
            _format: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.opaque
    }
}

impl fmt::Display for ScimVersion<Raw> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opaque)
    }
}

impl fmt::Display for ScimVersion<Http> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "W/\"{}\"", self.opaque)
    }
}

impl FromStr for ScimVersion<Raw> {
    type Err = VersionError;

    fn from_str(version_str: &str) -> Result<Self, Self::Err> {
        let trimmed = version_str.trim();
        if trimmed.is_empty() {
            return Err(VersionError::ParseError(
                "Version string cannot be empty".to_string(),
            ));
        }
        Ok(ScimVersion {
            opaque: trimmed.to_string(),
            _format: PhantomData,
        })
    }
}

/// Accepts weak (`W/"x"`) and strong (`"x"`) ETags.
impl FromStr for ScimVersion<Http> {
    type Err = VersionError;

    fn from_str(etag_header: &str) -> Result<Self, Self::Err> {
        let trimmed = etag_header.trim();
        let etag_value = trimmed.strip_prefix("W/").unwrap_or(trimmed);

        let opaque = etag_value
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'))
            .filter(|opaque| !opaque.is_empty())
            .ok_or_else(|| VersionError::InvalidEtagFormat(etag_header.to_string()))?;

        Ok(ScimVersion {
            opaque: opaque.to_string(),
            _format: PhantomData,
        })
    }
}

impl From<ScimVersion<Raw>> for ScimVersion<Http> {
    fn from(raw: ScimVersion<Raw>) -> Self {
        ScimVersion {
            opaque: raw.opaque,
            _format: PhantomData,
        }
    }
}

impl From<ScimVersion<Http>> for ScimVersion<Raw> {
    fn from(http: ScimVersion<Http>) -> Self {
        ScimVersion {
            opaque: http.opaque,
            _format: PhantomData,
        }
    }
}

// Versions are equal when their tokens match, whatever the format.
impl<F1, F2> PartialEq<ScimVersion<F2>> for ScimVersion<F1> {
    fn eq(&self, other: &ScimVersion<F2>) -> bool {
        self.opaque == other.opaque
    }
}

impl<Format> Serialize for ScimVersion<Format> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.opaque.serialize(serializer)
    }
}

impl<'de, Format> Deserialize<'de> for ScimVersion<Format> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opaque = String::deserialize(deserializer)?;
        Ok(ScimVersion {
            opaque,
            _format: PhantomData,
        })
    }
}

/// Errors raised when parsing version tokens.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum VersionError {
    #[error("Invalid ETag format: {0}")]
    InvalidEtagFormat(String),

    #[error("Failed to parse version: {0}")]
    ParseError(String),
}

impl From<VersionError> for ScimError {
    fn from(error: VersionError) -> Self {
        ScimError::invalid_request(error.to_string())
    }
}
