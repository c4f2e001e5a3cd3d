//! Server-managed resource metadata.
//!
//! `meta` is owned by the store: clients never set it, and every mutation
//! refreshes `lastModified` and `version`.

use super::version::{HttpVersion, RawVersion};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The `meta` attribute of a stored resource (RFC 7643 §3.1).
///
/// `version` is held as a raw token and rendered as a weak ETag, so the JSON
/// form carries `"version": "W/\"...\""`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(rename = "resourceType")]
    pub resource_type: String,
    pub created: DateTime<Utc>,
    #[serde(rename = "lastModified")]
    pub last_modified: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(serialize_with = "serialize_etag", deserialize_with = "deserialize_etag")]
    pub version: RawVersion,
}

impl Meta {
    /// Metadata for a resource created now.
    pub fn new_for_creation(
        resource_type: impl Into<String>,
        location: Option<String>,
        version: RawVersion,
    ) -> Self {
        let now = Utc::now();
        Self {
            resource_type: resource_type.into(),
            created: now,
            last_modified: now,
            location,
            version,
        }
    }

    /// Copy with `lastModified` set to now and a new version.
    pub fn touched(&self, version: RawVersion) -> Self {
        let now = Utc::now();
        Self {
            resource_type: self.resource_type.clone(),
            created: self.created,
            last_modified: now.max(self.created),
            location: self.location.clone(),
            version,
        }
    }
}

fn serialize_etag<S>(version: &RawVersion, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    HttpVersion::from(version.clone())
        .to_string()
        .serialize(serializer)
}

/// Accepts the ETag form and, for records written by other tools, a bare token.
fn deserialize_etag<'de, D>(deserializer: D) -> Result<RawVersion, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    match text.parse::<HttpVersion>() {
        Ok(etag) => Ok(etag.into()),
        Err(_) => text.parse::<RawVersion>().map_err(serde::de::Error::custom),
    }
}
