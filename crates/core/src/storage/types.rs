//! Value types returned by the storage clients.

use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use super::error::StorageError;

/// Streaming request body for uploads.
pub type ObjectBody = BoxStream<'static, Result<Bytes, StorageError>>;

/// Builds an upload body from an in-memory buffer.
#[must_use]
pub fn body_from_bytes(bytes: impl Into<Bytes>) -> ObjectBody {
    Box::pin(futures::stream::once(futures::future::ready(Ok(bytes.into()))))
}

/// Builds an empty upload body.
#[must_use]
pub fn empty_body() -> ObjectBody {
    Box::pin(futures::stream::empty())
}

/// An object as seen by a listing.
///
/// Rebuilt on every listing, never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageObject {
    /// Full key of the object.
    pub name: String,
    /// Last modification time, when the backend reports one.
    pub last_modified: Option<DateTime<Utc>>,
    /// Normalized entity tag.
    pub etag: String,
    /// Size in bytes.
    pub size: u64,
}

/// A folder-like grouping returned by non-recursive listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonPrefix {
    /// The shared key prefix, ending with `/`.
    pub prefix: String,
}

impl CommonPrefix {
    /// Prefixes occupy no storage.
    #[must_use]
    pub const fn size(&self) -> u64 {
        0
    }
}

/// One entry of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ListedEntry {
    /// A stored object.
    Object(StorageObject),
    /// A common prefix (non-recursive listings only).
    Prefix(CommonPrefix),
}

impl ListedEntry {
    /// Key of the object, or the prefix itself.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Object(object) => &object.name,
            Self::Prefix(prefix) => &prefix.prefix,
        }
    }

    /// Size in bytes; always zero for prefixes.
    #[must_use]
    pub fn size(&self) -> u64 {
        match self {
            Self::Object(object) => object.size,
            Self::Prefix(prefix) => prefix.size(),
        }
    }

    /// Returns the object, if this entry is one.
    #[must_use]
    pub fn as_object(&self) -> Option<&StorageObject> {
        match self {
            Self::Object(object) => Some(object),
            Self::Prefix(_) => None,
        }
    }
}

/// A bucket known to the endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketInfo {
    /// Bucket name.
    pub name: String,
    /// Creation time, when reported.
    pub creation_date: Option<DateTime<Utc>>,
}

/// Result of a completed upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedObject {
    /// Key the object was stored under.
    pub name: String,
    /// Normalized entity tag.
    pub etag: String,
}

/// Character encoding used to decode object contents as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    /// Strict UTF-8.
    #[default]
    Utf8,
    /// ISO-8859-1; every byte maps to the code point of the same value.
    Latin1,
}

impl TextEncoding {
    /// Decodes `bytes`, returning `None` when they are not valid in this encoding.
    #[must_use]
    pub fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            Self::Utf8 => std::str::from_utf8(bytes).ok().map(str::to_owned),
            Self::Latin1 => Some(bytes.iter().map(|&b| char::from(b)).collect()),
        }
    }

    /// Encoding label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Utf8 => "utf-8",
            Self::Latin1 => "latin1",
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
