//! Represents a file visible in a portal directory.

use crate::store::ObjectRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single file within the currently listed directory.
///
/// Derived from an [`ObjectRecord`] on every listing request; never cached.
/// The full key, split on `/`, has exactly one more segment than the owning
/// directory path, otherwise the object belongs to a deeper subdirectory and
/// is not represented as a `FileItem` of this directory.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileItem {
    /// Identifier: the object's full key in the store.
    pub id: String,

    /// Display name: the path segment after the last delimiter.
    pub name: String,

    /// Size in bytes.
    pub size: i64,

    /// Content type (MIME type), defaulted when the store has none.
    pub content_type: String,

    /// Timestamp when the object was last modified.
    pub upload_date: DateTime<Utc>,

    /// Path of the directory this file was listed under.
    pub directory: String,

    /// Full object key, identical to `id`.
    pub full_path: String,
}

impl FileItem {
    /// Build a `FileItem` from a store record scoped to `directory`.
    pub fn from_record(record: &ObjectRecord, directory: &str) -> Self {
        let name = record
            .key
            .rsplit('/')
            .next()
            .unwrap_or(record.key.as_str())
            .to_string();
        Self {
            id: record.key.clone(),
            name,
            size: record.size_bytes,
            content_type: record
                .content_type
                .clone()
                .unwrap_or_else(|| "application/octet-stream".into()),
            upload_date: record.last_modified,
            directory: directory.to_string(),
            full_path: record.key.clone(),
        }
    }
}
