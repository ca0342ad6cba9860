//! Represents an emulated directory derived from object key prefixes.

use serde::{Deserialize, Serialize};

/// A synthetic directory entry.
///
/// Directories are a naming convention over the flat namespace: one exists
/// only while at least one object key carries its path as a prefix (a
/// placeholder object is enough). `file_count` is the number of keys that
/// fall anywhere under the directory, recursively.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryItem {
    /// Single path segment naming the directory.
    pub name: String,

    /// Full path: parent path + name.
    pub path: String,

    /// Count of descendant objects, placeholders included.
    pub file_count: usize,
}
