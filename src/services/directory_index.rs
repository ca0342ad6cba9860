//! Derives a pseudo-hierarchical directory view from flat object keys.
//!
//! The store has no directory concept: `a/b/c.txt` is one opaque key.
//! Partitioning the keys under a parent prefix yields the two lists a
//! browsing UI needs, in a single linear pass. Nothing here is cached; the
//! flat key set is the only authority and the view is recomputed per
//! request.

use std::collections::HashMap;

/// Reserved object name used to keep an otherwise-empty directory
/// enumerable. Never surfaced as a file.
pub const DIRECTORY_PLACEHOLDER: &str = ".keep";

/// Body written into a placeholder object when a directory is created.
pub const PLACEHOLDER_CONTENT: &str = "# This file maintains the directory structure";

/// Result of partitioning the keys under one parent path.
#[derive(Debug, Default)]
pub struct DirectoryIndex {
    /// Full keys of objects that live directly in the parent directory,
    /// placeholders excluded. Order follows the input key order.
    pub local_files: Vec<String>,

    /// First-level child directory name mapped to the count of keys that
    /// fall anywhere under it, recursively, placeholders included. No
    /// ordering guarantee; callers needing determinism must sort.
    pub child_dirs: HashMap<String, usize>,
}

/// The enumeration prefix for a directory path: `""` at the root, otherwise
/// the path with a trailing delimiter.
pub fn list_prefix(parent: &str) -> String {
    if parent.is_empty() {
        String::new()
    } else {
        format!("{}/", parent)
    }
}

/// Partition `keys` into local files and child directories of `parent`.
///
/// `parent` may be empty, denoting the root. Keys outside the parent prefix
/// are ignored, so an unknown parent yields empty partitions rather than an
/// error.
pub fn partition<'a, I>(parent: &str, keys: I) -> DirectoryIndex
where
    I: IntoIterator<Item = &'a str>,
{
    let prefix = list_prefix(parent);
    let nested_placeholder = format!("/{}", DIRECTORY_PLACEHOLDER);
    let mut index = DirectoryIndex::default();

    for key in keys {
        let Some(remainder) = key.strip_prefix(prefix.as_str()) else {
            continue;
        };
        if remainder.is_empty() {
            continue;
        }

        match remainder.split_once('/') {
            Some((segment, _)) => {
                if !segment.is_empty() {
                    *index.child_dirs.entry(segment.to_string()).or_insert(0) += 1;
                }
            }
            None => {
                if remainder != DIRECTORY_PLACEHOLDER && !remainder.ends_with(&nested_placeholder)
                {
                    index.local_files.push(key.to_string());
                }
            }
        }
    }

    index
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_of(parent: &str, keys: &[&str]) -> DirectoryIndex {
        partition(parent, keys.iter().copied())
    }

    #[test]
    fn empty_key_set_yields_empty_partitions() {
        let index = index_of("", &[]);
        assert!(index.local_files.is_empty());
        assert!(index.child_dirs.is_empty());
    }

    #[test]
    fn unknown_parent_yields_empty_partitions() {
        let index = index_of("missing", &["a/one.txt", "top.txt"]);
        assert!(index.local_files.is_empty());
        assert!(index.child_dirs.is_empty());
    }

    #[test]
    fn local_files_have_no_further_delimiter() {
        let keys = [
            "tax-documents/report.pdf",
            "tax-documents/2025/q1.pdf",
            "tax-documents/2025/deep/x.pdf",
            "receipts/lunch.jpg",
        ];
        let index = index_of("tax-documents", &keys);

        assert_eq!(index.local_files, vec!["tax-documents/report.pdf"]);
        for key in &index.local_files {
            let stripped = key.strip_prefix("tax-documents/").unwrap();
            assert!(!stripped.contains('/'));
        }
    }

    #[test]
    fn child_counts_are_recursive_descendant_counts() {
        let keys = [
            "a/b/one.txt",
            "a/b/two.txt",
            "a/b/deep/three.txt",
            "a/c/four.txt",
            "a/direct.txt",
        ];
        let index = index_of("a", &keys);

        assert_eq!(index.local_files, vec!["a/direct.txt"]);
        assert_eq!(index.child_dirs.len(), 2);
        assert_eq!(index.child_dirs.get("b"), Some(&3));
        assert_eq!(index.child_dirs.get("c"), Some(&1));
    }

    #[test]
    fn root_partitions_undelimited_keys_as_files() {
        let keys = ["top.txt", "a/nested.txt", "a/b/deeper.txt"];
        let index = index_of("", &keys);

        assert_eq!(index.local_files, vec!["top.txt"]);
        assert_eq!(index.child_dirs.get("a"), Some(&2));
    }

    #[test]
    fn placeholder_is_hidden_from_files_but_counted_in_directories() {
        let keys = ["invoices/.keep"];

        // Listing the directory itself: the placeholder never appears.
        let inside = index_of("invoices", &keys);
        assert!(inside.local_files.is_empty());
        assert!(inside.child_dirs.is_empty());

        // Listing the parent: the directory is visible with count 1.
        let parent = index_of("", &keys);
        assert!(parent.local_files.is_empty());
        assert_eq!(parent.child_dirs.get("invoices"), Some(&1));
    }

    #[test]
    fn nested_placeholders_count_toward_ancestor_directories() {
        // Exclusion is scoped to the directory owning the placeholder; an
        // ancestor sees it as an ordinary descendant key.
        let keys = ["a/b/.keep", "a/b/real.txt"];
        let index = index_of("a", &keys);
        assert_eq!(index.child_dirs.get("b"), Some(&2));

        let inside = index_of("a/b", &keys);
        assert_eq!(inside.local_files, vec!["a/b/real.txt"]);
    }

    #[test]
    fn root_placeholder_is_excluded() {
        let index = index_of("", &[".keep", "visible.txt"]);
        assert_eq!(index.local_files, vec!["visible.txt"]);
    }

    #[test]
    fn every_distinct_child_appears_exactly_once() {
        let keys = ["d/x/1", "d/x/2", "d/y/1", "d/x/3"];
        let index = index_of("d", &keys);
        assert_eq!(index.child_dirs.len(), 2);
        assert_eq!(
            index.child_dirs.values().sum::<usize>(),
            keys.len(),
            "each key falls under exactly one first-level child"
        );
    }

    #[test]
    fn degenerate_keys_do_not_panic_or_surface() {
        // A key equal to the prefix itself or with doubled delimiters is
        // skipped rather than listed.
        let index = index_of("a", &["a/", "a//odd.txt"]);
        assert!(index.local_files.is_empty());
        assert!(index.child_dirs.is_empty());
    }
}
