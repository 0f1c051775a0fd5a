//! The tag to index registry.
//!
//! Each tag owns one directory under the data root. Handles are shared as
//! `Arc<IndexHandle>` so searches can run while other tags are being opened or
//! removed.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use dashmap::{DashMap, mapref::entry::Entry};
use shoal_config::{Mapping, Mappings, SearchSettings};
use tracing::{info, warn};

use crate::{
    IndexError, IndexHandle,
    suggest::{SUGGEST_PREFIX, suggest_mapping},
};

/// Concurrent registry of open indexes rooted at a data directory.
pub struct IndexRegistry {
    /// Data root; one subdirectory per tag.
    root: PathBuf,
    /// Configured field mappings.
    mappings: Mappings,
    /// Analyzer and sorting settings applied to every index.
    settings: SearchSettings,
    /// Open indexes by tag.
    indexes: DashMap<String, Arc<IndexHandle>>,
}

impl IndexRegistry {
    /// Creates an empty registry. No directories are touched until an index is added.
    pub fn new(root: impl Into<PathBuf>, mappings: Mappings, settings: SearchSettings) -> Self {
        Self {
            root: root.into(),
            mappings,
            settings,
            indexes: DashMap::new(),
        }
    }

    /// Returns the data root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Opens or creates the index for `tag`, returning the existing handle if the
    /// tag is already registered.
    pub fn add_index(&self, tag: &str) -> Result<Arc<IndexHandle>, IndexError> {
        check_tag(tag)?;
        self.open(tag, || self.mappings.for_tag(tag), false)
    }

    /// Like [`add_index`](Self::add_index), but fails with
    /// [`IndexError::IndexExists`] when the tag is already registered.
    pub fn create_index(&self, tag: &str) -> Result<Arc<IndexHandle>, IndexError> {
        check_tag(tag)?;
        self.open(tag, || self.mappings.for_tag(tag), true)
    }

    /// Opens or creates an index with an explicit mapping.
    pub(crate) fn add_index_with(
        &self,
        tag: &str,
        mapping: &Mapping,
    ) -> Result<Arc<IndexHandle>, IndexError> {
        self.open(tag, || mapping.clone(), false)
    }

    /// Reopens every index directory found under the data root.
    ///
    /// Directories that fail to open are logged and skipped. Returns the tags
    /// that were opened.
    pub fn load_existing(&self) -> Result<Vec<String>, IndexError> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut opened = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(tag) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let result = if tag.starts_with(SUGGEST_PREFIX) {
                self.add_index_with(&tag, &suggest_mapping())
            } else if check_tag(&tag).is_ok() {
                self.add_index(&tag)
            } else {
                continue;
            };
            match result {
                Ok(_) => opened.push(tag),
                Err(e) => warn!(%tag, error = %e, "skipping index directory"),
            }
        }
        opened.sort();
        Ok(opened)
    }

    /// Returns the handle registered under `tag`.
    pub fn get_index(&self, tag: &str) -> Result<Arc<IndexHandle>, IndexError> {
        self.indexes
            .get(tag)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| IndexError::UnknownIndex(tag.to_string()))
    }

    /// Unregisters `tag`. The handle closes once the last in-flight user drops it;
    /// the directory stays on disk. Returns false if the tag was not registered.
    pub fn remove_index(&self, tag: &str) -> bool {
        let removed = self.indexes.remove(tag).is_some();
        if removed {
            info!(tag, "removed index");
        }
        removed
    }

    /// Returns true if `tag` is registered.
    pub fn contains(&self, tag: &str) -> bool {
        self.indexes.contains_key(tag)
    }

    /// Returns the registered tags, sorted.
    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.indexes.iter().map(|e| e.key().clone()).collect();
        tags.sort();
        tags
    }

    /// Opens `tag`, or creates it with `mapping`.
    ///
    /// With `exclusive`, an existing tag is a conflict.
    fn open(
        &self,
        tag: &str,
        mapping: impl FnOnce() -> Mapping,
        exclusive: bool,
    ) -> Result<Arc<IndexHandle>, IndexError> {
        // The entry guard holds the shard lock, so two callers never open the
        // same directory concurrently.
        match self.indexes.entry(tag.to_string()) {
            Entry::Occupied(entry) => {
                if exclusive {
                    Err(IndexError::IndexExists(tag.to_string()))
                } else {
                    Ok(Arc::clone(entry.get()))
                }
            }
            Entry::Vacant(entry) => {
                let handle = IndexHandle::create_or_open(
                    tag,
                    &self.root.join(tag),
                    &mapping(),
                    &self.settings,
                )?;
                info!(tag, "added index");
                Ok(Arc::clone(entry.insert(Arc::new(handle)).value()))
            }
        }
    }
}

/// Checks that a user tag is a single safe path component outside the reserved
/// suggest namespace.
fn check_tag(tag: &str) -> Result<(), IndexError> {
    let valid = !tag.is_empty()
        && tag != "."
        && tag != ".."
        && !tag.starts_with(SUGGEST_PREFIX)
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(IndexError::InvalidTag(tag.to_string()))
    }
}
