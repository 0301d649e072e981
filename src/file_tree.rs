//! In-memory library tree
//!
//! The pipeline accumulates every generated file here, keyed by its
//! slash-separated path relative to the archive root, before handing the
//! complete tree to packaging.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Component, Path};
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while reading or materializing a bundle
#[derive(Debug, Error)]
pub enum BundleError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A path would land outside the target directory
    #[error("Refusing unsafe path in bundle: {0}")]
    UnsafePath(String),

    /// The bundle payload could not be decoded
    #[error("Failed to decode bundle: {0}")]
    Decode(String),
}

/// Files keyed by relative path, in path order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileTree {
    files: BTreeMap<String, Vec<u8>>,
}

impl FileTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file, replacing any earlier file at the same path
    pub fn insert(&mut self, path: impl Into<String>, contents: Vec<u8>) {
        self.files.insert(path.into(), contents);
    }

    /// Adds a UTF-8 text file
    pub fn insert_text(&mut self, path: impl Into<String>, text: &str) {
        self.insert(path, text.as_bytes().to_vec());
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files.iter().map(|(p, c)| (p.as_str(), c.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Sum of all file sizes in bytes
    pub fn total_bytes(&self) -> u64 {
        self.files.values().map(|c| c.len() as u64).sum()
    }

    /// Writes every file below `dir`, creating directories as needed
    ///
    /// Returns the number of files written.
    ///
    /// # Errors
    ///
    /// Fails before writing anything if a path is absolute or contains `..`,
    /// and on the first IO error.
    pub fn write_to_dir(&self, dir: &Path) -> Result<usize, BundleError> {
        for path in self.paths() {
            if !is_safe_relative(path) {
                return Err(BundleError::UnsafePath(path.to_string()));
            }
        }

        for (path, contents) in self.iter() {
            let target = dir.join(path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, contents)?;
            debug!(path = %target.display(), bytes = contents.len(), "wrote file");
        }

        Ok(self.len())
    }
}

fn is_safe_relative(path: &str) -> bool {
    let path = Path::new(path);
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
}
