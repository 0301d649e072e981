//! Packaging and persistence of generated trees
//!
//! A [`Packager`] turns a finished [`FileTree`] into one payload, and a
//! [`Storage`] keeps that payload and hands back a retrieval reference.

use crate::file_tree::{BundleError, FileTree};
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Errors that can occur while packaging a tree
#[derive(Debug, Error)]
pub enum PackagingError {
    #[error("Failed to serialize bundle: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to write archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Nothing to package")]
    EmptyTree,
}

/// Errors that can occur while storing a package
#[derive(Debug, Error)]
pub enum StorageError {
    /// Failed to determine the data directory location
    #[error("Failed to determine data directory location")]
    DataDirectoryNotFound,

    /// Failed to write the payload
    #[error("Failed to write {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The key would escape the storage directory
    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    /// The configured public base URL is not a URL
    #[error("Invalid base URL {url}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

/// A packaged tree, ready to store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub bytes: Vec<u8>,
    /// File extension of the payload, without the dot
    pub extension: String,
    pub content_type: String,
}

/// Trait for turning a file tree into a single payload
pub trait Packager: Send + Sync {
    /// Packages `tree`, whose paths all start with `root`
    fn package(&self, root: &str, tree: &FileTree) -> Result<Package, PackagingError>;
}

/// Packs a tree into a deflated zip archive
///
/// Entry names are the tree paths, so extracting the archive recreates the
/// library root folder.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipPackager;

impl Packager for ZipPackager {
    fn package(&self, root: &str, tree: &FileTree) -> Result<Package, PackagingError> {
        if tree.is_empty() {
            return Err(PackagingError::EmptyTree);
        }

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (path, contents) in tree.iter() {
            let options =
                SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
            writer.start_file(path, options)?;
            writer.write_all(contents)?;
        }
        let bytes = writer.finish()?.into_inner();
        debug!(root, entries = tree.len(), "wrote zip archive");

        Ok(Package {
            bytes,
            extension: "zip".to_string(),
            content_type: "application/zip".to_string(),
        })
    }
}

/// Reads an archive written by [`ZipPackager`]
///
/// Returns the root folder name (the first segment of the first entry) and
/// the tree. Directory entries are skipped.
pub fn read_zip(bytes: &[u8]) -> Result<(String, FileTree), BundleError> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|e| BundleError::Decode(e.to_string()))?;

    let mut tree = FileTree::new();
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| BundleError::Decode(e.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents)?;
        tree.insert(name, contents);
    }

    let root = tree
        .paths()
        .next()
        .and_then(|path| path.split('/').next())
        .unwrap_or_default()
        .to_string();
    Ok((root, tree))
}

/// Reads a package of either format, telling them apart by content
pub fn read_package(bytes: &[u8]) -> Result<(String, FileTree), BundleError> {
    if bytes.starts_with(b"PK\x03\x04") {
        read_zip(bytes)
    } else {
        read_bundle(bytes)
    }
}

#[derive(Serialize, Deserialize)]
struct BundleDocument {
    root: String,
    /// Path to base64 contents
    files: BTreeMap<String, String>,
}

/// Packs a tree into a JSON bundle `{ root, files: { path: base64 } }`
#[derive(Debug, Clone, Copy, Default)]
pub struct BundlePackager;

impl Packager for BundlePackager {
    fn package(&self, root: &str, tree: &FileTree) -> Result<Package, PackagingError> {
        if tree.is_empty() {
            return Err(PackagingError::EmptyTree);
        }

        let document = BundleDocument {
            root: root.to_string(),
            files: tree
                .iter()
                .map(|(path, contents)| (path.to_string(), STANDARD.encode(contents)))
                .collect(),
        };

        Ok(Package {
            bytes: serde_json::to_vec_pretty(&document)?,
            extension: "json".to_string(),
            content_type: "application/json".to_string(),
        })
    }
}

/// Reads a bundle written by [`BundlePackager`]
///
/// Returns the root folder name and the tree.
pub fn read_bundle(bytes: &[u8]) -> Result<(String, FileTree), BundleError> {
    let document: BundleDocument =
        serde_json::from_slice(bytes).map_err(|e| BundleError::Decode(e.to_string()))?;

    let mut tree = FileTree::new();
    for (path, encoded) in document.files {
        let contents = STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| BundleError::Decode(format!("{path}: {e}")))?;
        tree.insert(path, contents);
    }

    Ok((document.root, tree))
}

/// Storage key for a package of the given root folder
///
/// Keys look like `zips/<root>-<ulid>.zip` (or `bundles/...` for other
/// formats); the ULID keeps them unique and sortable by creation time.
pub fn storage_key(root: &str, extension: &str) -> String {
    let dir = if extension == "zip" { "zips" } else { "bundles" };
    format!("{}/{}-{}.{}", dir, root, ulid::Ulid::new(), extension)
}

/// Trait for keeping packaged payloads
pub trait Storage: Send + Sync {
    /// Stores `package` under `key` and returns its retrieval reference
    fn put(&self, key: &str, package: &Package) -> Result<String, StorageError>;
}

/// Platform data directory of the tool
pub fn default_data_dir() -> Result<PathBuf, StorageError> {
    directories::ProjectDirs::from("io", "emby-meta", "emby-meta")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or(StorageError::DataDirectoryNotFound)
}

/// Stores payloads as files below a base directory
///
/// With a public base URL configured, the retrieval reference is
/// `<base_url>/download?key=<key>`; without one it is the absolute path of
/// the written file.
pub struct LocalStorage {
    base_dir: PathBuf,
    base_url: Option<String>,
}

impl LocalStorage {
    pub fn new(base_dir: impl Into<PathBuf>, base_url: Option<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            base_url: base_url
                .map(|url| url.trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty()),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn reference(&self, key: &str, path: &Path) -> Result<String, StorageError> {
        let Some(base_url) = &self.base_url else {
            let absolute = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
            return Ok(absolute.display().to_string());
        };

        let endpoint = format!("{base_url}/download");
        reqwest::Url::parse_with_params(&endpoint, &[("key", key)])
            .map(|url| url.to_string())
            .map_err(|e| StorageError::InvalidBaseUrl {
                url: base_url.clone(),
                reason: e.to_string(),
            })
    }
}

impl Storage for LocalStorage {
    fn put(&self, key: &str, package: &Package) -> Result<String, StorageError> {
        if key.is_empty()
            || !Path::new(key)
                .components()
                .all(|c| matches!(c, std::path::Component::Normal(_)))
        {
            return Err(StorageError::InvalidKey(key.to_string()));
        }

        let path = self.base_dir.join(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StorageError::WriteFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        fs::write(&path, &package.bytes).map_err(|e| StorageError::WriteFailed {
            path: path.clone(),
            source: e,
        })?;

        info!(
            key,
            path = %path.display(),
            content_type = %package.content_type,
            "stored package"
        );
        self.reference(key, &path)
    }
}
