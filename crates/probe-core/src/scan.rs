//! File discovery
//!
//! Walks the configured root and yields the files worth indexing.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::config::{normalize_extension, Settings};

/// Filters applied while walking the root
#[derive(Debug, Clone)]
pub struct FileScanner {
    root: PathBuf,
    blacklist_extensions: HashSet<String>,
    blacklist_directory_names: HashSet<String>,
    max_file_size: u64,
}

impl FileScanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            blacklist_extensions: HashSet::new(),
            blacklist_directory_names: HashSet::new(),
            max_file_size: u64::MAX,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            root: settings.paths.root_dir.clone(),
            blacklist_extensions: settings.blacklist_extensions(),
            blacklist_directory_names: settings.blacklist_directory_names(),
            max_file_size: settings.max_file_size_bytes(),
        }
    }

    pub fn with_blacklist_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.blacklist_extensions = extensions
            .into_iter()
            .map(|e| normalize_extension(e.as_ref()))
            .collect();
        self
    }

    pub fn with_blacklist_directory_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blacklist_directory_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute paths of every accepted file under the root, sorted.
    ///
    /// Unreadable directory entries are skipped. Fails only if the root
    /// itself cannot be resolved.
    pub fn discover(&self) -> std::io::Result<Vec<PathBuf>> {
        let root = self.root.canonicalize()?;

        // Symlinked files are followed, symlinked directories are not
        let mut files: Vec<PathBuf> = WalkDir::new(&root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| !e.file_type().is_dir())
            .filter_map(|e| {
                let meta = std::fs::metadata(e.path()).ok()?;
                meta.is_file().then(|| (e.into_path(), meta.len()))
            })
            .filter(|(path, size)| self.accepts(path, Some(*size)))
            .map(|(path, _)| path)
            .collect();

        files.sort();
        Ok(files)
    }

    /// Whether `path` passes the extension, directory and size filters.
    /// Directory names are matched against every component of the absolute
    /// path, the root's own ancestors included. A file whose size is unknown
    /// is rejected.
    fn accepts(&self, path: &Path, size: Option<u64>) -> bool {
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            if self.blacklist_extensions.contains(&normalize_extension(ext)) {
                tracing::debug!("Skipping {} (blacklisted extension)", path.display());
                return false;
            }
        }

        let in_blacklisted_dir = path.components().any(|c| {
            c.as_os_str()
                .to_str()
                .is_some_and(|name| self.blacklist_directory_names.contains(name))
        });
        if in_blacklisted_dir {
            tracing::debug!("Skipping {} (blacklisted directory)", path.display());
            return false;
        }

        match size {
            Some(size) if size <= self.max_file_size => true,
            Some(size) => {
                tracing::debug!("Skipping {} ({} bytes, over the size limit)", path.display(), size);
                false
            }
            None => false,
        }
    }
}

/// A file read for indexing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: String,
    pub text: String,
}

impl SourceFile {
    /// Read `path`, decoding invalid UTF-8 lossily. Returns `None` if the
    /// file cannot be read.
    pub fn load(path: &Path) -> Option<Self> {
        match std::fs::read(path) {
            Ok(bytes) => Some(Self {
                path: path.to_string_lossy().into_owned(),
                text: String::from_utf8_lossy(&bytes).into_owned(),
            }),
            Err(e) => {
                tracing::debug!("Skipping unreadable file {}: {}", path.display(), e);
                None
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
