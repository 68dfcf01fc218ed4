//! Corpus fixtures
//!
//! Writes small directory trees for the indexer to walk.

use std::fs;
use std::path::{Path, PathBuf};

/// A directory of source files under test control
///
/// # Example
///
/// ```rust,ignore
/// let corpus = TestCorpus::new(dir.path().join("corpus"));
/// corpus.write("notes/rust.txt", "ownership and borrowing");
/// corpus.write("data/rows.csv", "id,name\n1,alpha\n");
/// ```
#[derive(Debug, Clone)]
pub struct TestCorpus {
    root: PathBuf,
}

impl TestCorpus {
    /// Create (if needed) and canonicalize the corpus root
    pub fn new(root: impl AsRef<Path>) -> Self {
        fs::create_dir_all(root.as_ref()).expect("Failed to create corpus root");
        let root = fs::canonicalize(root.as_ref()).expect("Failed to canonicalize corpus root");
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of `relative`, as the indexer will record it
    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// Write a text file, creating parent directories
    pub fn write(&self, relative: &str, contents: &str) -> PathBuf {
        self.write_bytes(relative, contents.as_bytes())
    }

    pub fn write_bytes(&self, relative: &str, contents: &[u8]) -> PathBuf {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create fixture directory");
        }
        fs::write(&path, contents).expect("Failed to write fixture");
        path
    }

    pub fn remove(&self, relative: &str) {
        fs::remove_file(self.path(relative)).expect("Failed to remove fixture");
    }

    /// Three topical documents with little vocabulary overlap
    pub fn seed_topics(&self) {
        self.write(
            "rust.txt",
            "Ownership and borrowing let the compiler reject data races. \
             The borrow checker tracks lifetimes of references.",
        );
        self.write(
            "baking.md",
            "A sourdough starter needs flour and water every day. \
             Bake the loaf in a hot dutch oven.",
        );
        self.write(
            "astronomy.txt",
            "The telescope resolved the rings of Saturn. \
             Jupiter has dozens of moons in stable orbits.",
        );
    }

    /// `n` numbered files named `doc-<i>.txt`
    pub fn seed_numbered(&self, n: usize) {
        for i in 0..n {
            self.write(
                &format!("doc-{i}.txt"),
                &format!("numbered document {i} about topic{i}"),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = TestCorpus::new(dir.path().join("corpus"));
        let path = corpus.write("a/b/c.txt", "hello");

        assert!(path.is_absolute());
        assert_eq!(fs::read_to_string(path).unwrap(), "hello");
    }

    #[test]
    fn test_seed_numbered() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = TestCorpus::new(dir.path());
        corpus.seed_numbered(4);
        assert_eq!(fs::read_dir(corpus.root()).unwrap().count(), 4);
    }
}
