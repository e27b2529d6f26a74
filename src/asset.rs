//! Read-only sources of template fragments.
//!
//! Fragments are addressed by a hierarchical `/`-separated path such as
//! `repo/main.html`. The compiler only ever calls [`AssetSource::fetch`].

use rustc_hash::FxHashMap;
use std::{
    fs, io,
    path::{Component, Path, PathBuf},
};
use thiserror::Error;

/// Fragment fetch failures.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("asset `{0}` not found")]
    NotFound(String),

    #[error("IO error when reading asset `{0}`")]
    Io(String, #[source] io::Error),
}

/// Store of named fragment sources.
pub trait AssetSource: Send + Sync {
    fn fetch(&self, path: &str) -> Result<Vec<u8>, AssetError>;
}

// ============================================================================
// Directory-backed source
// ============================================================================

/// Serves fragments from a directory on disk.
#[derive(Debug, Clone)]
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a fragment path under the root. Rejects anything escaping it.
    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let rel = Path::new(path.trim_start_matches('/'));
        let escapes = rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        (!escapes && !path.is_empty()).then(|| self.root.join(rel))
    }
}

impl AssetSource for DirSource {
    fn fetch(&self, path: &str) -> Result<Vec<u8>, AssetError> {
        let full = self
            .resolve(path)
            .ok_or_else(|| AssetError::NotFound(path.to_owned()))?;

        fs::read(&full).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => AssetError::NotFound(path.to_owned()),
            _ => AssetError::Io(path.to_owned(), err),
        })
    }
}

// ============================================================================
// In-memory source
// ============================================================================

/// Fragments held in memory (embedded bundles, tests).
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: FxHashMap<String, Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.files
            .insert(normalize(&path.into()).to_owned(), content.into());
    }

    pub fn with(mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.insert(path, content);
        self
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl AssetSource for MemorySource {
    fn fetch(&self, path: &str) -> Result<Vec<u8>, AssetError> {
        self.files
            .get(normalize(path))
            .cloned()
            .ok_or_else(|| AssetError::NotFound(path.to_owned()))
    }
}

impl<P: Into<String>, C: Into<Vec<u8>>> FromIterator<(P, C)> for MemorySource {
    fn from_iter<I: IntoIterator<Item = (P, C)>>(iter: I) -> Self {
        let mut source = Self::new();
        for (path, content) in iter {
            source.insert(path, content);
        }
        source
    }
}

/// `/layout.html` and `layout.html` address the same fragment.
fn normalize(path: &str) -> &str {
    path.trim_start_matches('/')
}
