//! Filesystem access used while mining build evidence.
//!
//! Every probe goes through [`FileSystemProbe`] so the same engine can run
//! against the local disk, a remote host, or a recorded in-memory tree.
use anyhow::{anyhow, Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use crate::paths;

/// Existence checks and listings against a possibly remote filesystem.
///
/// Paths are normalized forward-slash strings. Implementations must not
/// panic on foreign or malformed paths; they answer "does not exist".
pub trait FileSystemProbe: Send + Sync {
    fn exists(&self, path: &str) -> bool;

    fn is_dir(&self, path: &str) -> bool;

    /// Entry names (not full paths) of a directory; empty when unreadable.
    fn list(&self, dir: &str) -> Vec<String>;

    fn read_lines(&self, path: &str) -> Result<Vec<String>>;

    fn read_bytes(&self, path: &str) -> Result<Vec<u8>>;

    /// Resolve symbolic links, returning `None` when the path is missing.
    fn canonicalize(&self, path: &str) -> Option<String>;
}

/// Probe backed by `std::fs` on the analysis machine.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSystem;

impl FileSystemProbe for LocalFileSystem {
    fn exists(&self, path: &str) -> bool {
        Path::new(path).exists()
    }

    fn is_dir(&self, path: &str) -> bool {
        Path::new(path).is_dir()
    }

    fn list(&self, dir: &str) -> Vec<String> {
        let Ok(entries) = fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    fn read_lines(&self, path: &str) -> Result<Vec<String>> {
        let bytes = fs::read(path).with_context(|| format!("read {path}"))?;
        Ok(String::from_utf8_lossy(&bytes)
            .lines()
            .map(str::to_string)
            .collect())
    }

    fn read_bytes(&self, path: &str) -> Result<Vec<u8>> {
        fs::read(path).with_context(|| format!("read {path}"))
    }

    fn canonicalize(&self, path: &str) -> Option<String> {
        let resolved = fs::canonicalize(path).ok()?;
        Some(paths::to_forward_slashes(&resolved.to_string_lossy()))
    }
}

/// In-memory tree, used for replaying remote layouts and in tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryFileSystem {
    files: BTreeMap<String, String>,
    dirs: BTreeSet<String>,
    links: BTreeMap<String, String>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file (and all of its parent directories).
    pub fn with_file(mut self, path: &str, contents: &str) -> Self {
        let path = paths::normalize(path);
        self.add_parents(&path);
        self.files.insert(path, contents.to_string());
        self
    }

    pub fn with_dir(mut self, path: &str) -> Self {
        let path = paths::normalize(path);
        self.add_parents(&path);
        self.dirs.insert(path);
        self
    }

    /// Make `link` resolve to `target` for [`FileSystemProbe::canonicalize`].
    pub fn with_link(mut self, link: &str, target: &str) -> Self {
        self.links
            .insert(paths::normalize(link), paths::normalize(target));
        self
    }

    fn add_parents(&mut self, path: &str) {
        let mut current = paths::parent(path);
        while let Some(dir) = current {
            self.dirs.insert(dir.to_string());
            current = paths::parent(dir);
        }
    }

    fn resolve_links(&self, path: &str) -> String {
        let mut resolved = path.to_string();
        // Bounded so that link cycles cannot hang a probe.
        for _ in 0..16 {
            let hit = self
                .links
                .iter()
                .find(|(link, _)| paths::starts_with_dir(&resolved, link));
            let Some((link, target)) = hit else {
                break;
            };
            let rest = &resolved[link.len()..];
            resolved = paths::normalize(&format!("{target}{rest}"));
        }
        resolved
    }
}

impl FileSystemProbe for MemoryFileSystem {
    fn exists(&self, path: &str) -> bool {
        let path = self.resolve_links(&paths::normalize(path));
        self.files.contains_key(&path) || self.dirs.contains(&path)
    }

    fn is_dir(&self, path: &str) -> bool {
        let path = self.resolve_links(&paths::normalize(path));
        self.dirs.contains(&path)
    }

    fn list(&self, dir: &str) -> Vec<String> {
        let dir = self.resolve_links(&paths::normalize(dir));
        let children = self
            .files
            .keys()
            .chain(self.dirs.iter())
            .filter(|candidate| paths::parent(candidate) == Some(dir.as_str()))
            .map(|candidate| paths::file_name(candidate).to_string())
            .collect::<BTreeSet<_>>();
        children.into_iter().collect()
    }

    fn read_lines(&self, path: &str) -> Result<Vec<String>> {
        let path = self.resolve_links(&paths::normalize(path));
        let contents = self
            .files
            .get(&path)
            .ok_or_else(|| anyhow!("no such file: {path}"))?;
        Ok(contents.lines().map(str::to_string).collect())
    }

    fn read_bytes(&self, path: &str) -> Result<Vec<u8>> {
        let path = self.resolve_links(&paths::normalize(path));
        self.files
            .get(&path)
            .map(|contents| contents.as_bytes().to_vec())
            .ok_or_else(|| anyhow!("no such file: {path}"))
    }

    fn canonicalize(&self, path: &str) -> Option<String> {
        let resolved = self.resolve_links(&paths::normalize(path));
        (self.files.contains_key(&resolved) || self.dirs.contains(&resolved)).then_some(resolved)
    }
}
