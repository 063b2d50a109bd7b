//! Memoized filesystem probes.
//!
//! Probes may hit a remote host, so each path is asked about at most once.
//! A missing parent answers for all of its children.
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::fs_probe::FileSystemProbe;
use crate::paths;

pub struct ProbeCache {
    fs: Arc<dyn FileSystemProbe>,
    exists: RwLock<HashMap<String, bool>>,
    dirs: RwLock<HashMap<String, bool>>,
    listings: RwLock<HashMap<String, Arc<Vec<String>>>>,
}

impl ProbeCache {
    pub fn new(fs: Arc<dyn FileSystemProbe>) -> Self {
        Self {
            fs,
            exists: RwLock::new(HashMap::new()),
            dirs: RwLock::new(HashMap::new()),
            listings: RwLock::new(HashMap::new()),
        }
    }

    /// Cached existence check.
    ///
    /// Ancestors are resolved first; once one is known missing, descendants
    /// are answered without touching the filesystem.
    pub fn exists(&self, path: &str) -> bool {
        if let Some(known) = self.cached(path) {
            return known;
        }
        let answer = match paths::parent(path) {
            Some(parent) if !self.exists(parent) => false,
            Some(parent) => match self.cached_listing(parent) {
                Some(entries) => entries.iter().any(|name| name == paths::file_name(path)),
                None => self.fs.exists(path),
            },
            None => self.fs.exists(path),
        };
        self.exists
            .write()
            .unwrap_or_else(|poison| poison.into_inner())
            .insert(path.to_string(), answer);
        answer
    }

    /// Cached directory check; missing paths are never asked about.
    pub fn is_dir(&self, path: &str) -> bool {
        let known = self
            .dirs
            .read()
            .unwrap_or_else(|poison| poison.into_inner())
            .get(path)
            .copied();
        if let Some(known) = known {
            return known;
        }
        let answer = self.exists(path) && self.fs.is_dir(path);
        self.dirs
            .write()
            .unwrap_or_else(|poison| poison.into_inner())
            .insert(path.to_string(), answer);
        answer
    }

    /// Cached directory listing; empty for missing directories.
    pub fn list(&self, dir: &str) -> Arc<Vec<String>> {
        if let Some(entries) = self.cached_listing(dir) {
            return entries;
        }
        let entries = if self.exists(dir) {
            Arc::new(self.fs.list(dir))
        } else {
            Arc::new(Vec::new())
        };
        self.listings
            .write()
            .unwrap_or_else(|poison| poison.into_inner())
            .insert(dir.to_string(), Arc::clone(&entries));
        entries
    }

    /// Number of distinct paths with a cached existence answer.
    pub fn cached_paths(&self) -> usize {
        self.exists
            .read()
            .unwrap_or_else(|poison| poison.into_inner())
            .len()
    }

    fn cached(&self, path: &str) -> Option<bool> {
        self.exists
            .read()
            .unwrap_or_else(|poison| poison.into_inner())
            .get(path)
            .copied()
    }

    fn cached_listing(&self, dir: &str) -> Option<Arc<Vec<String>>> {
        self.listings
            .read()
            .unwrap_or_else(|poison| poison.into_inner())
            .get(dir)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_probe::MemoryFileSystem;
    use anyhow::Result;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts probes that reach the backing filesystem.
    struct CountingFs {
        inner: MemoryFileSystem,
        probes: AtomicUsize,
        dir_probes: AtomicUsize,
    }

    impl CountingFs {
        fn new(inner: MemoryFileSystem) -> Arc<Self> {
            Arc::new(Self {
                inner,
                probes: AtomicUsize::new(0),
                dir_probes: AtomicUsize::new(0),
            })
        }
    }

    impl FileSystemProbe for CountingFs {
        fn exists(&self, path: &str) -> bool {
            self.probes.fetch_add(1, Ordering::SeqCst);
            self.inner.exists(path)
        }

        fn is_dir(&self, path: &str) -> bool {
            self.dir_probes.fetch_add(1, Ordering::SeqCst);
            self.inner.is_dir(path)
        }

        fn list(&self, dir: &str) -> Vec<String> {
            self.inner.list(dir)
        }

        fn read_lines(&self, path: &str) -> Result<Vec<String>> {
            self.inner.read_lines(path)
        }

        fn read_bytes(&self, path: &str) -> Result<Vec<u8>> {
            self.inner.read_bytes(path)
        }

        fn canonicalize(&self, path: &str) -> Option<String> {
            self.inner.canonicalize(path)
        }
    }

    #[test]
    fn missing_parent_short_circuits_children() {
        let fs = CountingFs::new(MemoryFileSystem::new().with_file("/proj/a.c", ""));
        let cache = ProbeCache::new(fs.clone());

        assert!(!cache.exists("/gone/x/y.c"));
        let after_first = fs.probes.load(Ordering::SeqCst);
        assert!(!cache.exists("/gone/x/z.c"));
        assert!(!cache.exists("/gone/other"));
        assert_eq!(fs.probes.load(Ordering::SeqCst), after_first);
    }

    #[test]
    fn answers_are_memoized() {
        let fs = CountingFs::new(MemoryFileSystem::new().with_file("/proj/a.c", ""));
        let cache = ProbeCache::new(fs.clone());
        assert!(cache.exists("/proj/a.c"));
        let probes = fs.probes.load(Ordering::SeqCst);
        assert!(cache.exists("/proj/a.c"));
        assert_eq!(fs.probes.load(Ordering::SeqCst), probes);
    }

    #[test]
    fn listing_answers_child_existence() {
        let fs = CountingFs::new(
            MemoryFileSystem::new()
                .with_file("/proj/a.c", "")
                .with_file("/proj/b.c", ""),
        );
        let cache = ProbeCache::new(fs.clone());
        assert_eq!(cache.list("/proj").as_slice(), ["a.c", "b.c"]);
        let probes = fs.probes.load(Ordering::SeqCst);
        assert!(cache.exists("/proj/b.c"));
        assert!(!cache.exists("/proj/c.c"));
        assert_eq!(fs.probes.load(Ordering::SeqCst), probes);
        assert!(cache.list("/nowhere").is_empty());
    }

    #[test]
    fn directory_checks_are_memoized() {
        let fs = CountingFs::new(MemoryFileSystem::new().with_file("/proj/src/a.c", ""));
        let cache = ProbeCache::new(fs.clone());
        assert!(cache.is_dir("/proj/src"));
        assert!(cache.is_dir("/proj/src"));
        assert!(!cache.is_dir("/proj/src/a.c"));
        assert_eq!(fs.dir_probes.load(Ordering::SeqCst), 2);
        assert!(!cache.is_dir("/gone/dir"));
        assert_eq!(fs.dir_probes.load(Ordering::SeqCst), 2);
    }
}
