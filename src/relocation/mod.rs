//! Relocation of build-time paths onto the analysis machine.
//!
//! A rule rewrites a recorded directory prefix (`from`) to a local one
//! (`to`). Rules are discovered by aligning path segments and probing the
//! local filesystem, and persisted next to the project with a checksum so
//! that a later run can trust them without re-probing.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use crate::cancel::CancelFlag;
use crate::fs_probe::FileSystemProbe;
use crate::paths;
use crate::util::sha256_hex;

pub mod index;
pub mod probe_cache;

use index::SubfolderIndex;
use probe_cache::ProbeCache;

/// Only this many leading segments may differ between a recorded path and
/// its local counterpart; deeper rewrites are too unreliable to guess.
pub const MAX_DIFFERING_SEGMENTS: usize = 3;

const CHECKSUM_PREFIX: &str = "# checksum=";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MapperEntry {
    pub from: String,
    pub to: String,
}

impl MapperEntry {
    pub fn new(from: &str, to: &str) -> Self {
        Self {
            from: paths::normalize(from),
            to: paths::normalize(to),
        }
    }

    /// Rewrite `path` when `from` matches it at a separator boundary.
    pub fn apply(&self, path: &str) -> Option<String> {
        if !paths::starts_with_dir(path, &self.from) {
            return None;
        }
        let rest = path[self.from.trim_end_matches('/').len()..].trim_start_matches('/');
        if rest.is_empty() {
            Some(self.to.clone())
        } else {
            Some(paths::join(&self.to, rest))
        }
    }

    pub fn is_identity(&self) -> bool {
        self.from == self.to
    }
}

/// Result of a rule lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub path: String,
    pub entry: MapperEntry,
}

/// Where the current rule set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingMode {
    /// No trusted rules; everything is discovered during this session.
    Automatic,
    /// Rules were loaded from a persisted file with a valid checksum.
    Trusted,
}

/// Outcome of reading a persisted rules file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleLoad {
    Missing,
    Stale,
    Trusted(Vec<MapperEntry>),
}

pub struct RelocatablePathMapper {
    probe: ProbeCache,
    entries: RwLock<Vec<MapperEntry>>,
    index: Mutex<Option<(String, Arc<SubfolderIndex>)>>,
    cancel: CancelFlag,
    index_max_depth: usize,
    mode: MappingMode,
    /// Rules taken from a trusted file.
    loaded: usize,
}

impl RelocatablePathMapper {
    pub fn new(fs: Arc<dyn FileSystemProbe>, cancel: CancelFlag) -> Self {
        Self {
            probe: ProbeCache::new(fs),
            entries: RwLock::new(Vec::new()),
            index: Mutex::new(None),
            cancel,
            index_max_depth: 12,
            mode: MappingMode::Automatic,
            loaded: 0,
        }
    }

    pub fn with_index_depth(mut self, depth: usize) -> Self {
        self.index_max_depth = depth;
        self
    }

    /// Seed the mapper from a persisted rules file.
    ///
    /// A missing file or a checksum mismatch leaves the mapper empty and in
    /// automatic mode.
    pub fn with_persisted_rules(mut self, rules_path: &Path) -> Result<Self> {
        match load_rules(rules_path)? {
            RuleLoad::Trusted(entries) => {
                tracing::info!(
                    rules = entries.len(),
                    path = %rules_path.display(),
                    "loaded path mappings"
                );
                for entry in entries {
                    self.add_entry(entry);
                }
                self.loaded = self.entries().len();
                self.mode = MappingMode::Trusted;
            }
            RuleLoad::Stale => {
                tracing::warn!(
                    path = %rules_path.display(),
                    "path mappings checksum mismatch; rediscovering"
                );
            }
            RuleLoad::Missing => {}
        }
        Ok(self)
    }

    pub fn mode(&self) -> MappingMode {
        self.mode
    }

    /// True once rules beyond the loaded ones have been discovered.
    pub fn has_new_rules(&self) -> bool {
        self.entries
            .read()
            .unwrap_or_else(|poison| poison.into_inner())
            .len()
            > self.loaded
    }

    pub fn probe(&self) -> &ProbeCache {
        &self.probe
    }

    /// Snapshot of the ordered rule list.
    pub fn entries(&self) -> Vec<MapperEntry> {
        self.entries
            .read()
            .unwrap_or_else(|poison| poison.into_inner())
            .clone()
    }

    /// Append a rule unless one with the same `from` exists.
    ///
    /// A rule is inserted ahead of any rule whose `from` is a prefix of its
    /// own, so first-match evaluation always picks the longest prefix.
    pub fn add_entry(&self, entry: MapperEntry) -> bool {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poison| poison.into_inner());
        if entries.iter().any(|existing| existing.from == entry.from) {
            return false;
        }
        let position = entries
            .iter()
            .position(|existing| paths::starts_with_dir(&entry.from, &existing.from))
            .unwrap_or(entries.len());
        tracing::debug!(from = %entry.from, to = %entry.to, "path mapping added");
        entries.insert(position, entry);
        true
    }

    /// Rewrite `path` with the first matching rule.
    pub fn get_path(&self, path: &str) -> Option<ResolvedPath> {
        let path = paths::normalize(path);
        let entries = self
            .entries
            .read()
            .unwrap_or_else(|poison| poison.into_inner());
        entries.iter().find_map(|entry| {
            entry.apply(&path).map(|mapped| ResolvedPath {
                path: mapped,
                entry: entry.clone(),
            })
        })
    }

    /// Try to synthesize a rule that makes `candidate` reachable under `root`.
    ///
    /// Leading segments of `candidate` are stripped one at a time (at most
    /// [`MAX_DIFFERING_SEGMENTS`]) and the remainder is grafted onto ever
    /// shorter prefixes of `root`; the first rewritten path that exists wins.
    pub fn discover(&self, root: &str, candidate: &str) -> bool {
        let candidate = paths::normalize(candidate);
        let root = paths::normalize(root);
        if self.get_path(&candidate).is_some() {
            return true;
        }
        let cand_segs = paths::segments(&candidate);
        let root_segs = paths::segments(&root);
        let cand_drive = paths::drive(&candidate);
        let root_drive = paths::drive(&root);
        let max_strip = MAX_DIFFERING_SEGMENTS.min(cand_segs.len().saturating_sub(1));

        for strip in 1..=max_strip {
            if self.cancel.is_cancelled() {
                return false;
            }
            let tail = &cand_segs[strip..];
            for keep in (0..=root_segs.len()).rev() {
                let mut local_segs = root_segs[..keep].to_vec();
                local_segs.extend_from_slice(tail);
                let local = paths::from_segments(root_drive, &local_segs);
                if local == candidate || !self.probe.exists(&local) {
                    continue;
                }

                // Grow both prefixes over segments they still agree on.
                let (mut from_len, mut to_len) = (strip, keep);
                while to_len < root_segs.len()
                    && from_len + 1 < cand_segs.len()
                    && cand_segs[from_len] == root_segs[to_len]
                {
                    from_len += 1;
                    to_len += 1;
                }
                let from = paths::from_segments(cand_drive, &cand_segs[..from_len]);
                let to = paths::from_segments(root_drive, &root_segs[..to_len]);
                let entry = if self.contents_disjoint(&from, &to) {
                    tracing::debug!(%from, %to, "mapping target shares no entries; using identity");
                    MapperEntry::new(&candidate, &candidate)
                } else {
                    MapperEntry::new(&from, &to)
                };
                self.add_entry(entry);
                return true;
            }
        }
        false
    }

    /// Local spelling of a recorded path, or `None` to keep it as recorded.
    ///
    /// Tries existing rules, then the path itself, then [`Self::discover`],
    /// and finally the subfolder index of `root`.
    pub fn resolve(&self, root: &str, path: &str) -> Option<String> {
        if let Some(resolved) = self.get_path(path) {
            return Some(resolved.path);
        }
        let normalized = paths::normalize(path);
        if !paths::is_absolute(&normalized) || self.probe.exists(&normalized) {
            return None;
        }
        if self.discover(root, &normalized) || self.discover_from_index(root, &normalized) {
            return self.get_path(&normalized).map(|resolved| resolved.path);
        }
        None
    }

    /// Synthesize a rule from the subfolder index of `root`.
    pub fn discover_from_index(&self, root: &str, path: &str) -> bool {
        let dir = match paths::extension(path) {
            Some(_) => paths::parent(path).unwrap_or(path),
            None => path,
        };
        let index = self.index_for(root);
        let Some((local, matched)) = index.best_match(dir) else {
            return false;
        };
        let dir_segs = paths::segments(dir);
        let local_segs = paths::segments(&local);
        if matched == 0 || matched >= dir_segs.len() || matched > local_segs.len() {
            return false;
        }
        let from = paths::from_segments(paths::drive(dir), &dir_segs[..dir_segs.len() - matched]);
        let to = paths::from_segments(
            paths::drive(&local),
            &local_segs[..local_segs.len() - matched],
        );
        self.add_entry(MapperEntry::new(&from, &to));
        true
    }

    fn index_for(&self, root: &str) -> Arc<SubfolderIndex> {
        let mut slot = self.index.lock().unwrap_or_else(|poison| poison.into_inner());
        if let Some((indexed_root, index)) = slot.as_ref() {
            if indexed_root == root {
                return Arc::clone(index);
            }
        }
        let index = Arc::new(SubfolderIndex::build(
            &self.probe,
            root,
            self.index_max_depth,
            &self.cancel,
        ));
        tracing::debug!(
            root,
            dirs = index.len(),
            complete = index.is_complete(),
            "subfolder index built"
        );
        *slot = Some((root.to_string(), Arc::clone(&index)));
        index
    }

    /// True when both directories list entries but none of them in common.
    fn contents_disjoint(&self, from: &str, to: &str) -> bool {
        let source = self.probe.list(from);
        let target = self.probe.list(to);
        if source.is_empty() || target.is_empty() {
            return false;
        }
        !source.iter().any(|name| target.contains(name))
    }

    /// Write the current rules with their checksum.
    pub fn persist(&self, rules_path: &Path) -> Result<()> {
        save_rules(rules_path, &self.entries())
    }
}

fn serialize_rules(entries: &[MapperEntry]) -> String {
    let mut text = String::new();
    for entry in entries {
        text.push_str(&entry.from);
        text.push('=');
        text.push_str(&entry.to);
        text.push('\n');
    }
    text
}

pub fn rules_checksum(entries: &[MapperEntry]) -> String {
    sha256_hex(serialize_rules(entries).as_bytes())
}

/// Render a rules file: checksum comment followed by `from=to` lines.
pub fn render_rules_file(entries: &[MapperEntry]) -> String {
    format!(
        "{CHECKSUM_PREFIX}{}\n{}",
        rules_checksum(entries),
        serialize_rules(entries)
    )
}

/// Parse a rules file; `None` when the checksum is absent or wrong.
pub fn parse_rules_file(text: &str) -> Option<Vec<MapperEntry>> {
    let mut lines = text.lines();
    let checksum = lines.next()?.trim().strip_prefix(CHECKSUM_PREFIX)?.trim();
    let entries: Vec<MapperEntry> = lines
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(from, to)| MapperEntry::new(from, to))
        .collect();
    (rules_checksum(&entries) == checksum).then_some(entries)
}

pub fn load_rules(rules_path: &Path) -> Result<RuleLoad> {
    if !rules_path.is_file() {
        return Ok(RuleLoad::Missing);
    }
    let text = fs::read_to_string(rules_path)
        .with_context(|| format!("read path mappings {}", rules_path.display()))?;
    Ok(match parse_rules_file(&text) {
        Some(entries) => RuleLoad::Trusted(entries),
        None => RuleLoad::Stale,
    })
}

pub fn save_rules(rules_path: &Path, entries: &[MapperEntry]) -> Result<()> {
    if let Some(parent) = rules_path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(rules_path, render_rules_file(entries))
        .with_context(|| format!("write {}", rules_path.display()))?;
    Ok(())
}

#[cfg(test)]
#[path = "mapper_tests.rs"]
mod tests;
