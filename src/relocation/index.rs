//! Directory-name index over a local tree.
//!
//! Built lazily when rule lookup and discovery both fail; the walk checks
//! the cancel flag at every directory and keeps whatever it indexed so far.
use std::collections::{BTreeMap, VecDeque};

use crate::cancel::CancelFlag;
use crate::paths;

use super::probe_cache::ProbeCache;

#[derive(Debug, Default, Clone)]
pub struct SubfolderIndex {
    by_name: BTreeMap<String, Vec<String>>,
    complete: bool,
}

impl SubfolderIndex {
    /// Breadth-first walk of `root` down to `max_depth` levels.
    pub fn build(probe: &ProbeCache, root: &str, max_depth: usize, cancel: &CancelFlag) -> Self {
        let mut index = SubfolderIndex::default();
        let mut queue = VecDeque::from([(paths::normalize(root), 0usize)]);
        while let Some((dir, depth)) = queue.pop_front() {
            if cancel.is_cancelled() {
                tracing::debug!(root, indexed = index.len(), "subfolder index cancelled");
                return index;
            }
            if depth >= max_depth {
                continue;
            }
            for name in probe.list(&dir).iter() {
                if name.starts_with('.') {
                    continue;
                }
                let child = paths::join(&dir, name);
                if !probe.is_dir(&child) {
                    continue;
                }
                index
                    .by_name
                    .entry(name.clone())
                    .or_default()
                    .push(child.clone());
                queue.push_back((child, depth + 1));
            }
        }
        index.complete = true;
        index
    }

    /// False when the walk was cancelled before finishing.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn len(&self) -> usize {
        self.by_name.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Local directory best matching the trailing segments of `dir`.
    ///
    /// Candidates share `dir`'s last segment; the one agreeing on the most
    /// trailing segments wins. Ties are ambiguous and yield `None`. Returns
    /// the local directory and how many trailing segments matched.
    pub fn best_match(&self, dir: &str) -> Option<(String, usize)> {
        let wanted = paths::segments(dir);
        let last = *wanted.last()?;
        let candidates = self.by_name.get(last)?;
        let mut best: Option<(&String, usize)> = None;
        let mut tied = false;
        for candidate in candidates {
            let local = paths::segments(candidate);
            let score = wanted
                .iter()
                .rev()
                .zip(local.iter().rev())
                .take_while(|(a, b)| a == b)
                .count();
            match best {
                Some((_, top)) if score < top => {}
                Some((_, top)) if score == top => tied = true,
                _ => {
                    best = Some((candidate, score));
                    tied = false;
                }
            }
        }
        if tied {
            return None;
        }
        best.map(|(path, score)| (path.clone(), score))
    }
}
