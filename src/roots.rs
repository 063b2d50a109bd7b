//! Project-root inference from scattered source directories.
//!
//! Directories are visited in lexicographic order and merged into a running
//! accumulator while they share at least [`MIN_COMMON_SEGMENTS`] leading
//! segments; the result is a set of disjoint candidates with summed counts.
use serde::Serialize;
use std::collections::BTreeMap;

use crate::paths;

/// Shortest common prefix (in segments, drive excluded) that still merges.
pub const MIN_COMMON_SEGMENTS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RootCandidate {
    pub path: String,
    pub count: usize,
}

#[derive(Debug, Default, Clone)]
pub struct CommonRootInferencer {
    counts: BTreeMap<String, usize>,
}

impl CommonRootInferencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, dir: &str) {
        self.add_weighted(dir, 1);
    }

    pub fn add_weighted(&mut self, dir: &str, count: usize) {
        if count == 0 {
            return;
        }
        *self.counts.entry(paths::normalize(dir)).or_default() += count;
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Single left-to-right merge over the sorted directories.
    pub fn candidates(&self) -> Vec<RootCandidate> {
        let mut result = Vec::new();
        let mut current: Option<RootCandidate> = None;
        for (dir, &count) in &self.counts {
            current = Some(match current.take() {
                None => RootCandidate { path: dir.clone(), count },
                Some(acc) => match common_prefix(&acc.path, dir) {
                    Some(prefix) => RootCandidate {
                        path: prefix,
                        count: acc.count + count,
                    },
                    None => {
                        result.push(acc);
                        RootCandidate { path: dir.clone(), count }
                    }
                },
            });
        }
        result.extend(current);
        result
    }

    /// Candidate with the highest count; the first one in order on ties.
    pub fn best(&self) -> Option<RootCandidate> {
        let mut best: Option<RootCandidate> = None;
        for candidate in self.candidates() {
            let better = match &best {
                Some(top) => candidate.count > top.count,
                None => true,
            };
            if better {
                best = Some(candidate);
            }
        }
        best
    }
}

/// Common leading segments of two paths, if deep enough to merge.
fn common_prefix(a: &str, b: &str) -> Option<String> {
    let drive = paths::drive(a);
    if drive.map(str::to_ascii_lowercase) != paths::drive(b).map(str::to_ascii_lowercase) {
        return None;
    }
    let shared: Vec<&str> = paths::segments(a)
        .into_iter()
        .zip(paths::segments(b))
        .take_while(|(left, right)| left == right)
        .map(|(left, _)| left)
        .collect();
    (shared.len() >= MIN_COMMON_SEGMENTS).then(|| paths::from_segments(drive, &shared))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_paths_sharing_two_segments() {
        let mut roots = CommonRootInferencer::new();
        roots.add("/home/me/proj/src");
        roots.add("/home/me/proj/lib");
        roots.add("/home/me/other");
        roots.add("/opt/vendor/include");
        assert_eq!(
            roots.candidates(),
            vec![
                RootCandidate { path: "/home/me".to_string(), count: 3 },
                RootCandidate { path: "/opt/vendor/include".to_string(), count: 1 },
            ]
        );
        assert_eq!(roots.best().map(|root| root.path).as_deref(), Some("/home/me"));
    }

    #[test]
    fn one_shared_segment_does_not_merge() {
        let mut roots = CommonRootInferencer::new();
        roots.add("/work/alpha/src");
        roots.add("/work/alpha/src");
        roots.add("/srv/beta");
        let candidates = roots.candidates();
        assert_eq!(candidates.len(), 2);
        assert_eq!(
            roots.best(),
            Some(RootCandidate { path: "/work/alpha/src".to_string(), count: 2 })
        );
    }

    #[test]
    fn ties_go_to_the_first_in_sorted_order() {
        let mut roots = CommonRootInferencer::new();
        roots.add("/b/x/y");
        roots.add("/a/x/y");
        assert_eq!(roots.best().map(|root| root.path).as_deref(), Some("/a/x/y"));
        assert!(CommonRootInferencer::new().best().is_none());
    }

    #[test]
    fn drives_never_merge_across() {
        let mut roots = CommonRootInferencer::new();
        roots.add("c:/work/proj/a");
        roots.add("d:/work/proj/b");
        assert_eq!(roots.candidates().len(), 2);
    }
}
