//! Working-directory tracking over build transcripts.
//!
//! Recursive make prints "Entering directory"/"Leaving directory" messages,
//! tagged with a nesting level, around the commands it runs. The tracker
//! replays those messages (and weaker hints such as `cd` fragments) to know
//! which directory every compile command ran in. Unrecognized or
//! contradictory lines never fail; the previous state is kept.
use regex::Regex;
use std::collections::BTreeMap;

use crate::paths;
use crate::relocation::probe_cache::ProbeCache;

const CURRENT_DIRECTORY_MARKERS: &[&str] = &["Current working directory", "Working directory:"];
const ENTERING_MARKER: &str = "Entering directory";
const LEAVING_MARKER: &str = "Leaving directory";

#[derive(Debug, Clone, Default)]
pub struct TrackerOptions {
    pub windows_target: bool,
    pub net_host_rewrite: bool,
    /// Only accept directories that exist on the probed filesystem. Off for
    /// foreign transcripts whose paths are relocated afterwards.
    pub verify_existence: bool,
    /// Analysis root; supplies a drive letter and the net-host prefix.
    pub root: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct EnteredDirectory {
    dir: String,
    /// Current directory at the moment this one was entered.
    previous: Option<String>,
}

/// Mutable state threaded through one transcript.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkingDirectoryState {
    current: Option<String>,
    base: Option<String>,
    levels: BTreeMap<usize, Vec<EnteredDirectory>>,
    last_level: Option<usize>,
    fallback_entered: bool,
}

impl WorkingDirectoryState {
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Directory last set by an unambiguous enter/leave message.
    pub fn base(&self) -> Option<&str> {
        self.base.as_deref()
    }

    /// Directories currently entered at `level`, innermost last.
    pub fn entered_at(&self, level: usize) -> Vec<&str> {
        self.levels
            .get(&level)
            .map(|stack| stack.iter().map(|entry| entry.dir.as_str()).collect())
            .unwrap_or_default()
    }

    fn push(&mut self, level: usize, dir: String) {
        let previous = self.current.clone();
        self.levels
            .entry(level)
            .or_default()
            .push(EnteredDirectory { dir: dir.clone(), previous });
        self.base = Some(dir.clone());
        self.current = Some(dir);
    }

    /// Pop `dir` at `level`; no-op when it was never entered there.
    fn pop(&mut self, level: usize, dir: &str) -> bool {
        let Some(stack) = self.levels.get_mut(&level) else {
            return false;
        };
        let Some(position) = stack.iter().rposition(|entry| entry.dir == dir) else {
            return false;
        };
        let popped = stack.remove(position);
        if stack.is_empty() {
            self.levels.remove(&level);
        }

        let below = self
            .levels
            .range(..level)
            .rev()
            .find(|(_, stack)| !stack.is_empty())
            .map(|(_, stack)| stack);
        let next = match below {
            Some(stack) if stack.len() == 1 => Some(stack[0].dir.clone()),
            // Parallel siblings below; no way to tell which one resumes.
            Some(_) => return true,
            None => popped.previous,
        };
        if let Some(next) = next {
            self.base = Some(next.clone());
            self.current = Some(next);
        }
        true
    }
}

/// Result of offering one command to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEffect {
    /// Not a directory message; the caller may look for a compiler.
    Ignored,
    /// A directory message, whether or not it changed the state.
    Consumed,
}

pub struct DirectoryTracker<'a> {
    probe: &'a ProbeCache,
    options: TrackerOptions,
    state: WorkingDirectoryState,
    make_message: Regex,
    level_tag: Regex,
}

impl<'a> DirectoryTracker<'a> {
    pub fn new(probe: &'a ProbeCache, options: TrackerOptions, initial: Option<&str>) -> Self {
        let state = WorkingDirectoryState {
            current: initial.map(paths::normalize),
            base: initial.map(paths::normalize),
            ..WorkingDirectoryState::default()
        };
        Self {
            probe,
            options,
            state,
            make_message: Regex::new(
                r#"^\S*make(?:\.exe)?(?:\[(\d+)\])?:\s.*?[`'‘"]([^`'‘’"]+)['’"]\s*\.?\s*$"#,
            )
            .expect("regex for make directory messages"),
            level_tag: Regex::new(r"\[(\d+)\]").expect("regex for make level tag"),
        }
    }

    pub fn current(&self) -> Option<&str> {
        self.state.current()
    }

    pub fn state(&self) -> &WorkingDirectoryState {
        &self.state
    }

    /// Feed one command fragment; the first matching rule wins.
    pub fn process(&mut self, command: &str) -> LineEffect {
        let line = command.trim();
        if line.is_empty() {
            return LineEffect::Ignored;
        }

        for marker in CURRENT_DIRECTORY_MARKERS {
            if let Some(rest) = line.strip_prefix(marker) {
                let target = rest.trim_start().trim_start_matches(':').trim();
                if let Some(dir) = self.candidate(unquote(target)) {
                    self.state.current = Some(dir);
                }
                return LineEffect::Consumed;
            }
        }

        if let Some(idx) = line.find(ENTERING_MARKER) {
            let level = self.level_before(&line[..idx]);
            if let Some(dir) = quoted_path(&line[idx + ENTERING_MARKER.len()..]) {
                self.enter(level, dir);
            }
            return LineEffect::Consumed;
        }

        if let Some(idx) = line.find(LEAVING_MARKER) {
            let level = self.level_before(&line[..idx]);
            if let Some(dir) = quoted_path(&line[idx + LEAVING_MARKER.len()..]) {
                self.leave(level, dir);
            }
            return LineEffect::Consumed;
        }

        if let Some(rest) = line.strip_prefix("cd ") {
            let target = unquote(rest.trim());
            if needs_interpretation(target) {
                return LineEffect::Ignored;
            }
            if let Some(dir) = self.accept(target) {
                self.state.current = Some(dir);
            }
            return LineEffect::Consumed;
        }

        if paths::is_absolute(line) && !line.contains(char::is_whitespace) {
            if let Some(dir) = self.accept(line) {
                let announced = if self.options.verify_existence {
                    self.probe.is_dir(&dir)
                } else {
                    !names_a_file(&dir)
                };
                if announced {
                    self.state.current = Some(dir);
                    return LineEffect::Consumed;
                }
            }
            return LineEffect::Ignored;
        }

        if let Some(captures) = self.make_message.captures(line) {
            let level = captures
                .get(1)
                .and_then(|level| level.as_str().parse().ok())
                .unwrap_or(0);
            let dir = captures.get(2).map(|dir| dir.as_str()).unwrap_or_default();
            // Translated or abbreviated messages: guess the direction from
            // the nesting level.
            let entering = match self.state.last_level {
                Some(last) if level > last => true,
                Some(last) if level == last => !self.state.fallback_entered,
                Some(_) => false,
                None => true,
            };
            if entering {
                self.enter(level, dir);
            } else {
                self.leave(level, dir);
            }
            self.state.fallback_entered = entering;
            return LineEffect::Consumed;
        }

        LineEffect::Ignored
    }

    /// Record entering `raw` at `level` when it resolves to a directory.
    pub fn enter(&mut self, level: usize, raw: &str) -> bool {
        self.state.last_level = Some(level);
        match self.accept(raw) {
            Some(dir) => {
                self.state.push(level, dir);
                true
            }
            None => false,
        }
    }

    /// Record leaving `raw` at `level`; unmatched leaves change nothing.
    pub fn leave(&mut self, level: usize, raw: &str) -> bool {
        self.state.last_level = Some(level);
        let Some(dir) = self.accept(raw) else {
            return false;
        };
        let popped = self.state.pop(level, &dir);
        if !popped {
            tracing::debug!(level, dir = %dir, "leaving a directory that was never entered");
        }
        popped
    }

    fn level_before(&self, prefix: &str) -> usize {
        self.level_tag
            .captures_iter(prefix)
            .last()
            .and_then(|captures| captures.get(1))
            .and_then(|level| level.as_str().parse().ok())
            .unwrap_or(0)
    }

    /// Normalize a directory candidate and confirm it exists.
    fn accept(&self, raw: &str) -> Option<String> {
        let candidate = self.candidate(raw)?;
        if !self.options.verify_existence || self.probe.exists(&candidate) {
            return Some(candidate);
        }
        if self.options.net_host_rewrite {
            let root = self.options.root.as_deref().unwrap_or("");
            if let Some(rewritten) = paths::net_host_variant(&candidate, root) {
                if self.probe.exists(&rewritten) {
                    return Some(rewritten);
                }
            }
        }
        None
    }

    /// Absolute, normalized form of `raw` against the current directory.
    fn candidate(&self, raw: &str) -> Option<String> {
        if raw.is_empty() {
            return None;
        }
        let mut candidate = paths::to_forward_slashes(raw);
        if self.options.windows_target {
            if let Some(converted) = paths::convert_cygwin(&candidate) {
                candidate = converted;
            } else if let Some(drive_form) = paths::mingw_drive_candidate(&candidate)
                .filter(|drive_form| self.probe.exists(drive_form))
            {
                candidate = drive_form;
            } else if let Some(root) = self.options.root.as_deref() {
                if let Some(with_drive) = paths::attach_root_drive(&candidate, root) {
                    candidate = with_drive;
                }
            }
        }
        let candidate = match self.state.current() {
            Some(current) => paths::join(current, &candidate),
            None => paths::normalize(&candidate),
        };
        paths::is_absolute(&candidate).then_some(candidate)
    }
}

/// Path between the first opening quote and the last closing quote.
fn quoted_path(text: &str) -> Option<&str> {
    let start = text.find(['\'', '`', '"', '‘'])?;
    let open_len = text[start..].chars().next()?.len_utf8();
    let rest = &text[start + open_len..];
    let end = rest.rfind(['\'', '"', '’'])?;
    let path = rest[..end].trim();
    (!path.is_empty()).then_some(path)
}

/// Paths shaped like a script, a source file or an installed program.
///
/// Used when directories cannot be checked on disk.
fn names_a_file(path: &str) -> bool {
    let has_extension = paths::extension(path)
        .is_some_and(|ext| ext.starts_with(|ch: char| ch.is_ascii_alphabetic()));
    let installed_program = paths::parent(path)
        .map(paths::file_name)
        .is_some_and(|dir| matches!(dir, "bin" | "sbin" | "libexec"));
    has_extension || installed_program
}

fn unquote(text: &str) -> &str {
    text.trim_matches(|ch| ch == '"' || ch == '\'')
}

/// `cd` targets with variables, globs or further commands are not paths yet.
fn needs_interpretation(target: &str) -> bool {
    target.is_empty()
        || target.contains(char::is_whitespace)
        || target.contains(['$', '`', '*', '?', '(', ')', '|', '&', '<', '>'])
        || target == "-"
}

#[cfg(test)]
#[path = "tracker_tests.rs"]
mod tests;
