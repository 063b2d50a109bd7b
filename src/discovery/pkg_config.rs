//! `pkg-config --cflags` lookups for backtick expansion in transcripts.
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use crate::fs_probe::FileSystemProbe;
use crate::paths;

/// Answers `pkg-config --cflags <package>`.
pub trait PackageConfig: Send + Sync {
    /// Compiler flags for `package`, or `None` when it is unknown.
    fn cflags(&self, package: &str) -> Option<Vec<String>>;
}

/// Lookup that knows no packages; backticks expand to nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPackageConfig;

impl PackageConfig for NoPackageConfig {
    fn cflags(&self, _package: &str) -> Option<Vec<String>> {
        None
    }
}

/// Reads `<package>.pc` files from a search path through a filesystem probe.
pub struct PkgConfigFiles {
    fs: Arc<dyn FileSystemProbe>,
    search_path: Vec<String>,
    cache: Mutex<HashMap<String, Option<Vec<String>>>>,
}

const MAX_REQUIRES_DEPTH: usize = 8;

impl PkgConfigFiles {
    pub fn new(fs: Arc<dyn FileSystemProbe>, search_path: Vec<String>) -> Self {
        Self {
            fs,
            search_path,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn find(&self, package: &str) -> Option<String> {
        self.search_path
            .iter()
            .map(|dir| paths::join(dir, &format!("{package}.pc")))
            .find(|candidate| self.fs.exists(candidate))
    }

    fn collect(
        &self,
        package: &str,
        depth: usize,
        seen: &mut BTreeSet<String>,
    ) -> Option<Vec<String>> {
        if depth > MAX_REQUIRES_DEPTH || !seen.insert(package.to_string()) {
            return Some(Vec::new());
        }
        let file = self.find(package)?;
        let lines = match self.fs.read_lines(&file) {
            Ok(lines) => lines,
            Err(err) => {
                tracing::debug!(package, error = %err, "unreadable pkg-config file");
                return None;
            }
        };
        let parsed = parse_pc(&lines);
        let mut flags = Vec::new();
        for required in parsed.requires {
            if let Some(more) = self.collect(&required, depth + 1, seen) {
                flags.extend(more);
            }
        }
        flags.extend(parsed.cflags);
        Some(flags)
    }
}

impl PackageConfig for PkgConfigFiles {
    fn cflags(&self, package: &str) -> Option<Vec<String>> {
        if let Some(hit) = self
            .cache
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .get(package)
        {
            return hit.clone();
        }
        let flags = self.collect(package, 0, &mut BTreeSet::new());
        self.cache
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .insert(package.to_string(), flags.clone());
        flags
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct PcFile {
    cflags: Vec<String>,
    requires: Vec<String>,
}

fn parse_pc(lines: &[String]) -> PcFile {
    let mut vars: BTreeMap<String, String> = BTreeMap::new();
    let mut pc = PcFile::default();
    for line in lines {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            if !key.contains('=') {
                let value = substitute(value.trim(), &vars);
                match key.trim() {
                    "Cflags" | "CFlags" => {
                        pc.cflags = shell_words::split(&value).unwrap_or_else(|_| {
                            value.split_whitespace().map(str::to_string).collect()
                        });
                    }
                    "Requires" => pc.requires = required_packages(&value),
                    _ => {}
                }
                continue;
            }
        }
        if let Some((name, value)) = line.split_once('=') {
            let value = substitute(value.trim(), &vars);
            vars.insert(name.trim().to_string(), value);
        }
    }
    pc
}

/// Expand `${name}` references using earlier variable definitions.
fn substitute(value: &str, vars: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let Some(end) = rest[start..].find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let name = &rest[start + 2..start + end];
        out.push_str(vars.get(name).map(String::as_str).unwrap_or(""));
        rest = &rest[start + end + 1..];
    }
    out.push_str(rest);
    out
}

/// Package names of a `Requires:` value, version constraints dropped.
fn required_packages(value: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut skip_next = false;
    for token in value.split(|ch: char| ch == ',' || ch.is_whitespace()) {
        if token.is_empty() {
            continue;
        }
        if skip_next {
            skip_next = false;
            continue;
        }
        if matches!(token, "=" | "<" | ">" | "<=" | ">=" | "!=") {
            skip_next = true;
            continue;
        }
        names.push(token.to_string());
    }
    names
}
