//! Discovery configuration.
//!
//! The config is a small JSON document; every field has a default so an
//! empty `{}` (or no file at all) is a valid configuration.
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::line_store::DEFAULT_MAX_LINE_BYTES;
use crate::record::Language;

pub const CONFIG_SCHEMA_VERSION: u32 = 1;
pub const DEFAULT_MAPPINGS_REL: &str = ".bprov/path-mappings.txt";

/// Compiler executable basenames recognized per language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerNames {
    pub c: Vec<String>,
    pub cpp: Vec<String>,
    pub fortran: Vec<String>,
}

impl Default for CompilerNames {
    fn default() -> Self {
        let names =
            |list: &[&str]| -> Vec<String> { list.iter().map(|name| name.to_string()).collect() };
        Self {
            c: names(&["cc", "gcc", "clang", "xgcc", "icc", "icx", "suncc", "tcc", "c89", "c99"]),
            cpp: names(&["c++", "g++", "clang++", "CC", "icpc", "icpx", "sunCC", "cl"]),
            fortran: names(&[
                "gfortran", "g77", "f77", "f90", "f95", "ifort", "ifx", "sunf77", "sunf90",
                "sunf95", "flang",
            ]),
        }
    }
}

impl CompilerNames {
    /// Language of a compiler basename (`.exe` already stripped).
    pub fn language_of(&self, tool: &str) -> Option<Language> {
        let hit = |list: &[String]| list.iter().any(|name| name == tool);
        if hit(&self.cpp) {
            Some(Language::Cpp)
        } else if hit(&self.c) {
            Some(Language::C)
        } else if hit(&self.fortran) {
            Some(Language::Fortran)
        } else {
            None
        }
    }

    /// Like [`Self::language_of`], but also sees through cross-compiler
    /// prefixes and version suffixes (`x86_64-linux-gnu-gcc-12`).
    pub fn classify(&self, tool: &str) -> Option<Language> {
        if let Some(language) = self.language_of(tool) {
            return Some(language);
        }
        let mut name = tool;
        while let Some((head, tail)) = name.rsplit_once('-') {
            if tail.is_empty() || !tail.chars().all(|ch| ch.is_ascii_digit() || ch == '.') {
                break;
            }
            name = head;
        }
        if let Some(language) = self.language_of(name) {
            return Some(language);
        }
        let (_, base) = name.rsplit_once('-')?;
        self.language_of(base)
    }

    /// Every name with its language, C++ first so `CC` is not read as C.
    pub fn all(&self) -> impl Iterator<Item = (&str, Language)> {
        self.cpp
            .iter()
            .map(|name| (name.as_str(), Language::Cpp))
            .chain(self.c.iter().map(|name| (name.as_str(), Language::C)))
            .chain(
                self.fortran
                    .iter()
                    .map(|name| (name.as_str(), Language::Fortran)),
            )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub schema_version: u32,
    pub compilers: CompilerNames,
    /// Accept `gcc.exe` spellings and MinGW `/c/...` drive paths.
    pub windows_target: bool,
    /// Replace recorded paths with their symlink-resolved form.
    pub resolve_symlinks: bool,
    /// Retry missing directories across an automounter `/net/<host>` prefix.
    pub net_host_rewrite: bool,
    /// Recorded paths come from another machine and go through relocation.
    pub relocate: bool,
    pub max_compile_line_bytes: usize,
    /// Project-relative location of persisted relocation rules.
    pub mappings_file: String,
    /// Directories searched for `<package>.pc` files.
    pub pkg_config_path: Vec<String>,
    pub index_max_depth: usize,
    /// Worker threads for binary analysis; 0 picks the available parallelism.
    pub worker_threads: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            schema_version: CONFIG_SCHEMA_VERSION,
            compilers: CompilerNames::default(),
            windows_target: cfg!(windows),
            resolve_symlinks: false,
            net_host_rewrite: true,
            relocate: false,
            max_compile_line_bytes: DEFAULT_MAX_LINE_BYTES,
            mappings_file: DEFAULT_MAPPINGS_REL.to_string(),
            pkg_config_path: vec![
                "/usr/lib/pkgconfig".to_string(),
                "/usr/share/pkgconfig".to_string(),
                "/usr/local/lib/pkgconfig".to_string(),
            ],
            index_max_depth: 12,
            worker_threads: 0,
        }
    }
}

/// Render a pretty JSON config stub with every default spelled out.
pub fn config_stub() -> Result<String> {
    serde_json::to_string_pretty(&DiscoveryConfig::default()).context("serialize config stub")
}

/// Default user-level config location (`<config dir>/bprov/config.json`).
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("bprov").join("config.json"))
}

/// Load a config from an explicit path, else the user config, else defaults.
pub fn load_config(path: Option<&Path>) -> Result<DiscoveryConfig> {
    let path = match path {
        Some(path) => Some(path.to_path_buf()),
        None => user_config_path().filter(|candidate| candidate.is_file()),
    };
    let Some(path) = path else {
        return Ok(DiscoveryConfig::default());
    };
    let bytes = fs::read(&path).with_context(|| format!("read config {}", path.display()))?;
    let config: DiscoveryConfig = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse config {}", path.display()))?;
    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &DiscoveryConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported config schema_version {} (expected {})",
            config.schema_version,
            CONFIG_SCHEMA_VERSION
        ));
    }
    let compilers = &config.compilers;
    if compilers.c.is_empty() && compilers.cpp.is_empty() && compilers.fortran.is_empty() {
        return Err(anyhow!("config lists no compiler names"));
    }
    if let Some(bad) = compilers
        .all()
        .find(|(name, _)| name.is_empty() || name.contains(char::is_whitespace))
    {
        return Err(anyhow!("invalid compiler name {:?}", bad.0));
    }
    if config.max_compile_line_bytes < 64 {
        return Err(anyhow!(
            "max_compile_line_bytes must be at least 64 (got {})",
            config.max_compile_line_bytes
        ));
    }
    if config.mappings_file.trim().is_empty() {
        return Err(anyhow!("mappings_file must not be empty"));
    }
    Ok(())
}
