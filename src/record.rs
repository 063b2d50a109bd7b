//! Reconstructed compilation units.
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::interner::StringInterner;
use crate::line_store::CompileLineHandle;
use crate::paths;
use crate::relocation::RelocatablePathMapper;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    C,
    Cpp,
    Fortran,
    #[default]
    Unknown,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Fortran => "fortran",
            Language::Unknown => "unknown",
        }
    }

    /// Classify a source file by extension. `.C` and friends are C++.
    pub fn from_extension(ext: &str) -> Language {
        match ext {
            "c" | "i" => Language::C,
            "C" | "cc" | "cpp" | "cxx" | "c++" | "cp" | "CPP" | "ii" | "ixx" => Language::Cpp,
            "f" | "F" | "for" | "FOR" | "f77" | "F77" | "f90" | "F90" | "f95" | "F95" | "f03"
            | "F03" | "f08" | "F08" | "fpp" | "FPP" | "ftn" => Language::Fortran,
            _ => Language::Unknown,
        }
    }

    /// Language selected by a `-x <lang>` driver flag.
    pub fn from_driver_tag(tag: &str) -> Language {
        match tag {
            "c" | "c-header" | "cpp-output" => Language::C,
            "c++" | "c++-header" | "c++-cpp-output" => Language::Cpp,
            "f77" | "f77-cpp-input" | "f95" | "f95-cpp-input" => Language::Fortran,
            _ => Language::Unknown,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LanguageStandard {
    C89,
    C99,
    C11,
    C17,
    C23,
    Cpp98,
    Cpp11,
    Cpp14,
    Cpp17,
    Cpp20,
    Cpp23,
    F77,
    F90,
    F95,
    F2003,
    F2008,
    #[default]
    Unknown,
}

impl LanguageStandard {
    /// Parse the value of a `-std=` flag (`c99`, `gnu++17`, `f2008`, ...).
    pub fn from_std_flag(value: &str) -> LanguageStandard {
        let value = value.to_ascii_lowercase();
        // gnu99 -> c99, gnu++17 -> c++17
        let value = value
            .strip_prefix("gnu")
            .map(|rest| format!("c{rest}"))
            .unwrap_or(value);
        match value.as_str() {
            "c89" | "c90" | "iso9899:1990" | "iso9899:199409" | "ansi" => LanguageStandard::C89,
            "c99" | "c9x" | "iso9899:1999" => LanguageStandard::C99,
            "c11" | "c1x" | "iso9899:2011" => LanguageStandard::C11,
            "c17" | "c18" | "iso9899:2017" | "iso9899:2018" => LanguageStandard::C17,
            "c23" | "c2x" => LanguageStandard::C23,
            "c++98" | "c++03" => LanguageStandard::Cpp98,
            "c++11" | "c++0x" => LanguageStandard::Cpp11,
            "c++14" | "c++1y" => LanguageStandard::Cpp14,
            "c++17" | "c++1z" => LanguageStandard::Cpp17,
            "c++20" | "c++2a" => LanguageStandard::Cpp20,
            "c++23" | "c++2b" => LanguageStandard::Cpp23,
            "legacy" | "f77" => LanguageStandard::F77,
            "f90" => LanguageStandard::F90,
            "f95" => LanguageStandard::F95,
            "f2003" | "f03" => LanguageStandard::F2003,
            "f2008" | "f08" | "f2018" => LanguageStandard::F2008,
            _ => LanguageStandard::Unknown,
        }
    }

    /// Language a standard belongs to.
    pub fn language(&self) -> Language {
        match self {
            LanguageStandard::C89
            | LanguageStandard::C99
            | LanguageStandard::C11
            | LanguageStandard::C17
            | LanguageStandard::C23 => Language::C,
            LanguageStandard::Cpp98
            | LanguageStandard::Cpp11
            | LanguageStandard::Cpp14
            | LanguageStandard::Cpp17
            | LanguageStandard::Cpp20
            | LanguageStandard::Cpp23 => Language::Cpp,
            LanguageStandard::F77
            | LanguageStandard::F90
            | LanguageStandard::F95
            | LanguageStandard::F2003
            | LanguageStandard::F2008 => Language::Fortran,
            LanguageStandard::Unknown => Language::Unknown,
        }
    }

    /// Implied standard for a Fortran source extension.
    pub fn from_fortran_extension(ext: &str) -> LanguageStandard {
        match ext.to_ascii_lowercase().as_str() {
            "f" | "for" | "f77" | "ftn" | "fpp" => LanguageStandard::F77,
            "f90" => LanguageStandard::F90,
            "f95" => LanguageStandard::F95,
            "f03" => LanguageStandard::F2003,
            "f08" => LanguageStandard::F2008,
            _ => LanguageStandard::Unknown,
        }
    }
}

/// One reconstructed compilation unit.
///
/// Built once by a parser or the binary analyzer; afterwards the only
/// mutation is the relocation pass ([`SourceFileRecord::resolve_include_paths`]
/// and [`SourceFileRecord::reset_item_path`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFileRecord {
    pub compile_directory: Arc<str>,
    pub item_path: Arc<str>,
    pub item_name: String,
    pub language: Language,
    pub language_standard: LanguageStandard,
    /// Search order is significant and preserved as discovered.
    pub user_include_paths: Vec<Arc<str>>,
    pub system_include_paths: Vec<Arc<str>>,
    pub user_files: Vec<Arc<str>>,
    pub included_files: BTreeSet<String>,
    /// `None` values are macros defined without a value.
    pub user_macros: BTreeMap<String, Option<String>>,
    pub undefined_macros: Vec<String>,
    pub compiler_name: String,
    pub important_flags: String,
    pub compile_line: Option<CompileLineHandle>,
}

impl SourceFileRecord {
    /// Relocate the compile directory and both include lists in place.
    ///
    /// Paths the mapper cannot resolve keep their normalized recorded form.
    pub fn resolve_include_paths(
        &mut self,
        mapper: &RelocatablePathMapper,
        root: &str,
        interner: &StringInterner,
    ) {
        let relocate = |path: &Arc<str>| -> Arc<str> {
            match mapper.resolve(root, path) {
                Some(mapped) => interner.intern(&mapped),
                None => Arc::clone(path),
            }
        };
        self.compile_directory = relocate(&self.compile_directory);
        self.user_include_paths = self.user_include_paths.iter().map(&relocate).collect();
        self.system_include_paths = self.system_include_paths.iter().map(&relocate).collect();
        self.user_files = self.user_files.iter().map(&relocate).collect();
    }

    /// Relocate `item_path` and recompute `item_name` against the
    /// (possibly relocated) compile directory.
    pub fn reset_item_path(
        &mut self,
        mapper: &RelocatablePathMapper,
        root: &str,
        interner: &StringInterner,
    ) {
        if let Some(mapped) = mapper.resolve(root, &self.item_path) {
            self.item_path = interner.intern(&mapped);
        }
        self.item_name = item_name_for(&self.item_path, &self.compile_directory);
    }
}

/// Path of `item_path` relative to `compile_directory`, or the full path
/// when the file lives elsewhere.
pub fn item_name_for(item_path: &str, compile_directory: &str) -> String {
    paths::relative_to(item_path, compile_directory)
        .unwrap_or(item_path)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_classification() {
        assert_eq!(Language::from_extension("c"), Language::C);
        assert_eq!(Language::from_extension("C"), Language::Cpp);
        assert_eq!(Language::from_extension("cxx"), Language::Cpp);
        assert_eq!(Language::from_extension("f90"), Language::Fortran);
        assert_eq!(Language::from_extension("s"), Language::Unknown);
    }

    #[test]
    fn std_flag_parsing() {
        assert_eq!(LanguageStandard::from_std_flag("c99"), LanguageStandard::C99);
        assert_eq!(LanguageStandard::from_std_flag("gnu99"), LanguageStandard::C99);
        assert_eq!(LanguageStandard::from_std_flag("gnu++17"), LanguageStandard::Cpp17);
        assert_eq!(LanguageStandard::from_std_flag("c++2a"), LanguageStandard::Cpp20);
        assert_eq!(LanguageStandard::from_std_flag("f2008"), LanguageStandard::F2008);
        assert_eq!(LanguageStandard::from_std_flag("bogus"), LanguageStandard::Unknown);
        assert_eq!(LanguageStandard::Cpp14.language(), Language::Cpp);
    }

    #[test]
    fn item_name_is_relative_when_possible() {
        assert_eq!(item_name_for("/proj/sub/main.c", "/proj/sub"), "main.c");
        assert_eq!(item_name_for("/proj/sub/a/b.c", "/proj/sub"), "a/b.c");
        assert_eq!(item_name_for("/other/x.c", "/proj/sub"), "/other/x.c");
    }
}
