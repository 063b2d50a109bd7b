//! Compiler command-line artifacts.
//!
//! The mining engine only orchestrates [`ArtifactExtractor`] calls; flag
//! semantics live behind that trait. [`GccArtifactExtractor`] covers GCC,
//! Clang and compatible drivers.
use std::collections::BTreeMap;

use crate::paths;
use crate::record::{Language, LanguageStandard};

/// Structured result of parsing one compiler invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Artifacts {
    pub inputs: Vec<String>,
    pub output: Option<String>,
    pub user_includes: Vec<String>,
    pub system_includes: Vec<String>,
    pub user_files: Vec<String>,
    /// Final macro state after applying `-D`/`-U` in command-line order.
    pub user_macros: BTreeMap<String, Option<String>>,
    pub undefined_macros: Vec<String>,
    /// Values of `-x` flags, in order.
    pub language_tags: Vec<String>,
    pub important_flags: Vec<String>,
    pub language_standard: LanguageStandard,
    /// True when the invocation stops before linking (`-c`, `-S`, `-E`).
    pub compile_only: bool,
}

impl Artifacts {
    /// Language forced by the last `-x` flag, if any.
    pub fn forced_language(&self) -> Option<Language> {
        self.language_tags
            .last()
            .map(|tag| Language::from_driver_tag(tag))
            .filter(|language| *language != Language::Unknown)
    }

    fn define(&mut self, body: &str) {
        match body.split_once('=') {
            Some((name, value)) => self.define_value(name, Some(unquote(value).to_string())),
            None => self.define_value(body, None),
        }
    }

    /// Define `name`, cancelling any earlier undefine of it.
    pub fn define_value(&mut self, name: &str, value: Option<String>) {
        if name.is_empty() {
            return;
        }
        self.undefined_macros.retain(|undefined| undefined != name);
        self.user_macros.insert(name.to_string(), value);
    }

    /// Undefine `name`, cancelling any earlier define of it.
    pub fn undefine(&mut self, name: &str) {
        if name.is_empty() {
            return;
        }
        self.user_macros.remove(name);
        self.undefined_macros.retain(|undefined| undefined != name);
        self.undefined_macros.push(name.to_string());
    }
}

/// Turns one compiler invocation into [`Artifacts`].
pub trait ArtifactExtractor: Send + Sync {
    /// `tokens[0]` is the compiler itself.
    fn extract(&self, tokens: &[String], is_cpp: bool) -> Artifacts;

    fn tokenize(&self, line: &str) -> Vec<String> {
        shell_words::split(line)
            .unwrap_or_else(|_| line.split_whitespace().map(str::to_string).collect())
    }

    fn extract_line(&self, line: &str, is_cpp: bool) -> Artifacts {
        let tokens = self.tokenize(line);
        self.extract(&tokens, is_cpp)
    }
}

/// Extractor for GCC-compatible driver flags.
#[derive(Debug, Default, Clone, Copy)]
pub struct GccArtifactExtractor;

/// Flags whose value is the following token when not attached.
const FLAGS_WITH_ARGUMENT: &[&str] = &[
    "-o", "-x", "-MF", "-MT", "-MQ", "-Xlinker", "-Xassembler", "-Xpreprocessor", "-L", "-l",
    "-arch", "-target", "-imultilib", "-iprefix", "-iwithprefix", "-isysroot", "--sysroot",
    "-aux-info", "-u", "-T", "-z",
];

const SOURCE_EXTENSIONS: &[&str] = &[
    "c", "i", "C", "cc", "cpp", "cxx", "c++", "cp", "CPP", "ii", "ixx", "f", "F", "for", "FOR",
    "f77", "F77", "f90", "F90", "f95", "F95", "f03", "F03", "f08", "F08", "fpp", "FPP", "ftn", "s",
    "S", "sx",
];

impl ArtifactExtractor for GccArtifactExtractor {
    fn extract(&self, tokens: &[String], is_cpp: bool) -> Artifacts {
        let mut artifacts = Artifacts::default();
        let mut idx = 1;
        while idx < tokens.len() {
            let token = tokens[idx].as_str();
            let next = tokens.get(idx + 1).map(String::as_str);
            let consumed_next = handle_flag(&mut artifacts, token, next, is_cpp);
            idx += if consumed_next { 2 } else { 1 };
        }
        artifacts
    }
}

/// Apply one token; returns true when it also consumed `next`.
fn handle_flag(artifacts: &mut Artifacts, token: &str, next: Option<&str>, is_cpp: bool) -> bool {
    match token {
        "-c" | "-S" | "-E" => {
            artifacts.compile_only = true;
            return false;
        }
        "-ansi" => {
            if !is_cpp {
                artifacts.language_standard = LanguageStandard::C89;
            }
            artifacts.important_flags.push(token.to_string());
            return false;
        }
        "-pthread" | "-fopenmp" | "-xopenmp" | "-fexceptions" | "-fno-exceptions" | "-fno-rtti"
        | "-fshort-wchar" | "-funsigned-char" | "-fsigned-char" | "-fPIC" | "-fpic" => {
            artifacts.important_flags.push(token.to_string());
            return false;
        }
        _ => {}
    }
    for prefix in ["-iquote", "-idirafter"] {
        if let Some((dir, consumed)) = take_value(token, next, prefix) {
            artifacts.user_includes.push(paths::to_forward_slashes(&dir));
            return consumed;
        }
    }
    if let Some((dir, consumed)) = take_value(token, next, "-isystem") {
        artifacts.system_includes.push(paths::to_forward_slashes(&dir));
        return consumed;
    }
    for prefix in ["-include", "-imacros"] {
        if let Some((file, consumed)) = take_value(token, next, prefix) {
            artifacts.user_files.push(paths::to_forward_slashes(&file));
            return consumed;
        }
    }
    if let Some((dir, consumed)) = take_value(token, next, "-I") {
        // `-I-` splits quote and bracket search paths; it is not a directory.
        if dir != "-" {
            artifacts.user_includes.push(paths::to_forward_slashes(&dir));
        }
        return consumed;
    }
    if let Some((body, consumed)) = take_value(token, next, "-D") {
        artifacts.define(&body);
        return consumed;
    }
    if let Some((name, consumed)) = take_value(token, next, "-U") {
        artifacts.undefine(&name);
        return consumed;
    }
    if let Some((output, consumed)) = take_value(token, next, "-o") {
        artifacts.output = Some(paths::to_forward_slashes(&output));
        return consumed;
    }
    if let Some(std) = token.strip_prefix("-std=") {
        artifacts.language_standard = LanguageStandard::from_std_flag(std);
        artifacts.important_flags.push(token.to_string());
        return false;
    }
    if let Some((tag, consumed)) = take_value(token, next, "-x") {
        // Sun-style -xc99=... flags share the prefix; only driver tags count.
        if consumed || Language::from_driver_tag(&tag) != Language::Unknown {
            artifacts.important_flags.push(format!("-x {tag}"));
            artifacts.language_tags.push(tag);
        }
        return consumed;
    }
    if token.starts_with("-m") {
        artifacts.important_flags.push(token.to_string());
        return false;
    }
    if token.starts_with('-') {
        return FLAGS_WITH_ARGUMENT.contains(&token) && next.is_some();
    }
    if is_source_file(token) {
        artifacts.inputs.push(paths::to_forward_slashes(token));
    }
    false
}

/// Value of a flag that accepts both `-Xvalue` and `-X value` forms.
fn take_value(token: &str, next: Option<&str>, flag: &str) -> Option<(String, bool)> {
    let rest = token.strip_prefix(flag)?;
    if rest.is_empty() {
        return next.map(|value| (value.to_string(), true));
    }
    Some((rest.to_string(), false))
}

pub fn is_source_file(path: &str) -> bool {
    paths::extension(path).is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
}

/// True for assembler inputs, which are not part of the code model.
pub fn is_assembler_file(path: &str) -> bool {
    matches!(paths::extension(path), Some("s" | "S" | "sx" | "asm"))
}

fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2
        && ((bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\''))
    {
        return &value[1..value.len() - 1];
    }
    value
}
