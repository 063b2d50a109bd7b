//! Shared record construction for every evidence source.
//!
//! Parsers hand compiler invocations (or already extracted artifacts) to a
//! [`RecordBuilder`], which fixes up paths, classifies languages, drops
//! duplicates and keeps the compiler histogram and build-artifact list.
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use crate::artifacts::{is_assembler_file, Artifacts};
use crate::line_store::CompileLineHandle;
use crate::paths;
use crate::record::{item_name_for, Language, LanguageStandard, SourceFileRecord};

use super::{DiscoveryContext, DiscoveryResult};

/// Launchers that run the real compiler given as their first argument.
const COMPILER_WRAPPERS: &[&str] = &["ccache", "sccache", "distcc", "icecc", "buildcache"];

pub struct RecordBuilder<'a> {
    ctx: &'a DiscoveryContext,
    records: Vec<SourceFileRecord>,
    seen: HashSet<Arc<str>>,
    duplicates: usize,
    artifacts: Vec<String>,
    seen_artifacts: BTreeSet<String>,
    compilers: BTreeMap<Language, BTreeMap<String, usize>>,
    cancelled: bool,
}

impl<'a> RecordBuilder<'a> {
    pub fn new(ctx: &'a DiscoveryContext) -> Self {
        Self {
            ctx,
            records: Vec::new(),
            seen: HashSet::new(),
            duplicates: 0,
            artifacts: Vec::new(),
            seen_artifacts: BTreeSet::new(),
            compilers: BTreeMap::new(),
            cancelled: false,
        }
    }

    pub fn context(&self) -> &DiscoveryContext {
        self.ctx
    }

    pub fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    /// Recorded argv of some process; routes compilers, `ld` and `ar`.
    ///
    /// Returns the number of source records accepted.
    pub fn add_invocation(
        &mut self,
        compile_dir: &str,
        argv: &[String],
        line: Option<&str>,
    ) -> usize {
        let start = argv
            .iter()
            .position(|arg| !COMPILER_WRAPPERS.contains(&paths::tool_name(arg)))
            .unwrap_or(argv.len());
        let argv = &argv[start..];
        let Some(program) = argv.first() else {
            return 0;
        };
        let tool = paths::tool_name(program);
        match tool {
            "ld" | "ar" => {
                self.add_link_output(compile_dir, tool, argv);
                0
            }
            _ => match self.ctx.config.compilers.classify(tool) {
                Some(family) => {
                    let joined;
                    let line = match line {
                        Some(line) if start == 0 => line,
                        _ => {
                            joined = shell_words::join(argv);
                            joined.as_str()
                        }
                    };
                    self.add_command(compile_dir, tool, family, argv, line)
                }
                None => 0,
            },
        }
    }

    /// Traced process whose executable path is known.
    ///
    /// A compiler or linker executable names the tool even when argv[0] is
    /// an alias; the stored line keeps argv as recorded.
    pub fn add_traced_invocation(
        &mut self,
        compile_dir: &str,
        executable: &str,
        argv: &[String],
    ) -> usize {
        let program = paths::tool_name(executable);
        let names_tool = matches!(program, "ld" | "ar")
            || self.ctx.config.compilers.classify(program).is_some();
        let Some(first) = argv.first() else {
            return 0;
        };
        if !names_tool || paths::tool_name(first) == program {
            return self.add_invocation(compile_dir, argv, None);
        }
        let line = shell_words::join(argv);
        let mut renamed = argv.to_vec();
        renamed[0] = executable.to_string();
        self.add_invocation(compile_dir, &renamed, Some(&line))
    }

    /// Compilation database entry; `file` is appended when argv omits it.
    pub fn add_database_entry(
        &mut self,
        compile_dir: &str,
        argv: &[String],
        line: Option<&str>,
        file: Option<&str>,
    ) -> usize {
        let wanted = file.map(|file| paths::join(compile_dir, file));
        let missing = wanted.as_deref().is_some_and(|wanted| {
            !argv
                .iter()
                .skip(1)
                .any(|arg| paths::join(compile_dir, arg) == wanted)
        });
        match file {
            Some(file) if missing => {
                tracing::debug!(file, "source operand taken from the entry's file field");
                let mut argv = argv.to_vec();
                argv.push(file.to_string());
                self.add_invocation(compile_dir, &argv, None)
            }
            _ => self.add_invocation(compile_dir, argv, line),
        }
    }

    /// Tokenize and extract one compiler command line.
    pub fn add_command_line(
        &mut self,
        compile_dir: &str,
        tool: &str,
        family: Language,
        line: &str,
    ) -> usize {
        let tokens = self.ctx.extractor.tokenize(line);
        self.add_command(compile_dir, tool, family, &tokens, line)
    }

    /// Extract artifacts from `tokens` and record every source input.
    ///
    /// A linking invocation without sources contributes its output as a
    /// build artifact instead.
    pub fn add_command(
        &mut self,
        compile_dir: &str,
        tool: &str,
        family: Language,
        tokens: &[String],
        line: &str,
    ) -> usize {
        let artifacts = self.ctx.extractor.extract(tokens, family == Language::Cpp);
        if artifacts.inputs.is_empty() {
            if !artifacts.compile_only {
                if let Some(output) = artifacts.output.as_deref() {
                    self.add_build_artifact(compile_dir, output);
                }
            }
            return 0;
        }
        let handle = self.store_line(line);
        self.add_artifacts(compile_dir, tool, family, &artifacts, handle)
    }

    /// Record every input of already extracted `artifacts`.
    pub fn add_artifacts(
        &mut self,
        compile_dir: &str,
        tool: &str,
        family: Language,
        artifacts: &Artifacts,
        handle: Option<CompileLineHandle>,
    ) -> usize {
        let compile_dir = self.fix_path(compile_dir, None);
        let accepted = artifacts
            .inputs
            .iter()
            .filter(|input| self.add_source(&compile_dir, tool, family, input, artifacts, handle))
            .count();
        if accepted > 0 {
            *self
                .compilers
                .entry(family)
                .or_default()
                .entry(tool.to_string())
                .or_default() += 1;
        }
        accepted
    }

    pub fn add_build_artifact(&mut self, compile_dir: &str, path: &str) {
        let base = self.fix_path(compile_dir, None);
        let path = self.fix_path(path, Some(&*base)).to_string();
        if self.seen_artifacts.insert(path.clone()) {
            tracing::debug!(artifact = %path, "build artifact");
            self.artifacts.push(path);
        }
    }

    /// Append `line` to the compile-line store; failures only lose the line.
    pub fn store_line(&self, line: &str) -> Option<CompileLineHandle> {
        match self.ctx.store.append(line) {
            Ok(handle) => Some(handle),
            Err(err) => {
                tracing::warn!(error = %err, "compile line not stored");
                None
            }
        }
    }

    pub fn finish(self) -> DiscoveryResult {
        tracing::info!(
            records = self.records.len(),
            duplicates = self.duplicates,
            artifacts = self.artifacts.len(),
            cancelled = self.cancelled,
            "discovery finished"
        );
        let mut result = DiscoveryResult {
            records: self.records,
            artifacts: self.artifacts,
            compilers: self.compilers,
            duplicates: self.duplicates,
            cancelled: self.cancelled,
            ..DiscoveryResult::default()
        };
        result.infer_roots();
        result
    }

    fn add_link_output(&mut self, compile_dir: &str, tool: &str, argv: &[String]) {
        let output = if tool == "ar" {
            argv.iter()
                .skip(1)
                .find(|arg| {
                    !arg.starts_with('-') && matches!(paths::extension(arg), Some("a" | "lib"))
                })
                .cloned()
        } else {
            let explicit = argv
                .windows(2)
                .find(|pair| pair[0] == "-o")
                .map(|pair| pair[1].clone())
                .or_else(|| {
                    argv.iter().find_map(|arg| {
                        arg.strip_prefix("-o")
                            .filter(|rest| !rest.is_empty())
                            .map(str::to_string)
                    })
                });
            Some(explicit.unwrap_or_else(|| "a.out".to_string()))
        };
        if let Some(output) = output {
            self.add_build_artifact(compile_dir, &output);
        }
    }

    fn add_source(
        &mut self,
        compile_dir: &Arc<str>,
        tool: &str,
        family: Language,
        input: &str,
        artifacts: &Artifacts,
        handle: Option<CompileLineHandle>,
    ) -> bool {
        // Assembler sources are compiled by the C driver but carry no code model.
        if is_assembler_file(input) {
            return false;
        }
        let item_path = self.fix_path(input, Some(&**compile_dir));
        if !self.seen.insert(Arc::clone(&item_path)) {
            self.duplicates += 1;
            return false;
        }

        let extension = paths::extension(&item_path).unwrap_or("");
        let language = classify_language(artifacts.forced_language(), extension, family);
        let language_standard = match artifacts.language_standard {
            LanguageStandard::Unknown if language == Language::Fortran => {
                LanguageStandard::from_fortran_extension(extension)
            }
            standard => standard,
        };

        let resolve_all = |list: &[String]| -> Vec<Arc<str>> {
            list.iter()
                .map(|path| self.fix_path(path, Some(&**compile_dir)))
                .collect()
        };
        let record = SourceFileRecord {
            compile_directory: Arc::clone(compile_dir),
            item_name: item_name_for(&item_path, compile_dir),
            item_path,
            language,
            language_standard,
            user_include_paths: resolve_all(&artifacts.user_includes),
            system_include_paths: resolve_all(&artifacts.system_includes),
            user_files: resolve_all(&artifacts.user_files),
            included_files: BTreeSet::new(),
            user_macros: artifacts.user_macros.clone(),
            undefined_macros: artifacts.undefined_macros.clone(),
            compiler_name: tool.to_string(),
            important_flags: artifacts.important_flags.join(" "),
            compile_line: handle,
        };
        self.records.push(record);
        true
    }

    /// Normalize a recorded path, resolving it against `base` when relative.
    fn fix_path(&self, path: &str, base: Option<&str>) -> Arc<str> {
        let config = &self.ctx.config;
        let mut fixed = paths::to_forward_slashes(path);
        if config.windows_target {
            if let Some(converted) = paths::convert_cygwin(&fixed) {
                fixed = converted;
            }
        }
        let mut fixed = match base {
            Some(base) => paths::join(base, &fixed),
            None => paths::normalize(&fixed),
        };
        if config.resolve_symlinks {
            if let Some(resolved) = self.ctx.fs.canonicalize(&fixed) {
                fixed = resolved;
            }
        }
        self.ctx.interner.intern(&fixed)
    }
}

/// Explicit `-x` wins, then the extension; a C++ driver compiles C sources
/// as C++, and unknown extensions take the driver's language.
pub fn classify_language(forced: Option<Language>, extension: &str, family: Language) -> Language {
    if let Some(language) = forced {
        return language;
    }
    match (Language::from_extension(extension), family) {
        (Language::C, Language::Cpp) => Language::Cpp,
        (Language::Unknown, family) => family,
        (language, _) => language,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiscoveryConfig;
    use crate::fs_probe::MemoryFileSystem;

    fn context() -> DiscoveryContext {
        DiscoveryContext::new(DiscoveryConfig::default(), Arc::new(MemoryFileSystem::new()))
            .expect("context")
    }

    #[test]
    fn language_classification_order() {
        assert_eq!(classify_language(Some(Language::C), "cc", Language::Cpp), Language::C);
        assert_eq!(classify_language(None, "c", Language::Cpp), Language::Cpp);
        assert_eq!(classify_language(None, "cpp", Language::C), Language::Cpp);
        assert_eq!(classify_language(None, "inl", Language::C), Language::C);
    }

    #[test]
    fn records_resolve_paths_against_the_compile_directory() {
        let ctx = context();
        let mut builder = RecordBuilder::new(&ctx);
        let accepted = builder.add_command_line(
            "/proj/sub",
            "gcc",
            Language::C,
            "gcc -Iinc -I/abs -DDEBUG -c main.c",
        );
        assert_eq!(accepted, 1);
        let result = builder.finish();
        let record = &result.records[0];
        assert_eq!(&*record.compile_directory, "/proj/sub");
        assert_eq!(&*record.item_path, "/proj/sub/main.c");
        assert_eq!(record.item_name, "main.c");
        let includes: Vec<&str> = record.user_include_paths.iter().map(|p| &**p).collect();
        assert_eq!(includes, vec!["/proj/sub/inc", "/abs"]);
        assert_eq!(record.user_macros.get("DEBUG"), Some(&None));
        let handle = record.compile_line.expect("stored line");
        assert_eq!(ctx.store.get(handle).expect("line"), "gcc -Iinc -I/abs -DDEBUG -c main.c");
        assert_eq!(result.compilers[&Language::C]["gcc"], 1);
    }

    #[test]
    fn duplicates_and_assembler_inputs_are_dropped() {
        let ctx = context();
        let mut builder = RecordBuilder::new(&ctx);
        builder.add_command_line("/p", "gcc", Language::C, "gcc -c a.c");
        assert_eq!(builder.add_command_line("/p", "gcc", Language::C, "gcc -O2 -c a.c"), 0);
        assert_eq!(builder.add_command_line("/p", "gcc", Language::C, "gcc -c start.S"), 0);
        let result = builder.finish();
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.duplicates, 1);
        // Only the command that produced a record is counted.
        assert_eq!(result.compilers[&Language::C]["gcc"], 1);
    }

    #[test]
    fn link_steps_become_build_artifacts() {
        let ctx = context();
        let mut builder = RecordBuilder::new(&ctx);
        let argv =
            |line: &str| -> Vec<String> { line.split_whitespace().map(str::to_string).collect() };
        builder.add_command_line("/p", "gcc", Language::C, "gcc -o app main.o util.o");
        builder.add_invocation("/p", &argv("/usr/bin/ld -o lib/libx.so a.o"), None);
        builder.add_invocation("/p", &argv("ar rcs libutil.a util.o"), None);
        builder.add_invocation("/p", &argv("ccache g++ -c x.cc"), None);
        let result = builder.finish();
        assert_eq!(result.artifacts, vec!["/p/app", "/p/lib/libx.so", "/p/libutil.a"]);
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].language, Language::Cpp);
        assert_eq!(result.compilers[&Language::Cpp]["g++"], 1);
    }
}
