//! Compilation units recovered from debug information in built binaries.
//!
//! Binaries are read on scoped worker threads that share the compile-line
//! store; turning units into records stays on the calling thread so the
//! record builder keeps a single writer.
use anyhow::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;

use crate::artifacts::Artifacts;
use crate::discovery::builder::RecordBuilder;
use crate::discovery::{DiscoveryContext, DiscoveryResult};
use crate::line_store::CompileLineHandle;
use crate::record::{Language, LanguageStandard};

pub mod elf;

pub use elf::ElfDwarfReader;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacroEvent {
    Define { name: String, value: Option<String> },
    Undefine(String),
}

/// What one compilation unit says about its source file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompilationUnitInfo {
    pub source_path: String,
    pub comp_dir: String,
    pub language: Language,
    pub language_standard: LanguageStandard,
    pub include_dirs: Vec<String>,
    pub system_include_dirs: Vec<String>,
    pub macros: Vec<MacroEvent>,
    /// `DW_AT_producer`, e.g. `GNU C17 12.2.0 -mtune=generic -O2`.
    pub producer: Option<String>,
    /// Raw command line, when the producer embedded one.
    pub command_line: Option<String>,
}

/// Reads compilation units from the bytes of one binary.
pub trait DwarfReader: Send + Sync {
    fn compilation_units(&self, binary: &str, data: &[u8]) -> Result<Vec<CompilationUnitInfo>>;
}

struct UnitEvidence {
    unit: CompilationUnitInfo,
    line: Option<CompileLineHandle>,
}

/// Aggregate the compilation units of `binaries` into one result.
///
/// Unreadable or malformed binaries are logged and skipped. The inferred
/// root is `None` when no binary carried debug information.
pub fn analyze_binaries(
    binaries: &[String],
    reader: &dyn DwarfReader,
    ctx: &DiscoveryContext,
) -> DiscoveryResult {
    let workers = match ctx.config.worker_threads {
        0 => thread::available_parallelism().map(usize::from).unwrap_or(1),
        n => n,
    }
    .min(binaries.len())
    .max(1);

    let next = AtomicUsize::new(0);
    let slots: Mutex<Vec<Option<Vec<UnitEvidence>>>> =
        Mutex::new((0..binaries.len()).map(|_| None).collect());

    thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                if ctx.cancel.is_cancelled() {
                    break;
                }
                let idx = next.fetch_add(1, Ordering::SeqCst);
                let Some(binary) = binaries.get(idx) else {
                    break;
                };
                let evidence = read_binary(binary, reader, ctx);
                slots.lock().unwrap_or_else(|poison| poison.into_inner())[idx] = Some(evidence);
            });
        }
    });

    let mut builder = RecordBuilder::new(ctx);
    if ctx.cancel.is_cancelled() {
        builder.mark_cancelled();
    }
    let slots = slots.into_inner().unwrap_or_else(|poison| poison.into_inner());
    for evidence in slots.into_iter().flatten().flatten() {
        let unit = evidence.unit;
        let (tool, family) = compiler_from_producer(unit.producer.as_deref(), unit.language);
        let artifacts = unit_artifacts(&unit, ctx);
        builder.add_artifacts(&unit.comp_dir, &tool, family, &artifacts, evidence.line);
    }
    builder.finish()
}

fn read_binary(
    binary: &str,
    reader: &dyn DwarfReader,
    ctx: &DiscoveryContext,
) -> Vec<UnitEvidence> {
    let data = match ctx.fs.read_bytes(binary) {
        Ok(data) => data,
        Err(err) => {
            tracing::warn!(binary, error = %err, "skipping unreadable binary");
            return Vec::new();
        }
    };
    let units = match reader.compilation_units(binary, &data) {
        Ok(units) => units,
        Err(err) => {
            tracing::warn!(
                binary,
                error = %format!("{err:#}"),
                "skipping binary without usable debug info"
            );
            return Vec::new();
        }
    };
    tracing::debug!(binary, units = units.len(), "compilation units read");
    units
        .into_iter()
        .map(|unit| {
            let line = unit
                .command_line
                .as_deref()
                .and_then(|line| ctx.store.append(line).ok());
            UnitEvidence { unit, line }
        })
        .collect()
}

/// Include directories and macros of a unit, merged with the flags of an
/// embedded command line.
fn unit_artifacts(unit: &CompilationUnitInfo, ctx: &DiscoveryContext) -> Artifacts {
    let mut artifacts = match unit.command_line.as_deref() {
        Some(line) => ctx.extractor.extract_line(line, unit.language == Language::Cpp),
        None => Artifacts::default(),
    };
    artifacts.inputs = vec![unit.source_path.clone()];
    for dir in &unit.include_dirs {
        if !artifacts.user_includes.contains(dir) {
            artifacts.user_includes.push(dir.clone());
        }
    }
    for dir in &unit.system_include_dirs {
        if !artifacts.system_includes.contains(dir) {
            artifacts.system_includes.push(dir.clone());
        }
    }
    for event in &unit.macros {
        match event {
            MacroEvent::Define { name, value } => artifacts.define_value(name, value.clone()),
            MacroEvent::Undefine(name) => artifacts.undefine(name),
        }
    }
    if artifacts.language_standard == LanguageStandard::Unknown {
        artifacts.language_standard = unit.language_standard;
    }
    if artifacts.language_tags.is_empty() && unit.language != Language::Unknown {
        let tag = match unit.language {
            Language::Cpp => "c++",
            Language::Fortran => "f95",
            _ => "c",
        };
        artifacts.language_tags.push(tag.to_string());
    }
    artifacts
}

/// Compiler executable and language family implied by `DW_AT_producer`.
pub fn compiler_from_producer(producer: Option<&str>, language: Language) -> (String, Language) {
    let producer = producer.unwrap_or("");
    let family = |c: &str, cpp: &str, fortran: &str| -> String {
        match language {
            Language::Cpp => cpp,
            Language::Fortran => fortran,
            _ => c,
        }
        .to_string()
    };
    let tool = if producer.starts_with("GNU") {
        family("gcc", "g++", "gfortran")
    } else if producer.contains("clang") {
        family("clang", "clang++", "flang")
    } else if producer.contains("Intel") {
        family("icx", "icpx", "ifx")
    } else {
        match producer.split_whitespace().next() {
            Some(word) => word.to_ascii_lowercase(),
            None => "unknown".to_string(),
        }
    };
    (tool, language)
}

#[cfg(test)]
#[path = "aggregate_tests.rs"]
mod tests;
