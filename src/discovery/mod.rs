//! Build-log discovery.
//!
//! A log is sniffed into one of three formats and replayed by the matching
//! parser. All parsers funnel compiler invocations into one
//! [`builder::RecordBuilder`], so records, build artifacts and the compiler
//! histogram look the same whatever the evidence was.
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::artifacts::{ArtifactExtractor, GccArtifactExtractor};
use crate::cancel::CancelFlag;
use crate::config::DiscoveryConfig;
use crate::fs_probe::FileSystemProbe;
use crate::interner::StringInterner;
use crate::line_store::CompileLineStore;
use crate::paths;
use crate::record::{Language, SourceFileRecord};
use crate::relocation::probe_cache::ProbeCache;
use crate::relocation::RelocatablePathMapper;
use crate::roots::{CommonRootInferencer, RootCandidate};

pub mod builder;
pub mod exec_log;
pub mod json_db;
pub mod make_log;
pub mod pkg_config;
pub mod tracker;

use builder::RecordBuilder;
use pkg_config::{PackageConfig, PkgConfigFiles};
use tracker::TrackerOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    MakeTrace,
    ExecBlock,
    Json,
}

impl LogFormat {
    /// Decide by the first non-blank line.
    pub fn sniff(lines: &[String]) -> LogFormat {
        let first = lines
            .iter()
            .map(|line| line.trim_start())
            .find(|line| !line.is_empty());
        match first {
            Some(line) if line.starts_with(exec_log::CALLED_PREFIX) => LogFormat::ExecBlock,
            Some(line) if line.starts_with('[') || line.starts_with('{') => LogFormat::Json,
            _ => LogFormat::MakeTrace,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::MakeTrace => "make_trace",
            LogFormat::ExecBlock => "exec_block",
            LogFormat::Json => "json",
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a discovery run shares: configuration, filesystem access,
/// the compile-line store, the interner and the collaborators.
pub struct DiscoveryContext {
    pub config: DiscoveryConfig,
    pub fs: Arc<dyn FileSystemProbe>,
    pub probe: ProbeCache,
    pub store: Arc<CompileLineStore>,
    pub interner: Arc<StringInterner>,
    pub extractor: Arc<dyn ArtifactExtractor>,
    pub pkg_config: Arc<dyn PackageConfig>,
    pub cancel: CancelFlag,
    /// Analysis root: initial directory for transcripts and relocation target.
    pub root: Option<String>,
}

impl DiscoveryContext {
    pub fn new(config: DiscoveryConfig, fs: Arc<dyn FileSystemProbe>) -> Result<Self> {
        let store = CompileLineStore::with_max_line_bytes(config.max_compile_line_bytes)?;
        let pkg_config = PkgConfigFiles::new(Arc::clone(&fs), config.pkg_config_path.clone());
        Ok(Self {
            probe: ProbeCache::new(Arc::clone(&fs)),
            fs,
            store: Arc::new(store),
            interner: Arc::new(StringInterner::new()),
            extractor: Arc::new(GccArtifactExtractor),
            pkg_config: Arc::new(pkg_config),
            cancel: CancelFlag::new(),
            root: None,
            config,
        })
    }

    pub fn with_root(mut self, root: &str) -> Self {
        self.root = Some(paths::normalize(root));
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn ArtifactExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_pkg_config(mut self, pkg_config: Arc<dyn PackageConfig>) -> Self {
        self.pkg_config = pkg_config;
        self
    }

    pub fn tracker_options(&self) -> TrackerOptions {
        TrackerOptions {
            windows_target: self.config.windows_target,
            net_host_rewrite: self.config.net_host_rewrite,
            verify_existence: !self.config.relocate,
            root: self.root.clone(),
        }
    }

    /// Fresh relocation mapper sharing this run's filesystem and cancel flag.
    pub fn mapper(&self) -> RelocatablePathMapper {
        RelocatablePathMapper::new(Arc::clone(&self.fs), self.cancel.clone())
            .with_index_depth(self.config.index_max_depth)
    }
}

/// Output of one discovery run.
#[derive(Debug, Default)]
pub struct DiscoveryResult {
    pub records: Vec<SourceFileRecord>,
    pub artifacts: Vec<String>,
    /// Invocations per compiler executable, per language; only invocations
    /// that produced a record count.
    pub compilers: BTreeMap<Language, BTreeMap<String, usize>>,
    pub duplicates: usize,
    pub roots: Vec<RootCandidate>,
    pub root: Option<String>,
    pub cancelled: bool,
    /// Log format the records were replayed from; `None` for debug info.
    pub format: Option<LogFormat>,
}

impl DiscoveryResult {
    /// Recompute root candidates from the source directories of all records.
    pub fn infer_roots(&mut self) {
        let mut inferencer = CommonRootInferencer::new();
        for record in &self.records {
            if let Some(dir) = paths::parent(&record.item_path) {
                inferencer.add(dir);
            }
        }
        self.roots = inferencer.candidates();
        self.root = inferencer.best().map(|best| best.path);
    }

    /// Compilers for `language`, most used first.
    pub fn compilers_for(&self, language: Language) -> Vec<(&str, usize)> {
        let mut used: Vec<(&str, usize)> = self
            .compilers
            .get(&language)
            .map(|tools| tools.iter().map(|(tool, count)| (tool.as_str(), *count)).collect())
            .unwrap_or_default();
        used.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        used
    }
}

/// Read a build log, sniff its format and replay it.
pub fn analyze_log(log_path: &str, ctx: &DiscoveryContext) -> Result<DiscoveryResult> {
    let lines = ctx
        .fs
        .read_lines(log_path)
        .with_context(|| format!("read build log {log_path}"))?;
    let format = LogFormat::sniff(&lines);
    tracing::info!(log = log_path, %format, lines = lines.len(), "analyzing build log");
    Ok(analyze_lines(&lines, format, log_path, ctx))
}

/// Replay already loaded log lines in a known format.
pub fn analyze_lines(
    lines: &[String],
    format: LogFormat,
    log_path: &str,
    ctx: &DiscoveryContext,
) -> DiscoveryResult {
    let mut builder = RecordBuilder::new(ctx);
    match format {
        LogFormat::MakeTrace => {
            let log_dir = paths::parent(&paths::normalize(log_path)).map(str::to_string);
            let initial = ctx.root.clone().or(log_dir);
            make_log::parse_make_log(lines, ctx, &mut builder, initial.as_deref());
        }
        LogFormat::ExecBlock => exec_log::parse_exec_blocks(lines, ctx, &mut builder),
        LogFormat::Json => match json_db::parse_compile_commands(&lines.join("\n")) {
            Ok(commands) => json_db::replay_compile_commands(&commands, ctx, &mut builder),
            Err(err) => {
                tracing::debug!(error = %err, "not strict JSON; scanning lines");
                exec_log::parse_json_lines(lines, ctx, &mut builder);
            }
        },
    }
    let mut result = builder.finish();
    result.format = Some(format);
    result
}

/// Rewrite every recorded path through `mapper`, then re-infer roots.
///
/// Paths that cannot be resolved keep their normalized recorded form.
pub fn relocate_records(
    result: &mut DiscoveryResult,
    mapper: &RelocatablePathMapper,
    root: &str,
    interner: &StringInterner,
) {
    for record in &mut result.records {
        record.resolve_include_paths(mapper, root, interner);
        record.reset_item_path(mapper, root, interner);
    }
    for artifact in &mut result.artifacts {
        if let Some(mapped) = mapper.resolve(root, artifact) {
            *artifact = mapped;
        }
    }
    tracing::info!(
        rules = mapper.entries().len(),
        records = result.records.len(),
        "relocation applied"
    );
    result.infer_roots();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_probe::MemoryFileSystem;

    fn lines(text: &str) -> Vec<String> {
        text.lines().map(str::to_string).collect()
    }

    #[test]
    fn sniffing_uses_the_first_non_blank_line() {
        assert_eq!(LogFormat::sniff(&lines("\n  called: gcc\n")), LogFormat::ExecBlock);
        assert_eq!(LogFormat::sniff(&lines("\n[\n")), LogFormat::Json);
        assert_eq!(LogFormat::sniff(&lines("{\"directory\": \"/x\"}")), LogFormat::Json);
        assert_eq!(LogFormat::sniff(&lines("make all\n")), LogFormat::MakeTrace);
        assert_eq!(LogFormat::sniff(&[]), LogFormat::MakeTrace);
    }

    #[test]
    fn json_log_with_two_source_directories() {
        let fs = MemoryFileSystem::new().with_file(
            "/logs/compile_commands.json",
            r#"[
  {"directory": "/work/alpha/src", "command": "gcc -c a.c", "file": "a.c"},
  {"directory": "/work/alpha/src", "command": "gcc -c b.c", "file": "b.c"},
  {"directory": "/srv/beta", "command": "g++ -c c.cc", "file": "c.cc"}
]"#,
        );
        let ctx = DiscoveryContext::new(DiscoveryConfig::default(), Arc::new(fs)).expect("context");
        let result = analyze_log("/logs/compile_commands.json", &ctx).expect("analyze");
        assert_eq!(result.records.len(), 3);
        assert_eq!(result.roots.len(), 2);
        assert_eq!(result.root.as_deref(), Some("/work/alpha/src"));
        assert_eq!(result.compilers_for(Language::C), vec![("gcc", 2)]);
    }

    #[test]
    fn invalid_json_falls_back_to_line_scan() {
        let text = lines("[\n{\n\"directory\": \"/w\",\n\"command\": \"cc -c x.c\",\n},\n");
        let fs = Arc::new(MemoryFileSystem::new());
        let ctx = DiscoveryContext::new(DiscoveryConfig::default(), fs).expect("context");
        let result = analyze_lines(&text, LogFormat::Json, "/w/log.json", &ctx);
        assert_eq!(result.records.len(), 1);
    }

    #[test]
    fn missing_log_is_an_error() {
        let fs = Arc::new(MemoryFileSystem::new());
        let ctx = DiscoveryContext::new(DiscoveryConfig::default(), fs).expect("context");
        let err = analyze_log("/nope.log", &ctx).expect_err("missing");
        assert!(err.to_string().contains("read build log"));
    }

    #[test]
    fn relocation_rewrites_records_and_roots() {
        let fs = MemoryFileSystem::new()
            .with_file("/home/alice/proj/src/x.c", "")
            .with_dir("/home/alice/proj/include");
        let config = DiscoveryConfig {
            relocate: true,
            ..DiscoveryConfig::default()
        };
        let ctx = DiscoveryContext::new(config, Arc::new(fs))
            .expect("context")
            .with_root("/home/alice/proj");
        let log = lines(
            "make[1]: Entering directory '/home/bob/proj/src'\n\
             gcc -I../include -c x.c\n",
        );
        let mut result = analyze_lines(&log, LogFormat::MakeTrace, "/tmp/build.log", &ctx);
        let mapper = ctx.mapper();
        relocate_records(&mut result, &mapper, "/home/alice/proj", &ctx.interner);

        let record = &result.records[0];
        assert_eq!(&*record.compile_directory, "/home/alice/proj/src");
        assert_eq!(&*record.item_path, "/home/alice/proj/src/x.c");
        assert_eq!(record.item_name, "x.c");
        assert_eq!(&*record.user_include_paths[0], "/home/alice/proj/include");
        assert_eq!(result.root.as_deref(), Some("/home/alice/proj/src"));
    }
}
