//! JSON report of one discovery run.
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::discovery::{DiscoveryResult, LogFormat};
use crate::line_store::CompileLineStore;
use crate::record::{Language, SourceFileRecord};
use crate::relocation::MappingMode;
use crate::roots::RootCandidate;

pub const REPORT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize)]
pub struct RecordReport<'a> {
    #[serde(flatten)]
    pub record: &'a SourceFileRecord,
    /// Raw command line from the store; absent when none was recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_line: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    pub schema_version: u32,
    /// Build log path, or the number of binaries for a debug-info scan.
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<LogFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping_mode: Option<MappingMode>,
    pub root: Option<&'a str>,
    pub roots: &'a [RootCandidate],
    pub compilers: &'a BTreeMap<Language, BTreeMap<String, usize>>,
    pub duplicates: usize,
    pub cancelled: bool,
    pub artifacts: &'a [String],
    pub records: Vec<RecordReport<'a>>,
}

impl<'a> RunReport<'a> {
    pub fn new(source: String, result: &'a DiscoveryResult, store: &CompileLineStore) -> Self {
        let records = result
            .records
            .iter()
            .map(|record| RecordReport {
                record,
                command_line: record.compile_line.and_then(|handle| match store.get(handle) {
                    Ok(line) => Some(line),
                    Err(err) => {
                        tracing::warn!(
                            item = %record.item_path,
                            error = %err,
                            "compile line unreadable"
                        );
                        None
                    }
                }),
            })
            .collect();
        Self {
            schema_version: REPORT_SCHEMA_VERSION,
            source,
            format: result.format,
            mapping_mode: None,
            root: result.root.as_deref(),
            roots: &result.roots,
            compilers: &result.compilers,
            duplicates: result.duplicates,
            cancelled: result.cancelled,
            artifacts: &result.artifacts,
            records,
        }
    }

    pub fn with_mapping_mode(mut self, mode: MappingMode) -> Self {
        self.mapping_mode = Some(mode);
        self
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("serialize report")
    }
}

/// Write `report` to `out`, or to stdout when no path is given.
pub fn write_report(report: &RunReport<'_>, out: Option<&Path>) -> Result<()> {
    let mut text = report.to_json()?;
    text.push('\n');
    match out {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create {}", parent.display()))?;
            }
            fs::write(path, text).with_context(|| format!("write report {}", path.display()))
        }
        None => std::io::stdout()
            .lock()
            .write_all(text.as_bytes())
            .context("write report to stdout"),
    }
}
