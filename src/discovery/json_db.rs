//! JSON compilation databases (`compile_commands.json`).
use anyhow::{Context, Result};
use serde::Deserialize;

use super::builder::RecordBuilder;
use super::DiscoveryContext;

/// One entry; either `command` or `arguments` carries the invocation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CompileCommand {
    pub directory: String,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub arguments: Option<Vec<String>>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
}

pub fn parse_compile_commands(text: &str) -> Result<Vec<CompileCommand>> {
    serde_json::from_str(text).context("parse compilation database")
}

/// Feed parsed entries into `builder`.
pub fn replay_compile_commands(
    commands: &[CompileCommand],
    ctx: &DiscoveryContext,
    builder: &mut RecordBuilder<'_>,
) {
    for entry in commands {
        if ctx.cancel.is_cancelled() {
            builder.mark_cancelled();
            return;
        }
        let (argv, line) = match (&entry.arguments, &entry.command) {
            (Some(arguments), _) if !arguments.is_empty() => (arguments.clone(), None),
            (_, Some(command)) => (ctx.extractor.tokenize(command), Some(command.as_str())),
            _ => {
                tracing::debug!(
                    directory = %entry.directory,
                    "entry without command or arguments"
                );
                continue;
            }
        };
        builder.add_database_entry(&entry.directory, &argv, line, entry.file.as_deref());
    }
}
