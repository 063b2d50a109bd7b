//! Exec-trace logs: `called:` blocks and line-oriented JSON.
//!
//! Block format, one block per process:
//!
//! ```text
//! called: /usr/bin/gcc
//! 	/home/me/proj
//! 	gcc
//! 	-c
//! 	main.c
//!
//! ```
//!
//! The first indented line is the working directory, the rest is argv.
use super::builder::RecordBuilder;
use super::DiscoveryContext;

pub const CALLED_PREFIX: &str = "called:";

#[derive(Debug, Default)]
struct Block {
    executable: String,
    cwd: Option<String>,
    argv: Vec<String>,
}

/// Replay `called:` blocks into `builder`.
pub fn parse_exec_blocks(
    lines: &[String],
    ctx: &DiscoveryContext,
    builder: &mut RecordBuilder<'_>,
) {
    let mut block: Option<Block> = None;
    for line in lines {
        if ctx.cancel.is_cancelled() {
            builder.mark_cancelled();
            return;
        }
        if let Some(executable) = line.strip_prefix(CALLED_PREFIX) {
            if let Some(done) = block.take() {
                flush_block(done, builder);
            }
            block = Some(Block {
                executable: executable.trim().to_string(),
                ..Block::default()
            });
            continue;
        }
        if line.trim().is_empty() {
            if let Some(done) = block.take() {
                flush_block(done, builder);
            }
            continue;
        }
        let Some(current) = block.as_mut() else {
            continue;
        };
        let Some(value) = line.strip_prefix('\t') else {
            continue;
        };
        if current.cwd.is_none() {
            current.cwd = Some(value.to_string());
        } else {
            current.argv.push(value.to_string());
        }
    }
    if let Some(done) = block.take() {
        flush_block(done, builder);
    }
}

fn flush_block(block: Block, builder: &mut RecordBuilder<'_>) {
    let Some(cwd) = block.cwd else {
        return;
    };
    builder.add_traced_invocation(&cwd, &block.executable, &block.argv);
}

/// Naive line scan of a JSON array of command objects.
///
/// Used when the document is not valid JSON; each object ends at a line
/// starting with `}`.
pub fn parse_json_lines(
    lines: &[String],
    ctx: &DiscoveryContext,
    builder: &mut RecordBuilder<'_>,
) {
    let mut directory: Option<String> = None;
    let mut command: Option<String> = None;
    let mut file: Option<String> = None;
    for line in lines {
        if ctx.cancel.is_cancelled() {
            builder.mark_cancelled();
            return;
        }
        let trimmed = line.trim();
        if trimmed.starts_with('}') {
            if let (Some(dir), Some(command)) = (directory.take(), command.take()) {
                let argv = ctx.extractor.tokenize(&command);
                let accepted =
                    builder.add_database_entry(&dir, &argv, Some(&command), file.as_deref());
                if accepted == 0 {
                    tracing::debug!(directory = %dir, "command object produced no record");
                }
            }
            directory = None;
            command = None;
            file = None;
            continue;
        }
        if let Some(value) = field_value(trimmed, "directory") {
            directory = Some(value);
        } else if let Some(value) = field_value(trimmed, "command") {
            command = Some(value);
        } else if let Some(value) = field_value(trimmed, "file") {
            file = Some(value);
        }
    }
}

/// String value of a `"name": "value",` line.
fn field_value(line: &str, name: &str) -> Option<String> {
    let rest = line.strip_prefix('"')?.strip_prefix(name)?.strip_prefix('"')?;
    let raw = rest.trim_start().strip_prefix(':')?.trim().trim_end_matches(',').trim_end();
    if !raw.starts_with('"') {
        return None;
    }
    let value = serde_json::from_str::<String>(raw)
        .unwrap_or_else(|_| raw.trim_matches('"').to_string());
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiscoveryConfig;
    use crate::fs_probe::MemoryFileSystem;
    use crate::record::Language;
    use std::sync::Arc;

    fn context() -> DiscoveryContext {
        let fs = Arc::new(MemoryFileSystem::new());
        DiscoveryContext::new(DiscoveryConfig::default(), fs).expect("context")
    }

    fn lines(text: &str) -> Vec<String> {
        text.lines().map(str::to_string).collect()
    }

    #[test]
    fn blocks_route_compilers_and_linkers() {
        let ctx = context();
        let mut builder = RecordBuilder::new(&ctx);
        let log = lines(
            "called: /usr/bin/gcc\n\t/home/me/proj\n\tgcc\n\t-DX=1\n\t-c\n\tsrc/a.c\n\n\
             called: /usr/bin/ld\n\t/home/me/proj\n\tld\n\t-o\n\tapp\n\ta.o\n\n\
             called: /bin/sed\n\t/home/me/proj\n\tsed\n\t-e\n\ts/x/y/\n",
        );
        parse_exec_blocks(&log, &ctx, &mut builder);
        let result = builder.finish();
        assert_eq!(result.records.len(), 1);
        assert_eq!(&*result.records[0].item_path, "/home/me/proj/src/a.c");
        assert_eq!(result.records[0].user_macros.get("X"), Some(&Some("1".to_string())));
        assert_eq!(result.artifacts, vec!["/home/me/proj/app"]);
        assert_eq!(result.compilers[&Language::C]["gcc"], 1);
    }

    #[test]
    fn traced_executable_names_the_compiler() {
        let ctx = context();
        let mut builder = RecordBuilder::new(&ctx);
        let log = lines(
            "called: /usr/bin/x86_64-linux-gnu-gcc-12\n\t/w\n\tcc\n\t-c\n\tm.c\n\n\
             called: /bin/sh\n\t/w\n\tgcc\n\t-c\n\tn.c\n",
        );
        parse_exec_blocks(&log, &ctx, &mut builder);
        let result = builder.finish();
        assert_eq!(result.records.len(), 2);
        assert_eq!(result.compilers[&Language::C]["x86_64-linux-gnu-gcc-12"], 1);
        assert_eq!(result.compilers[&Language::C]["gcc"], 1);
        let line = result.records[0].compile_line.expect("line");
        assert_eq!(ctx.store.get(line).expect("stored"), "cc -c m.c");
    }

    #[test]
    fn block_without_cwd_is_ignored() {
        let ctx = context();
        let mut builder = RecordBuilder::new(&ctx);
        parse_exec_blocks(&lines("called: gcc\n\n"), &ctx, &mut builder);
        assert!(builder.finish().records.is_empty());
    }

    #[test]
    fn json_lines_extract_fields_per_object() {
        let ctx = context();
        let mut builder = RecordBuilder::new(&ctx);
        let log = lines(
            "[\n{\n  \"directory\": \"/w/a\",\n  \"command\": \"g++ -DNAME=\\\"v\\\" -c x.cpp\",\n\
             \"file\": \"x.cpp\"\n},\n{\n  \"directory\": \"/w/b\",\n  \"command\": \"broken\n}\n]\n",
        );
        parse_json_lines(&log, &ctx, &mut builder);
        let result = builder.finish();
        assert_eq!(result.records.len(), 1);
        assert_eq!(&*result.records[0].item_path, "/w/a/x.cpp");
        assert_eq!(result.records[0].user_macros.get("NAME"), Some(&Some("v".to_string())));
    }

    #[test]
    fn field_values_unescape_json() {
        assert_eq!(field_value(r#""file": "a\\b.c","#, "file").as_deref(), Some("a\\b.c"));
        assert_eq!(field_value(r#""files": "x""#, "file"), None);
        assert_eq!(field_value(r#""file": 3"#, "file"), None);
    }
}
