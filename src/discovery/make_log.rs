//! Make-style build transcripts.
//!
//! Each logical line (backslash continuations folded) has its backtick
//! subshells expanded, is split into shell commands, and every command is
//! offered to the directory tracker before it is searched for a compiler.
use crate::config::CompilerNames;
use crate::record::Language;

use super::builder::RecordBuilder;
use super::pkg_config::PackageConfig;
use super::tracker::{DirectoryTracker, LineEffect};
use super::DiscoveryContext;

/// Upper bound on backtick substitutions per line.
pub const MAX_BACKTICK_EXPANSIONS: usize = 32;

/// A compiler found inside a shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerMatch<'l> {
    pub tool: String,
    pub language: Language,
    /// The command from the start of the compiler token onwards.
    pub command: &'l str,
}

/// Finds known compiler basenames inside free-form command text.
#[derive(Debug, Clone)]
pub struct CompilerMatcher {
    names: Vec<(String, Language)>,
    windows: bool,
}

impl CompilerMatcher {
    pub fn new(compilers: &CompilerNames, windows: bool) -> Self {
        let mut names: Vec<(String, Language)> = compilers
            .all()
            .map(|(name, language)| (name.to_string(), language))
            .collect();
        // Longer names first so `g++` beats `c++` at the same position.
        names.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Self { names, windows }
    }

    /// Earliest compiler occurrence bounded by delimiters.
    ///
    /// The name must start the command or follow whitespace, a path
    /// separator or a quote; occurrences inside a `-` flag token are passed
    /// over in favour of later ones.
    pub fn find<'l>(&self, command: &'l str) -> Option<CompilerMatch<'l>> {
        let mut best: Option<(usize, usize, &str, Language)> = None;
        for (name, language) in &self.names {
            for (idx, _) in command.match_indices(name.as_str()) {
                if best.is_some_and(|(top, _, _, _)| idx >= top) {
                    break;
                }
                if !self.is_bounded(command, idx, name.len()) {
                    continue;
                }
                let token_start = command[..idx]
                    .rfind(char::is_whitespace)
                    .map(|ws| ws + 1)
                    .unwrap_or(0);
                if command[token_start..].starts_with('-') {
                    continue;
                }
                best = Some((idx, token_start, name.as_str(), *language));
                break;
            }
        }
        let (_, token_start, name, language) = best?;
        Some(CompilerMatch {
            tool: name.to_string(),
            language,
            command: &command[token_start..],
        })
    }

    fn is_bounded(&self, command: &str, idx: usize, len: usize) -> bool {
        let before = command[..idx].chars().next_back();
        let delimited = matches!(before, None | Some('/' | '\\' | '"' | '\''));
        if !delimited && !before.is_some_and(char::is_whitespace) {
            return false;
        }
        let mut rest = &command[idx + len..];
        if self.windows && rest.get(..4).is_some_and(|ext| ext.eq_ignore_ascii_case(".exe")) {
            rest = &rest[4..];
        }
        match rest.chars().next() {
            None => true,
            Some(ch) => ch.is_whitespace() || ch == '"' || ch == '\'',
        }
    }
}

/// Join lines ending in `\` with their successors.
pub fn fold_continuations(lines: &[String]) -> Vec<String> {
    let mut folded = Vec::new();
    let mut pending: Option<String> = None;
    for line in lines {
        let trimmed = line.trim_end();
        let (body, continued) = match trimmed.strip_suffix('\\') {
            Some(body) => (body.trim_end(), true),
            None => (line.as_str(), false),
        };
        let joined = match pending.take() {
            Some(mut acc) => {
                acc.push(' ');
                acc.push_str(body.trim_start());
                acc
            }
            None => body.to_string(),
        };
        if continued {
            pending = Some(joined);
        } else {
            folded.push(joined);
        }
    }
    folded.extend(pending);
    folded
}

/// Replace backtick subshells with what they would print.
///
/// Substitutions run strictly left to right over the remainder of the line
/// and stop after [`MAX_BACKTICK_EXPANSIONS`]; an unmatched backtick leaves
/// the rest of the line untouched.
pub fn expand_backticks(line: &str, pkg_config: &dyn PackageConfig) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    for _ in 0..MAX_BACKTICK_EXPANSIONS {
        let Some(open) = rest.find('`') else {
            break;
        };
        let Some(close) = rest[open + 1..].find('`') else {
            break;
        };
        out.push_str(&rest[..open]);
        out.push_str(&evaluate_subshell(&rest[open + 1..open + 1 + close], pkg_config));
        rest = &rest[open + close + 2..];
    }
    out.push_str(rest);
    out
}

fn evaluate_subshell(inner: &str, pkg_config: &dyn PackageConfig) -> String {
    let tokens = shell_words::split(inner.trim())
        .unwrap_or_else(|_| inner.split_whitespace().map(str::to_string).collect());
    let Some(program) = tokens.first() else {
        return String::new();
    };
    match crate::paths::tool_name(program) {
        "pkg-config" => {
            if !tokens.iter().any(|token| token == "--cflags") {
                return String::new();
            }
            let flags: Vec<String> = tokens[1..]
                .iter()
                .filter(|token| !token.starts_with('-'))
                .filter_map(|package| pkg_config.cflags(package))
                .flatten()
                .collect();
            shell_words::join(flags)
        }
        "cygpath" => tokens[1..]
            .iter()
            .rev()
            .find(|token| !token.starts_with('-'))
            .cloned()
            .unwrap_or_default(),
        "echo" => {
            let text = inner
                .find("echo")
                .map(|idx| &inner[idx + "echo".len()..])
                .unwrap_or("")
                .trim();
            match text.chars().next() {
                Some(quote @ ('"' | '\'')) => {
                    let body = &text[1..];
                    body.find(quote).map(|end| &body[..end]).unwrap_or(body).to_string()
                }
                _ => text.split_whitespace().next().unwrap_or("").to_string(),
            }
        }
        _ => String::new(),
    }
}

/// Split a shell line on `;`, `&&` and `||` outside quotes.
pub fn split_commands(line: &str) -> Vec<&str> {
    let bytes = line.as_bytes();
    let mut commands = Vec::new();
    let mut quote: Option<u8> = None;
    let mut start = 0;
    let mut idx = 0;
    while idx < bytes.len() {
        let byte = bytes[idx];
        match quote {
            Some(open) if byte == open => quote = None,
            Some(_) => {}
            None if byte == b'"' || byte == b'\'' => quote = Some(byte),
            None if byte == b'\\' => idx += 1,
            None if byte == b';' => {
                commands.push(&line[start..idx]);
                start = idx + 1;
            }
            None if (byte == b'&' || byte == b'|') && bytes.get(idx + 1) == Some(&byte) => {
                commands.push(&line[start..idx]);
                idx += 1;
                start = idx + 1;
            }
            None => {}
        }
        idx += 1;
    }
    if start < line.len() {
        commands.push(&line[start..]);
    }
    commands
        .into_iter()
        .map(str::trim)
        .filter(|command| !command.is_empty())
        .collect()
}

/// Replay a make transcript into `builder`.
pub fn parse_make_log(
    lines: &[String],
    ctx: &DiscoveryContext,
    builder: &mut RecordBuilder<'_>,
    initial_dir: Option<&str>,
) {
    let matcher = CompilerMatcher::new(&ctx.config.compilers, ctx.config.windows_target);
    let mut tracker = DirectoryTracker::new(&ctx.probe, ctx.tracker_options(), initial_dir);
    let mut homeless = 0usize;
    for line in fold_continuations(lines) {
        if ctx.cancel.is_cancelled() {
            builder.mark_cancelled();
            break;
        }
        let line = expand_backticks(&line, ctx.pkg_config.as_ref());
        for command in split_commands(&line) {
            if tracker.process(command) == LineEffect::Consumed {
                continue;
            }
            let Some(hit) = matcher.find(command) else {
                continue;
            };
            let Some(dir) = tracker.current().map(str::to_string) else {
                homeless += 1;
                continue;
            };
            builder.add_command_line(&dir, &hit.tool, hit.language, hit.command);
        }
    }
    if homeless > 0 {
        tracing::warn!(
            commands = homeless,
            "compile commands before any known directory were skipped"
        );
    }
}

#[cfg(test)]
#[path = "make_log_tests.rs"]
mod tests;
