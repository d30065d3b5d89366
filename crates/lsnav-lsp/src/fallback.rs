//! Textual approximation of references and callers when no language server
//! is usable: a literal word search over the workspace via ripgrep, or grep
//! when ripgrep is not installed.
//!
//! Matches are classified as declaration, call, or bare reference from
//! syntactic cues on the matched line. None of this is semantic; callers mark
//! the results as approximate.

use std::path::Path;
use std::process::Output;

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use serde::Serialize;
use tokio::process::Command;
use tracing::debug;

use crate::types::{LspPosition, LspRange, path_to_uri};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackTool {
    Ripgrep,
    Grep,
}

impl FallbackTool {
    pub fn as_str(self) -> &'static str {
        match self {
            FallbackTool::Ripgrep => "ripgrep",
            FallbackTool::Grep => "grep",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// The line looks like it declares the symbol.
    Declaration,
    /// The symbol is followed by an argument list.
    Call,
    /// Anything else: imports, comments, bare mentions.
    Reference,
}

#[derive(Debug, Clone, Serialize)]
pub struct FallbackRow {
    pub file_path: String,
    pub uri: String,
    pub range: LspRange,
    pub line_text: String,
    pub kind: MatchKind,
}

#[derive(Debug)]
pub struct FallbackOutcome {
    pub tool: FallbackTool,
    pub rows: Vec<FallbackRow>,
    pub truncated: bool,
}

/// Literal word search for `symbol` under `workspace_root`. Errs only when
/// neither search binary can run; zero matches is an ordinary empty outcome.
pub async fn search_workspace(
    workspace_root: &Path,
    symbol: &str,
    max_matches: usize,
) -> Result<FallbackOutcome> {
    let patterns = ClassifyPatterns::new(symbol)?;

    match run_ripgrep(workspace_root, symbol).await {
        Ok(lines) => {
            return Ok(assemble(
                FallbackTool::Ripgrep,
                lines
                    .iter()
                    .filter_map(|line| parse_ripgrep_line(line))
                    .collect(),
                symbol,
                &patterns,
                max_matches,
            ));
        }
        Err(err) if spawn_missing(&err) => {
            debug!("ripgrep is not installed, falling back to grep");
        }
        Err(err) => return Err(err),
    }

    match run_grep(workspace_root, symbol).await {
        Ok(lines) => Ok(assemble(
            FallbackTool::Grep,
            lines
                .iter()
                .filter_map(|line| parse_grep_line(line, symbol))
                .collect(),
            symbol,
            &patterns,
            max_matches,
        )),
        Err(err) if spawn_missing(&err) => Err(anyhow!(
            "neither ripgrep nor grep is installed; install ripgrep to enable the text fallback"
        )),
        Err(err) => Err(err),
    }
}

async fn run_ripgrep(workspace_root: &Path, symbol: &str) -> Result<Vec<String>> {
    let output = Command::new("rg")
        .args([
            "--fixed-strings",
            "--word-regexp",
            "--line-number",
            "--column",
            "--no-heading",
            "--color=never",
            "--",
        ])
        .arg(symbol)
        .arg(workspace_root)
        .output()
        .await
        .context("failed to run rg")?;
    search_lines("rg", output)
}

async fn run_grep(workspace_root: &Path, symbol: &str) -> Result<Vec<String>> {
    let output = Command::new("grep")
        .args([
            "-rInwF",
            "--exclude-dir=.git",
            "--exclude-dir=node_modules",
            "--exclude-dir=target",
            "--",
        ])
        .arg(symbol)
        .arg(workspace_root)
        .output()
        .await
        .context("failed to run grep")?;
    search_lines("grep", output)
}

/// Both tools exit 1 for "no matches", which is not an error here.
fn search_lines(tool: &str, output: Output) -> Result<Vec<String>> {
    if output.status.success() || output.status.code() == Some(1) {
        let stdout = String::from_utf8_lossy(&output.stdout);
        return Ok(stdout.lines().map(str::to_string).collect());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(anyhow!(
        "{tool} failed with {}: {}",
        output.status,
        stderr.lines().next().unwrap_or("no error output")
    ))
}

fn spawn_missing(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<std::io::Error>())
        .any(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
}

fn assemble(
    tool: FallbackTool,
    matches: Vec<RawMatch>,
    symbol: &str,
    patterns: &ClassifyPatterns,
    max_matches: usize,
) -> FallbackOutcome {
    let truncated = matches.len() > max_matches;
    let symbol_len = symbol.chars().count() as u32;
    let rows = matches
        .into_iter()
        .take(max_matches)
        .map(|m| to_row(m, symbol_len, patterns))
        .collect();
    FallbackOutcome {
        tool,
        rows,
        truncated,
    }
}

struct RawMatch {
    path: String,
    /// 1-based, as printed by the search tool.
    line: u32,
    /// 1-based column of the match start.
    column: u32,
    text: String,
}

fn parse_ripgrep_line(line: &str) -> Option<RawMatch> {
    let mut parts = line.splitn(4, ':');
    let path = parts.next()?.to_string();
    let line_no = parts.next()?.parse().ok()?;
    let column = parts.next()?.parse().ok()?;
    let text = parts.next()?.to_string();
    Some(RawMatch {
        path,
        line: line_no,
        column,
        text,
    })
}

fn parse_grep_line(line: &str, symbol: &str) -> Option<RawMatch> {
    let mut parts = line.splitn(3, ':');
    let path = parts.next()?.to_string();
    let line_no = parts.next()?.parse().ok()?;
    let text = parts.next()?.to_string();
    // grep has no column output; point at the first occurrence in the line.
    let column = text.find(symbol).map(|i| i as u32 + 1).unwrap_or(1);
    Some(RawMatch {
        path,
        line: line_no,
        column,
        text,
    })
}

fn to_row(m: RawMatch, symbol_len: u32, patterns: &ClassifyPatterns) -> FallbackRow {
    let line = m.line.saturating_sub(1);
    let character = m.column.saturating_sub(1);
    let kind = patterns.classify(&m.text);
    FallbackRow {
        uri: path_to_uri(Path::new(&m.path)).unwrap_or_else(|_| format!("file://{}", m.path)),
        file_path: m.path,
        range: LspRange {
            start: LspPosition { line, character },
            end: LspPosition {
                line,
                character: character + symbol_len,
            },
        },
        line_text: m.text.trim().to_string(),
        kind,
    }
}

struct ClassifyPatterns {
    declaration: Regex,
    call: Regex,
}

impl ClassifyPatterns {
    fn new(symbol: &str) -> Result<Self> {
        let escaped = regex::escape(symbol);
        // Keyword-led declarations across common languages, plus
        // assignment-style function definitions.
        let declaration = Regex::new(&format!(
            r"(?:\b(?:fn|func|def|function|class|struct|enum|trait|interface|type|impl|macro_rules!|let|const|static|var|val)\s+(?:mut\s+)?{escaped}\b)|(?:\b{escaped}\s*[:=]\s*(?:async\s+)?(?:fn\b|func\b|function\b|\(|\|))"
        ))
        .context("failed to compile declaration pattern")?;
        let call = Regex::new(&format!(r"{escaped}\s*\("))
            .context("failed to compile call pattern")?;
        Ok(Self { declaration, call })
    }

    /// Declaration wins when a line would match both ways.
    fn classify(&self, line: &str) -> MatchKind {
        if self.declaration.is_match(line) {
            MatchKind::Declaration
        } else if self.call.is_match(line) {
            MatchKind::Call
        } else {
            MatchKind::Reference
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn classifies_keyword_declarations() {
        let patterns = ClassifyPatterns::new("resolve_symbol").unwrap();
        assert_eq!(
            patterns.classify("fn resolve_symbol(content: &str) {"),
            MatchKind::Declaration
        );
        assert_eq!(
            patterns.classify("def resolve_symbol(content):"),
            MatchKind::Declaration
        );
        assert_eq!(
            patterns.classify("    const resolve_symbol = (content) => {"),
            MatchKind::Declaration
        );
    }

    #[test]
    fn classifies_calls_and_bare_references() {
        let patterns = ClassifyPatterns::new("resolve_symbol").unwrap();
        assert_eq!(
            patterns.classify("let hit = resolve_symbol(content);"),
            MatchKind::Call
        );
        assert_eq!(
            patterns.classify("    self.resolve_symbol(content)"),
            MatchKind::Call
        );
        assert_eq!(
            patterns.classify("use crate::resolve_symbol;"),
            MatchKind::Reference
        );
    }

    #[test]
    fn declaration_wins_over_call_on_the_same_line() {
        let patterns = ClassifyPatterns::new("greet").unwrap();
        assert_eq!(patterns.classify("def greet(name):"), MatchKind::Declaration);
    }

    #[test]
    fn regex_metacharacters_in_symbols_are_escaped() {
        let patterns = ClassifyPatterns::new("operator+").unwrap();
        assert_eq!(patterns.classify("operator+(a, b)"), MatchKind::Call);
    }

    #[test]
    fn ripgrep_lines_keep_colons_in_text() {
        let m = parse_ripgrep_line("src/a.rs:10:5:let x: u32 = f();").unwrap();
        assert_eq!(m.path, "src/a.rs");
        assert_eq!(m.line, 10);
        assert_eq!(m.column, 5);
        assert_eq!(m.text, "let x: u32 = f();");
    }

    #[test]
    fn grep_lines_derive_a_column() {
        let m = parse_grep_line("/ws/b.py:3:    greet(name)", "greet").unwrap();
        assert_eq!(m.line, 3);
        assert_eq!(m.column, 5);
    }

    #[tokio::test]
    async fn finds_and_classifies_matches_in_a_workspace() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("lib.py"),
            "def greet(name):\n    return name\n\ngreet('x')\ngreeting = 1\n",
        )
        .unwrap();

        let outcome = search_workspace(dir.path(), "greet", 50).await.unwrap();

        // `greeting` must not match a word search for `greet`.
        assert_eq!(outcome.rows.len(), 2);
        assert!(!outcome.truncated);
        let kinds: Vec<MatchKind> = outcome.rows.iter().map(|r| r.kind).collect();
        assert!(kinds.contains(&MatchKind::Declaration));
        assert!(kinds.contains(&MatchKind::Call));
        assert!(outcome.rows.iter().all(|r| r.uri.starts_with("file://")));
    }

    #[tokio::test]
    async fn caps_matches_and_reports_truncation() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("many.js"),
            "ping();\nping();\nping();\nping();\nping();\n",
        )
        .unwrap();

        let outcome = search_workspace(dir.path(), "ping", 3).await.unwrap();

        assert_eq!(outcome.rows.len(), 3);
        assert!(outcome.truncated);
    }

    #[tokio::test]
    async fn absent_symbol_is_an_empty_outcome() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn main() {}\n").unwrap();

        let outcome = search_workspace(dir.path(), "nonexistent_symbol", 10).await.unwrap();

        assert!(outcome.rows.is_empty());
        assert!(!outcome.truncated);
    }
}
