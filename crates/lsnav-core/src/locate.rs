use std::collections::HashSet;

#[derive(Debug, Clone, Copy)]
pub struct LocateLimits {
    /// How many lines above/below the hint are searched before giving up.
    pub radius_lines: u32,
}

impl Default for LocateLimits {
    fn default() -> Self {
        Self { radius_lines: 20 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolPosition {
    pub line: u32,
    /// UTF-16 code unit offset within the line.
    pub character: u32,
}

/// A successful resolution, with how far the match drifted from the hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolHit {
    pub position: SymbolPosition,
    /// Distance in lines between the (clamped) hint and the matched line.
    pub drift: u32,
    /// True when the hint pointed past the end of the file and was clamped.
    pub hint_clamped: bool,
}

/// Find `symbol_name` near `line_hint` (0-based) as a token-boundary match.
///
/// The hint line is scanned first; misses widen outward one line at a time,
/// above before below at each distance, within `radius_lines`. `None` is a
/// normal outcome (stale hint, renamed symbol), not an error.
pub fn locate_symbol(
    content: &str,
    symbol_name: &str,
    line_hint: u32,
    limits: LocateLimits,
) -> Option<SymbolHit> {
    if symbol_name.is_empty() {
        return None;
    }
    let spans = compute_line_spans(content);
    if spans.is_empty() {
        return None;
    }

    let total = spans.len() as u32;
    let hint = clamp_line(line_hint, spans.len());
    let hint_clamped = hint != line_hint;

    let mut tried = HashSet::<u32>::new();
    let mut candidates = Vec::with_capacity((limits.radius_lines as usize) * 2 + 1);
    candidates.push(hint);
    for d in 1..=limits.radius_lines {
        if let Some(above) = hint.checked_sub(d) {
            candidates.push(above);
        }
        let below = hint + d;
        if below < total {
            candidates.push(below);
        }
    }

    for line in candidates {
        if !tried.insert(line) {
            continue;
        }
        let (start, end) = spans[line as usize];
        let line_text = &content[start..end];
        if let Some(byte_offset) = find_token(line_text, symbol_name) {
            return Some(SymbolHit {
                position: SymbolPosition {
                    line,
                    character: utf16_len(&line_text[..byte_offset]),
                },
                drift: line.abs_diff(hint),
                hint_clamped,
            });
        }
    }

    None
}

/// Byte offset of the leftmost token-boundary occurrence of `needle`.
fn find_token(line: &str, needle: &str) -> Option<usize> {
    let mut search_from = 0usize;
    while let Some(rel) = line[search_from..].find(needle) {
        let at = search_from + rel;
        let before_ok = line[..at].chars().next_back().is_none_or(|c| !is_ident_char(c));
        let after_ok = line[at + needle.len()..]
            .chars()
            .next()
            .is_none_or(|c| !is_ident_char(c));
        if before_ok && after_ok {
            return Some(at);
        }
        search_from = at + needle.len().max(1);
    }
    None
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn compute_line_spans(content: &str) -> Vec<(usize, usize)> {
    let bytes = content.as_bytes();
    let mut spans = Vec::new();
    let mut start = 0usize;
    for (i, b) in bytes.iter().enumerate() {
        if *b == b'\n' {
            let mut end = i;
            if end > start && bytes[end - 1] == b'\r' {
                end -= 1;
            }
            spans.push((start, end));
            start = i + 1;
        }
    }
    if start <= content.len() {
        let mut end = content.len();
        if end > start && bytes[end - 1] == b'\n' {
            end -= 1;
        }
        if end > start && bytes[end - 1] == b'\r' {
            end -= 1;
        }
        spans.push((start, end));
    }
    spans
}

fn clamp_line(line: u32, total_lines: usize) -> u32 {
    if total_lines == 0 {
        return 0;
    }
    line.min((total_lines - 1) as u32)
}

fn utf16_len(text: &str) -> u32 {
    text.chars().map(|c| c.len_utf16() as u32).sum()
}
