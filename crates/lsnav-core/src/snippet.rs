use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snippet {
    /// 0-based line number of the first line in `text`.
    pub start_line: u32,
    pub text: String,
    pub truncated: bool,
}

/// Extract the lines spanning `start_line..=end_line` plus `context_lines`
/// on each side, stopping early once `max_chars` characters are emitted.
pub fn extract_snippet(
    content: &str,
    start_line: u32,
    end_line: u32,
    context_lines: u32,
    max_chars: usize,
) -> Snippet {
    let lines: Vec<&str> = content.split_inclusive('\n').collect();
    if lines.is_empty() {
        return Snippet {
            start_line: 0,
            text: String::new(),
            truncated: false,
        };
    }

    let last = lines.len() - 1;
    let lo = (start_line.min(end_line) as usize).min(last);
    let hi = (start_line.max(end_line) as usize).min(last);
    let from = lo.saturating_sub(context_lines as usize);
    let to = (hi + context_lines as usize).min(last);

    let mut text = String::new();
    let mut emitted = 0usize;
    let mut truncated = false;
    for line in &lines[from..=to] {
        for ch in line.chars() {
            if emitted >= max_chars {
                truncated = true;
                break;
            }
            text.push(ch);
            emitted += 1;
        }
        if truncated {
            break;
        }
    }

    Snippet {
        start_line: from as u32,
        text,
        truncated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spans_range_with_context() {
        let content = "a\nb\nc\nd\ne\nf\n";
        let s = extract_snippet(content, 2, 3, 1, 100);
        assert_eq!(s.start_line, 1);
        assert_eq!(s.text, "b\nc\nd\ne\n");
        assert!(!s.truncated);
    }

    #[test]
    fn stops_at_char_budget() {
        let content = "0123456789\nabcdefghij\n";
        let s = extract_snippet(content, 0, 1, 0, 5);
        assert_eq!(s.text, "01234");
        assert!(s.truncated);
    }

    #[test]
    fn clamps_lines_past_eof() {
        let content = "only\n";
        let s = extract_snippet(content, 40, 50, 2, 100);
        assert_eq!(s.start_line, 0);
        assert_eq!(s.text, "only\n");
    }

    #[test]
    fn empty_content_yields_empty_snippet() {
        let s = extract_snippet("", 0, 0, 2, 100);
        assert!(s.text.is_empty());
        assert!(!s.truncated);
    }
}
