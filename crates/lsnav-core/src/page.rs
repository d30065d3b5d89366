//! Pagination arithmetic for the two windowing tiers: item-level pages over
//! gathered result lists, and character-level windows over the serialized
//! payload. Both are computed on demand and never stored.

use serde::Serialize;

/// Item-level page window. `page` is 1-based and clamped into range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageWindow {
    pub page: usize,
    pub total_pages: usize,
    pub items_per_page: usize,
    pub total_items: usize,
    pub has_more: bool,
    #[serde(skip)]
    pub start: usize,
    #[serde(skip)]
    pub end: usize,
}

pub fn page_window(total_items: usize, page: usize, items_per_page: usize) -> PageWindow {
    let items_per_page = items_per_page.max(1);
    let total_pages = total_items.div_ceil(items_per_page).max(1);
    let page = page.clamp(1, total_pages);
    let start = (page - 1) * items_per_page;
    let end = (start + items_per_page).min(total_items);
    PageWindow {
        page,
        total_pages,
        items_per_page,
        total_items,
        has_more: page < total_pages,
        start,
        end,
    }
}

/// Character window over a serialized payload of `total_chars` characters.
///
/// Explicit `offset`/`length` are honored exactly; the defaults are offset 0
/// and a length equal to `budget`. `char_length` is the number of characters
/// actually covered, so `has_more` is true iff the window ends before
/// `total_chars`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CharWindow {
    pub char_offset: usize,
    pub char_length: usize,
    pub total_chars: usize,
    pub has_more: bool,
}

pub fn char_window(
    total_chars: usize,
    offset: Option<usize>,
    length: Option<usize>,
    budget: usize,
) -> CharWindow {
    let char_offset = offset.unwrap_or(0);
    let requested = length.unwrap_or(budget).max(1);
    let available = total_chars.saturating_sub(char_offset);
    let char_length = requested.min(available);
    CharWindow {
        char_offset,
        char_length,
        total_chars,
        has_more: char_offset + char_length < total_chars,
    }
}

/// Slice `text` by character offsets (not bytes), so windows never split a
/// code point.
pub fn slice_chars(text: &str, offset: usize, length: usize) -> &str {
    let mut indices = text.char_indices().skip(offset);
    let Some((start, _)) = indices.next() else {
        return "";
    };
    match text[start..].char_indices().nth(length) {
        Some((end, _)) => &text[start..start + end],
        None => &text[start..],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_page_when_under_limit() {
        let w = page_window(5, 1, 30);
        assert_eq!(w.total_pages, 1);
        assert_eq!((w.start, w.end), (0, 5));
        assert!(!w.has_more);
    }

    #[test]
    fn empty_list_still_has_one_page() {
        let w = page_window(0, 1, 30);
        assert_eq!(w.total_pages, 1);
        assert_eq!((w.start, w.end), (0, 0));
        assert!(!w.has_more);
    }

    #[test]
    fn page_is_clamped_into_range() {
        let w = page_window(10, 99, 3);
        assert_eq!(w.page, 4);
        assert_eq!((w.start, w.end), (9, 10));
        assert!(!w.has_more);

        let w = page_window(10, 0, 3);
        assert_eq!(w.page, 1);
    }

    #[test]
    fn concatenated_pages_reproduce_the_full_list() {
        let items: Vec<usize> = (0..47).collect();
        let per_page = 10;
        let mut rebuilt = Vec::new();
        let mut page = 1;
        loop {
            let w = page_window(items.len(), page, per_page);
            rebuilt.extend_from_slice(&items[w.start..w.end]);
            if !w.has_more {
                break;
            }
            page += 1;
        }
        assert_eq!(rebuilt, items);
    }

    #[test]
    fn char_window_defaults_to_budget_at_offset_zero() {
        let w = char_window(1_000, None, None, 300);
        assert_eq!(w.char_offset, 0);
        assert_eq!(w.char_length, 300);
        assert!(w.has_more);
    }

    #[test]
    fn char_window_honors_explicit_offset_and_length() {
        let w = char_window(1_000, Some(990), Some(50), 300);
        assert_eq!(w.char_offset, 990);
        assert_eq!(w.char_length, 10);
        assert!(!w.has_more);
    }

    #[test]
    fn char_window_past_end_is_empty() {
        let w = char_window(100, Some(500), None, 300);
        assert_eq!(w.char_length, 0);
        assert!(!w.has_more);
    }

    #[test]
    fn char_windows_concatenate_to_the_original() {
        let text: String = ('a'..='z').cycle().take(1_000).collect();
        let budget = 333;
        let mut rebuilt = String::new();
        let mut offset = 0;
        loop {
            let w = char_window(text.chars().count(), Some(offset), None, budget);
            rebuilt.push_str(slice_chars(&text, w.char_offset, w.char_length));
            if !w.has_more {
                break;
            }
            offset += w.char_length;
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn slice_chars_respects_code_points() {
        let text = "a\u{1F600}b\u{1F600}c";
        assert_eq!(slice_chars(text, 1, 2), "\u{1F600}b");
        assert_eq!(slice_chars(text, 0, 50), text);
        assert_eq!(slice_chars(text, 50, 2), "");
    }
}
