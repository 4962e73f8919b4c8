//! Text helpers shared by the search implementations
//!
//! Matching is case-insensitive per character (simple lowercase folding) and
//! always reports byte ranges into the original text, so snippets can be
//! sliced without re-scanning.

/// Find the first case-insensitive occurrence of `needle` in `haystack`
///
/// Returns the byte range of the match in `haystack`. An empty needle never
/// matches.
pub fn find_ignore_case(haystack: &str, needle: &str) -> Option<(usize, usize)> {
    find_ignore_case_from(haystack, needle, 0)
}

/// Like [`find_ignore_case`], starting at byte offset `from`
///
/// `from` must lie on a character boundary.
pub fn find_ignore_case_from(haystack: &str, needle: &str, from: usize) -> Option<(usize, usize)> {
    if needle.is_empty() || from > haystack.len() {
        return None;
    }

    let folded: Vec<char> = needle.chars().flat_map(char::to_lowercase).collect();

    for (offset, _) in haystack[from..].char_indices() {
        let start = from + offset;
        if let Some(len) = match_at(&haystack[start..], &folded) {
            return Some((start, start + len));
        }
    }
    None
}

/// Iterate over every non-overlapping case-insensitive match
pub fn find_all_ignore_case<'a>(
    haystack: &'a str,
    needle: &'a str,
) -> impl Iterator<Item = (usize, usize)> + 'a {
    let mut cursor = 0;
    std::iter::from_fn(move || {
        let (start, end) = find_ignore_case_from(haystack, needle, cursor)?;
        cursor = end;
        Some((start, end))
    })
}

/// Byte length of the prefix of `text` matching the folded needle, if any
fn match_at(text: &str, folded: &[char]) -> Option<usize> {
    let mut pending = folded.iter();
    let mut consumed = 0;

    for c in text.chars() {
        for lower in c.to_lowercase() {
            match pending.next() {
                Some(expected) if *expected == lower => {}
                _ => return None,
            }
        }
        consumed += c.len_utf8();
        if pending.as_slice().is_empty() {
            return Some(consumed);
        }
    }
    None
}

/// Character index of byte offset `byte_idx` in `text`
pub fn char_offset(text: &str, byte_idx: usize) -> usize {
    text[..byte_idx.min(text.len())].chars().count()
}

/// Move `idx` back `chars` characters (stopping at 0)
fn back_chars(text: &str, idx: usize, chars: usize) -> usize {
    if chars == 0 {
        return idx;
    }
    text[..idx]
        .char_indices()
        .rev()
        .nth(chars - 1)
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Move `idx` forward `chars` characters (stopping at the end)
fn forward_chars(text: &str, idx: usize, chars: usize) -> usize {
    text[idx..]
        .char_indices()
        .nth(chars)
        .map(|(i, _)| idx + i)
        .unwrap_or(text.len())
}

/// Snippet of `radius` characters either side of the match, wrapped in `...`
pub fn snippet_around(text: &str, start: usize, end: usize, radius: usize) -> String {
    let from = back_chars(text, start, radius);
    let to = forward_chars(text, end, radius);
    format!("...{}...", &text[from..to])
}

/// Count whitespace-separated words
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
