/// Lines of context shown around a matching line.
const CONTEXT_LINES: usize = 2;

/// Number of lines in a snippet when no line matches.
pub const DEFAULT_SNIPPET_LINES: usize = 6;

/// Maximum number of characters in a snippet before truncation.
pub const DEFAULT_SNIPPET_MAX_CHARS: usize = 400;

/// Query terms shorter than this are ignored when locating a snippet.
const MIN_TERM_LEN: usize = 3;

/// Extract a snippet around the first line mentioning any query term.
///
/// Returns `(snippet_text, start_line_number)` with a 1-indexed line number.
/// Without a matching line the first few non-empty lines are returned.
/// Returns `None` if the text has no content.
pub fn extract_snippet(text: &str, query: &str) -> Option<(String, usize)> {
    let lines: Vec<&str> = text.lines().collect();
    let first_content = lines.iter().position(|l| !l.trim().is_empty())?;

    let terms: Vec<String> = query
        .split_whitespace()
        .filter(|t| t.chars().count() >= MIN_TERM_LEN)
        .map(str::to_lowercase)
        .collect();

    let match_idx = lines.iter().position(|line| {
        let line = line.to_lowercase();
        terms.iter().any(|term| line.contains(term.as_str()))
    });

    let (start, end) = match match_idx {
        Some(idx) => (
            idx.saturating_sub(CONTEXT_LINES),
            (idx + CONTEXT_LINES + 1).min(lines.len()),
        ),
        None => (
            first_content,
            (first_content + DEFAULT_SNIPPET_LINES).min(lines.len()),
        ),
    };

    let snippet = truncate_chars(
        lines[start..end].join("\n").trim_end(),
        DEFAULT_SNIPPET_MAX_CHARS,
    );
    Some((snippet, start + 1))
}

/// Cut `text` to at most `max_chars` characters, marking the cut with `...`.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}
