//! Completion cleanup.
//!
//! Turns raw model output into an executable SQL string by removing markdown
//! code-fence artifacts and surrounding whitespace. Purely textual: nothing
//! here checks SQL syntax.

const FENCE: &str = "```";

/// Removes code-fence markers and surrounding whitespace from a completion.
///
/// Handles both the language-tagged (```` ```sql ````) and the bare fence,
/// and pulls the first fenced block out of a reply that wraps it in prose.
/// The cleanup runs until nothing changes, so applying it twice gives the
/// same result as applying it once.
pub fn sanitize_sql(raw: &str) -> String {
    let mut current = raw.trim().to_string();
    loop {
        let next = strip_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn strip_once(text: &str) -> String {
    let text = text.trim();

    if !text.starts_with(FENCE) {
        if let Some(block) = extract_fenced_block(text) {
            return block.trim().to_string();
        }
    }

    let mut rest = text;
    if let Some(after) = rest.strip_prefix(FENCE) {
        rest = strip_language_tag(after);
    }
    if let Some(before) = rest.strip_suffix(FENCE) {
        rest = before;
    }
    rest.trim().to_string()
}

/// Drops the info string after an opening fence (`sql`, `SQLite`, or nothing).
fn strip_language_tag(after_fence: &str) -> &str {
    if let Some(rest) = strip_inline_sql_tag(after_fence) {
        return rest;
    }
    match after_fence.find('\n') {
        Some(newline) => {
            let tag = after_fence[..newline].trim();
            if is_language_tag(tag) {
                &after_fence[newline + 1..]
            } else {
                after_fence
            }
        }
        None => {
            let tag = after_fence.trim().trim_end_matches(FENCE).trim();
            if tag.eq_ignore_ascii_case("sql") {
                ""
            } else {
                after_fence
            }
        }
    }
}

/// Handles a `sql` tag followed by the query on the same line (```` ```sql SELECT 1``` ````).
fn strip_inline_sql_tag(after_fence: &str) -> Option<&str> {
    let tag = after_fence.get(..3)?;
    let rest = &after_fence[3..];
    (tag.eq_ignore_ascii_case("sql") && rest.starts_with([' ', '\t'])).then_some(rest)
}

fn is_language_tag(tag: &str) -> bool {
    tag.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Returns the body of the first fenced block that has a closing fence.
fn extract_fenced_block(text: &str) -> Option<&str> {
    let start = text.find(FENCE)?;
    let after_fence = &text[start + FENCE.len()..];
    let newline = after_fence.find('\n')?;
    if !is_language_tag(after_fence[..newline].trim()) {
        return None;
    }
    let body = &after_fence[newline + 1..];
    let end = body.find(FENCE)?;
    Some(&body[..end])
}
