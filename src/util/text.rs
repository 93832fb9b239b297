use std::borrow::Cow;

/// Ellipsis appended by [`truncate_chars`]
const ELLIPSIS: &str = "...";

fn is_stripped_control(c: char) -> bool {
    c.is_control() && !matches!(c, '\t' | '\n' | '\r')
}

/// Removes control characters from untrusted feed and page text.
///
/// Tab, newline and carriage return are preserved. Returns `Cow::Borrowed`
/// when nothing needs stripping (the common case).
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(is_stripped_control) {
        return Cow::Borrowed(s);
    }

    Cow::Owned(s.chars().filter(|&c| !is_stripped_control(c)).collect())
}

/// Collapses every run of whitespace into a single space and trims the ends.
pub fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for word in s.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

/// Normalises a scraped text fragment: control chars stripped, whitespace
/// collapsed. Returns `None` when nothing but whitespace remains.
pub fn clean_text(s: &str) -> Option<String> {
    let cleaned = collapse_whitespace(&strip_control_chars(s));
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Truncates to at most `max_chars` characters, cutting at a word boundary
/// when one exists in the kept range and appending "...".
///
/// Strings that fit are borrowed unchanged.
pub fn truncate_chars(s: &str, max_chars: usize) -> Cow<'_, str> {
    if s.chars().count() <= max_chars {
        return Cow::Borrowed(s);
    }

    let keep = max_chars.saturating_sub(ELLIPSIS.len());
    let byte_end = s
        .char_indices()
        .nth(keep)
        .map(|(idx, _)| idx)
        .unwrap_or(s.len());
    let head = &s[..byte_end];
    let head = match head.rfind(char::is_whitespace) {
        Some(space) if space > 0 => &head[..space],
        _ => head,
    };

    Cow::Owned(format!("{}{}", head.trim_end(), ELLIPSIS))
}
