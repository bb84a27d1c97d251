use std::path::Path;

/// Escape a file path for use as a filter option value.
///
/// Backslashes become `/` so Windows paths survive; `:` `'` `,` `;` `[` `]`
/// separate options, filters, statements and pad labels in the graph.
pub fn escape_filter_path(path: &Path) -> String {
    let normalized = path.to_string_lossy().replace('\\', "/");
    let mut escaped = String::with_capacity(normalized.len() + 12);
    for ch in normalized.chars() {
        match ch {
            ':' => escaped.push_str("\\:"),
            '\'' => escaped.push_str("\\'"),
            ',' => escaped.push_str("\\,"),
            ';' => escaped.push_str("\\;"),
            '[' => escaped.push_str("\\["),
            ']' => escaped.push_str("\\]"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Escape text for a single-quoted drawtext `text` value.
///
/// Order matters: backslashes first, then quotes (closed, escaped and
/// reopened), then `:`, then `%` (doubled), then `;`. No later step
/// produces a character an earlier step escapes.
pub fn escape_drawtext(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('\'', "'\\''")
        .replace(':', "\\:")
        .replace('%', "%%")
        .replace(';', "\\;")
}

/// Wrap `text` at word boundaries into lines of at most `max_chars`.
///
/// A word longer than the budget gets a line of its own and is never split.
pub fn wrap_title(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if !current.is_empty() && needed > max_chars {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
