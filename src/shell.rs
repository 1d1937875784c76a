//! Rendering argument vectors as shell text.

/// Characters that never need quoting in a POSIX shell word.
fn is_plain(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | '=' | ':' | '@' | ',' | '+')
}

/// Quote a single argument so a POSIX shell reads it back unchanged.
///
/// Plain words pass through; anything else is single-quoted with embedded
/// single quotes closed, escaped and reopened. Empty strings become `''`.
pub fn shell_quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    if s.chars().all(is_plain) {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', "'\\''"))
    }
}

/// Quote every token and join them into one pasteable command line.
pub fn quote_command<S: AsRef<str>>(tokens: &[S]) -> String {
    tokens
        .iter()
        .map(|t| shell_quote(t.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}
