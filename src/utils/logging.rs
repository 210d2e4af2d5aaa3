//! Output helpers that keep credentials and oversized payloads out of logs

/// Obscures a credential string by showing only the first few characters
///
/// # Examples
///
/// ```rust
/// use foundry_probe::utils::logging::obscure_credential;
///
/// assert_eq!(obscure_credential("3f9a1c0b7d2e4a6f"), "3f9a1***");
/// assert_eq!(obscure_credential("abc"), "***");
/// ```
pub fn obscure_credential(credential: &str) -> String {
    let char_count = credential.chars().count();
    if char_count <= 5 {
        "*".repeat(char_count)
    } else {
        format!("{}***", truncate_string(credential, 5))
    }
}

/// Truncates to at most `max_chars` characters on UTF-8 boundaries
pub fn truncate_string(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Like [`truncate_string`] but marks elided text with `...`
///
/// ```rust
/// use foundry_probe::utils::logging::preview;
///
/// assert_eq!(preview("def fibonacci(n):", 3), "def...");
/// assert_eq!(preview("short", 10), "short");
/// ```
pub fn preview(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        format!("{}...", truncate_string(s, max_chars))
    }
}

/// Replaces every occurrence of `secret` in `input` with its obscured form
pub fn redact(input: &str, secret: &str) -> String {
    if secret.is_empty() {
        return input.to_string();
    }
    input.replace(secret, &obscure_credential(secret))
}
