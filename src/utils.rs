//! Small string helpers shared by the scrapers, the store and the CLI.

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to `max` bytes (backed off to a char boundary)
/// with an ellipsis and byte count indicator appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log("a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Keep at most `max` characters of `s`.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Collapse every whitespace run to a single space and trim the ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Convert a display name to a slug.
///
/// Lowercases the text, drops anything that is not alphanumeric, a space,
/// an underscore or a hyphen, then turns runs of spaces and hyphens into a
/// single hyphen.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(slugify("NIST NVD"), "nist-nvd");
/// assert_eq!(slugify("CERT-FR!"), "cert-fr");
/// ```
pub fn slugify(name: &str) -> String {
    let cleaned = name
        .to_lowercase()
        .replace(|c: char| !c.is_alphanumeric() && c != ' ' && c != '-' && c != '_', "");
    cleaned
        .split(|c: char| c == ' ' || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}
