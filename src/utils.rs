//! Utility functions for common operations.

/// Makes a title safe to use as a single path component.
///
/// Keeps alphanumeric characters (any script), spaces, `-` and `_`, drops
/// everything else and trims the result. Falls back to `fallback` when
/// nothing survives.
pub fn safe_path_component(name: &str, fallback: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() {
        fallback.to_string()
    } else {
        cleaned.to_string()
    }
}

/// First `len` characters of an id with non-alphanumerics replaced by `_`.
pub fn short_id(id: &str, len: usize) -> String {
    id.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .take(len)
        .collect()
}
