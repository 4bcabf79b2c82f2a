//! core::naming
//!
//! Pool identifier sanitization.
//!
//! Pool identifiers can arrive from API callers, so they are never
//! interpolated into a filesystem path as-is. [`sanitize`] is the only
//! conversion from an identifier to a path component.

/// Token returned when nothing of the input survives filtering.
pub const FALLBACK_TOKEN: &str = "unknown";

/// Check whether a character may appear in a sanitized token.
pub fn is_safe_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

/// Convert an arbitrary identifier into a filesystem-safe token.
///
/// Keeps ASCII letters, digits, `-`, `_` and `.`; every other character
/// is dropped. An empty result becomes [`FALLBACK_TOKEN`]. Never fails.
///
/// # Example
///
/// ```
/// use pooltx::core::naming::sanitize;
///
/// assert_eq!(sanitize("pool-1"), "pool-1");
/// assert_eq!(sanitize("../../etc/passwd"), "....etcpasswd");
/// assert_eq!(sanitize("///"), "unknown");
/// ```
pub fn sanitize(id: &str) -> String {
    let token: String = id.chars().filter(|&c| is_safe_char(c)).collect();
    if token.is_empty() {
        FALLBACK_TOKEN.to_string()
    } else {
        token
    }
}

/// Check whether an identifier is already a sanitized token.
///
/// Used where an opaque id must be used verbatim as a file name and
/// rewriting it would silently change which file is addressed.
pub fn is_sanitized(id: &str) -> bool {
    sanitize(id) == id
}
