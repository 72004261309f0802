//! URL slug generation.
//!
//! Every path segment derived from user text (post titles, file stems, tag
//! and category names) goes through [`slugify`]:
//!
//! - `"Hello World"` → `"hello-world"`
//! - `"Hello, World!"` → `"hello-world"`
//! - `"What's_new in v2.0"` → `"whats-new-in-v2-0"`
//! - `"Überblick"` → `"überblick"` (non-ASCII letters are kept)

/// Convert free text into a lowercase, hyphen-separated URL segment.
///
/// Letters and digits are kept (lowercased). Whitespace, dashes,
/// underscores, dots and slashes become a single `-`. Anything else is
/// dropped. Leading and trailing separators are trimmed.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_sep = false;

    for c in text.chars() {
        if c.is_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('-');
            }
            pending_sep = false;
            slug.extend(c.to_lowercase());
        } else if c.is_whitespace() || matches!(c, '-' | '_' | '.' | '/') {
            pending_sep = true;
        }
    }

    slug
}
