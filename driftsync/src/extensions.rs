//! Ignored-extension list parsing.

/// Parses a rule's ignored-extension field into normalized suffixes.
///
/// Accepts comma or whitespace separated tokens in any of the forms
/// `.png`, `png`, `*.png`. Tokens containing other glob characters are not
/// pure extension patterns and are dropped. The result is lowercased,
/// deduplicated, and every entry starts with a dot.
pub fn parse_ignore_extensions(raw: &str) -> Vec<String> {
    let raw = raw.trim().replace(',', " ");
    if raw.is_empty() {
        return Vec::new();
    }

    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for tok in raw.split_whitespace() {
        let mut tok = tok.trim();
        if tok.starts_with("*.") {
            tok = &tok[1..];
        }
        if tok.starts_with('*') || tok.contains(['*', '?', '[', ']']) {
            continue;
        }
        let normalized = if tok.starts_with('.') {
            tok.to_ascii_lowercase()
        } else {
            format!(".{}", tok.to_ascii_lowercase())
        };
        if normalized == "." {
            continue;
        }
        if seen.insert(normalized.clone()) {
            out.push(normalized);
        }
    }
    out
}

/// Returns true when `path` (already lowercased or not) ends with one of the
/// normalized suffixes.
pub fn is_ignored(path: &str, suffixes: &[String]) -> bool {
    if suffixes.is_empty() {
        return false;
    }
    let lower = path.to_ascii_lowercase();
    suffixes.iter().any(|ext| lower.ends_with(ext.as_str()))
}
