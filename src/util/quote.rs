//! Quoting helpers for generated CMake text.
//!
//! CMake's bracket-free quoted arguments accept the same escapes as JSON
//! strings for the characters we emit, so JSON string encoding is used.

use std::path::Path;

use crate::util::fs::to_posix;

/// Quote a string as a CMake quoted argument.
pub fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Quote a path, normalized to forward slashes.
pub fn quote_path(path: &Path) -> String {
    quote_string(&to_posix(path))
}

/// Quote each item and join with `separator`.
pub fn quote_list<I, S>(items: I, separator: &str) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .map(|s| quote_string(s.as_ref()))
        .collect::<Vec<_>>()
        .join(separator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_string_matches_json() {
        for s in ["plain", "with \"quotes\"", "back\\slash", "multi\nline"] {
            assert_eq!(quote_string(s), serde_json::to_string(s).unwrap());
        }
    }

    #[test]
    fn test_quote_list() {
        assert_eq!(quote_list(["a", "b c"], " "), "\"a\" \"b c\"");
        assert_eq!(quote_list(Vec::<String>::new(), " "), "");
    }
}
