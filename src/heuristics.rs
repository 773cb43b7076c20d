//! Line-level lexical heuristics.
//!
//! Deliberately shallow: no grammar, just enough quote and comment tracking
//! to keep grep hits out of string literals and `//` comments. Identifier
//! characters are ASCII alphanumerics plus underscore, which also keeps all
//! byte offsets on UTF-8 character boundaries.

fn is_word(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn line_at(text: &str, line0: u32) -> Option<&str> {
    text.split('\n').nth(line0 as usize)
}

/// Counts the backslash run directly before `pos`; an odd run means the
/// quote at `pos` is escaped.
fn is_escaped_quote(bytes: &[u8], pos: usize) -> bool {
    let mut backslashes = 0usize;
    let mut k = pos;
    while k > 0 && bytes[k - 1] == b'\\' {
        backslashes += 1;
        k -= 1;
    }
    backslashes % 2 == 1
}

/// Returns the identifier-like token touching (or immediately left of) the
/// zero-based cursor position, or `None` when the cursor sits on a
/// non-identifier boundary with no adjacent token.
pub fn word_at(text: &str, line0: u32, ch0: u32) -> Option<&str> {
    let line = line_at(text, line0)?;
    let bytes = line.as_bytes();

    let mut l = (ch0 as usize).min(bytes.len());
    if l > 0 && l == bytes.len() {
        l -= 1;
    }
    // Snap left onto a token when the cursor sits just past its last char.
    while l > 0 && !is_word(bytes[l]) && is_word(bytes[l - 1]) {
        l -= 1;
    }

    let mut start = l;
    while start > 0 && is_word(bytes[start - 1]) {
        start -= 1;
    }
    let mut end = l;
    while end < bytes.len() && is_word(bytes[end]) {
        end += 1;
    }
    if end <= start {
        return None;
    }
    Some(&line[start..end])
}

/// Whether the zero-based cursor position falls at or after an unquoted `//`
/// marker on its line.
pub fn is_in_line_comment(text: &str, line0: u32, ch0: u32) -> bool {
    let Some(line) = line_at(text, line0) else {
        return false;
    };
    let bytes = line.as_bytes();
    let col = (ch0 as usize).min(bytes.len());

    let mut in_string = false;
    let mut j = 0;
    while j + 1 < bytes.len() {
        if bytes[j] == b'"' && !is_escaped_quote(bytes, j) {
            in_string = !in_string;
        }
        if !in_string && bytes[j] == b'/' && bytes[j + 1] == b'/' {
            return col >= j;
        }
        j += 1;
    }
    false
}

/// Zero-based column of the first occurrence of `needle` that is not inside
/// a double-quoted string, or `None` when the line is a whole-line comment
/// or every occurrence is quoted.
pub fn find_match_column(line: &str, needle: &str) -> Option<u32> {
    if needle.is_empty() {
        return Some(0);
    }
    let bytes = line.as_bytes();

    let first = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    if bytes[first..].starts_with(b"//") {
        return None;
    }

    let finder = memchr::memmem::Finder::new(needle.as_bytes());
    let mut from = 0usize;
    while let Some(off) = finder.find(&bytes[from..]) {
        let pos = from + off;
        let mut in_string = false;
        for j in 0..pos {
            if bytes[j] == b'"' && !is_escaped_quote(bytes, j) {
                in_string = !in_string;
            }
        }
        if !in_string {
            return Some(pos as u32);
        }
        from = pos + 1;
    }
    None
}

/// C/C++ keywords that are never worth grepping for. Sorted for binary
/// search; compared case-insensitively.
const STOPWORDS: &[&str] = &[
    "alignas",
    "alignof",
    "asm",
    "auto",
    "bool",
    "break",
    "case",
    "catch",
    "char",
    "char16_t",
    "char32_t",
    "char8_t",
    "class",
    "co_await",
    "co_return",
    "co_yield",
    "concept",
    "const",
    "consteval",
    "constexpr",
    "constinit",
    "continue",
    "decltype",
    "default",
    "delete",
    "do",
    "double",
    "dynamic_cast",
    "else",
    "enum",
    "explicit",
    "export",
    "extern",
    "false",
    "float",
    "for",
    "friend",
    "goto",
    "if",
    "inline",
    "int",
    "long",
    "mutable",
    "namespace",
    "new",
    "noexcept",
    "nullptr",
    "operator",
    "private",
    "protected",
    "public",
    "register",
    "reinterpret_cast",
    "requires",
    "return",
    "short",
    "signed",
    "sizeof",
    "static",
    "static_assert",
    "static_cast",
    "struct",
    "switch",
    "template",
    "this",
    "thread_local",
    "throw",
    "true",
    "try",
    "typedef",
    "typeid",
    "typename",
    "union",
    "unsigned",
    "using",
    "virtual",
    "void",
    "volatile",
    "wchar_t",
    "while",
];

/// Empty tokens count as stopwords so callers can short-circuit on both.
pub fn is_stop_word(sym: &str) -> bool {
    if sym.is_empty() {
        return true;
    }
    let lower = sym.to_ascii_lowercase();
    STOPWORDS.binary_search(&lower.as_str()).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_at_inside_token() {
        let text = "int compute(int x);\ncompute(5);";
        assert_eq!(word_at(text, 0, 5), Some("compute"));
        assert_eq!(word_at(text, 1, 0), Some("compute"));
        assert_eq!(word_at(text, 1, 3), Some("compute"));
    }

    #[test]
    fn test_word_at_snaps_left_of_cursor() {
        // Cursor just past the token still resolves it.
        let text = "foo(bar)";
        assert_eq!(word_at(text, 0, 3), Some("foo"));
        assert_eq!(word_at(text, 0, 8), Some("bar"));
    }

    #[test]
    fn test_word_at_boundary_without_token() {
        assert_eq!(word_at("a + b", 0, 2), None);
        assert_eq!(word_at("", 0, 0), None);
        assert_eq!(word_at("xyz", 5, 0), None);
    }

    #[test]
    fn test_line_comment_detection() {
        let text = "int x = 1; // trailing note";
        assert!(!is_in_line_comment(text, 0, 4));
        assert!(is_in_line_comment(text, 0, 14));
        assert!(is_in_line_comment(text, 0, 11));
    }

    #[test]
    fn test_line_comment_marker_inside_string() {
        let text = r#"const char* url = "http://example.com"; // real"#;
        assert!(!is_in_line_comment(text, 0, 25));
        assert!(is_in_line_comment(text, 0, 42));
    }

    #[test]
    fn test_find_match_column_plain() {
        assert_eq!(find_match_column("int needle = 1;", "needle"), Some(4));
        assert_eq!(find_match_column("no hit here", "needle"), None);
    }

    #[test]
    fn test_find_match_column_comment_line() {
        assert_eq!(find_match_column("// needle here", "needle"), None);
        assert_eq!(find_match_column("   // needle", "needle"), None);
    }

    #[test]
    fn test_find_match_column_quoted_only() {
        assert_eq!(find_match_column(r#"auto x = "needle";"#, "needle"), None);
    }

    #[test]
    fn test_find_match_column_prefers_unquoted_occurrence() {
        let line = r#"log("needle"); needle = 1;"#;
        assert_eq!(find_match_column(line, "needle"), Some(15));
    }

    #[test]
    fn test_find_match_column_escaped_quote() {
        // The \" does not close the string, so the needle is still quoted.
        assert_eq!(find_match_column(r#"x = "a\"needle";"#, "needle"), None);
        // Double backslash closes the escape; the quote ends the string.
        assert_eq!(
            find_match_column(r#"x = "a\\"; needle = 2;"#, "needle"),
            Some(11)
        );
    }

    #[test]
    fn test_stopwords() {
        assert!(is_stop_word("return"));
        assert!(is_stop_word("RETURN"));
        assert!(is_stop_word(""));
        assert!(!is_stop_word("compute"));
        assert!(!is_stop_word("returned"));
    }

    #[test]
    fn test_stopwords_sorted_for_binary_search() {
        for pair in STOPWORDS.windows(2) {
            assert!(pair[0] < pair[1], "{} >= {}", pair[0], pair[1]);
        }
    }
}
