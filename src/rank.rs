//! Heuristic ranking of raw grep matches.
//!
//! The scoring approximates "this line looks like a declaration, definition
//! or macro, not a call site". The weights are empirical; the ordering is a
//! deterministic total order so results are reproducible.

use std::path::{Path, PathBuf};

use crate::search::GrepMatch;

/// `#define NAME ...` with the needle exactly at the name position.
pub const SCORE_MACRO_DEFINITION: i32 = 100;
/// Token preceded by line start or whitespace (not embedded mid-identifier).
pub const SCORE_BOUNDARY_BEFORE: i32 = 25;
/// Previous non-space char is `>` (template/generic type context).
pub const SCORE_CLOSING_ANGLE_BEFORE: i32 = 20;
/// Token immediately followed by `;` (e.g. `int foo;`).
pub const SCORE_SEMICOLON_AFTER: i32 = 40;
/// Token followed, after optional whitespace, by `(`.
pub const SCORE_PAREN_AFTER: i32 = 60;
/// Function-like token additionally preceded by a primitive type keyword.
pub const SCORE_PRIMITIVE_BEFORE_PAREN: i32 = 30;
/// Match in the same file as the originating request.
pub const SCORE_SAME_FILE: i32 = 10;

/// Minimum score treated as "confidently a definition". A lone candidate at
/// or above this collapses go-to-definition to a single location.
pub const STRONG_DEFINITION_SCORE: i32 = 60;

#[derive(Debug, Clone)]
pub struct RankedMatch {
    pub m: GrepMatch,
    pub score: i32,
    /// Normalized absolute path; the sort tie-break key after score.
    pub abs_path: PathBuf,
}

/// Primitive and fixed-width type keywords that boost function-like matches
/// (`int foo(` over `foo(`). Sorted; compared lowercased.
const PRIMITIVE_TYPES: &[&str] = &[
    "bool",
    "char",
    "char16_t",
    "char32_t",
    "char8_t",
    "double",
    "float",
    "int",
    "int16_t",
    "int32_t",
    "int64_t",
    "int8_t",
    "intptr_t",
    "long",
    "s16",
    "s32",
    "s64",
    "s8",
    "short",
    "signed",
    "size_t",
    "ssize_t",
    "u16",
    "u32",
    "u64",
    "u8",
    "uint16_t",
    "uint32_t",
    "uint64_t",
    "uint8_t",
    "uintptr_t",
    "unsigned",
    "void",
    "wchar_t",
];

fn is_ws_or_bol_before(bytes: &[u8], col0: usize) -> bool {
    if col0 == 0 {
        return true;
    }
    matches!(bytes[col0 - 1], b' ' | b'\t')
}

/// Start column of the macro name if the line has the shape
/// `#define <name> ...`, otherwise `None`.
fn macro_name_start(line: &str) -> Option<usize> {
    let bytes = line.as_bytes();
    let mut i = 0usize;
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    if i >= bytes.len() || bytes[i] != b'#' {
        return None;
    }
    i += 1;
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    let define = b"define";
    if !bytes[i..].starts_with(define) {
        return None;
    }
    i += define.len();
    if i < bytes.len() && !bytes[i].is_ascii_whitespace() {
        return None;
    }
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    if i >= bytes.len() {
        return None;
    }
    Some(i)
}

fn prev_non_space(bytes: &[u8], before: usize) -> Option<u8> {
    let mut k = before.min(bytes.len());
    while k > 0 {
        let c = bytes[k - 1];
        if c != b' ' && c != b'\t' {
            return Some(c);
        }
        k -= 1;
    }
    None
}

/// Walks left from `before`: skips whitespace, then type punctuation
/// (`* & : < > , (`), then whitespace again, then collects the identifier.
/// Lowercased so the primitive lookup is case-insensitive.
fn prev_identifier(bytes: &[u8], before: usize) -> Option<String> {
    let mut k = before.min(bytes.len());
    while k > 0 && matches!(bytes[k - 1], b' ' | b'\t') {
        k -= 1;
    }
    while k > 0 && matches!(bytes[k - 1], b'*' | b'&' | b':' | b'<' | b'>' | b',' | b'(') {
        k -= 1;
    }
    while k > 0 && matches!(bytes[k - 1], b' ' | b'\t') {
        k -= 1;
    }
    let end = k;
    while k > 0 && (bytes[k - 1].is_ascii_alphanumeric() || bytes[k - 1] == b'_') {
        k -= 1;
    }
    if end <= k {
        return None;
    }
    let tok = std::str::from_utf8(&bytes[k..end]).ok()?;
    Some(tok.to_ascii_lowercase())
}

/// Declaration-likelihood score for one occurrence of `needle` at zero-based
/// column `col0` of `line`.
pub fn score_match_line(line: &str, col0: usize, needle: &str) -> i32 {
    let bytes = line.as_bytes();
    let mut score = 0;

    if macro_name_start(line) == Some(col0) {
        score += SCORE_MACRO_DEFINITION;
    }
    if is_ws_or_bol_before(bytes, col0) {
        score += SCORE_BOUNDARY_BEFORE;
    }
    if prev_non_space(bytes, col0) == Some(b'>') {
        score += SCORE_CLOSING_ANGLE_BEFORE;
    }

    let end = (col0 + needle.len()).min(bytes.len());
    if end < bytes.len() && bytes[end] == b';' {
        score += SCORE_SEMICOLON_AFTER;
    }

    let mut j = end;
    while j < bytes.len() && matches!(bytes[j], b' ' | b'\t') {
        j += 1;
    }
    if j < bytes.len() && bytes[j] == b'(' {
        score += SCORE_PAREN_AFTER;
        if let Some(prev) = prev_identifier(bytes, col0) {
            if PRIMITIVE_TYPES.binary_search(&prev.as_str()).is_ok() {
                score += SCORE_PRIMITIVE_BEFORE_PAREN;
            }
        }
    }

    score
}

/// Scores, filters and orders raw matches.
///
/// Drops matches with no usable column (comment/string-only occurrences) and
/// the match sitting on the originating cursor line itself. Ordering: score
/// descending, then absolute path, line, column ascending; the sort is
/// stable for fully identical keys.
pub fn rank_and_filter(
    matches: Vec<GrepMatch>,
    needle: &str,
    current: Option<(&Path, u32)>,
    prefer_path: Option<&Path>,
    mut absolutize: impl FnMut(&Path) -> PathBuf,
) -> Vec<RankedMatch> {
    let mut out = Vec::with_capacity(matches.len());
    for m in matches {
        let Some(column) = m.column else {
            continue;
        };
        let abs_path = absolutize(Path::new(&m.path));
        if let Some((cur_path, cur_line1)) = current {
            // The user is already on this line; pointing back at it is noise.
            if abs_path == cur_path && m.line == cur_line1 {
                continue;
            }
        }
        let mut score = score_match_line(&m.text, column as usize, needle);
        if prefer_path.is_some_and(|p| abs_path == p) {
            score += SCORE_SAME_FILE;
        }
        out.push(RankedMatch { m, score, abs_path });
    }

    out.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.abs_path.cmp(&b.abs_path))
            .then_with(|| a.m.line.cmp(&b.m.line))
            .then_with(|| a.m.column.cmp(&b.m.column))
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grep_match(path: &str, line: u32, text: &str, needle: &str) -> GrepMatch {
        GrepMatch {
            path: path.to_string(),
            line,
            column: crate::heuristics::find_match_column(text, needle),
            text: text.to_string(),
        }
    }

    fn identity_abs(p: &Path) -> PathBuf {
        p.to_path_buf()
    }

    #[test]
    fn test_macro_definition_outscores_reference() {
        let def = score_match_line("#define FOO 1", 8, "FOO");
        let use_site = score_match_line("x = FOO;", 4, "FOO");
        assert!(def > use_site, "define={def} use={use_site}");
    }

    #[test]
    fn test_macro_name_start_variants() {
        assert_eq!(macro_name_start("#define FOO 1"), Some(8));
        assert_eq!(macro_name_start("  #  define  FOO"), Some(13));
        assert_eq!(macro_name_start("#defineFOO"), None);
        assert_eq!(macro_name_start("#include <x.h>"), None);
        assert_eq!(macro_name_start("#define"), None);
    }

    #[test]
    fn test_function_definition_scores() {
        // boundary (25) + paren (60) + primitive return type (30)
        assert_eq!(
            score_match_line("int compute(int x) {", 4, "compute"),
            SCORE_BOUNDARY_BEFORE + SCORE_PAREN_AFTER + SCORE_PRIMITIVE_BEFORE_PAREN
        );
        // call site at line start: boundary (25) + paren (60)
        assert_eq!(
            score_match_line("compute(5);", 0, "compute"),
            SCORE_BOUNDARY_BEFORE + SCORE_PAREN_AFTER
        );
    }

    #[test]
    fn test_declaration_semicolon_and_template_context() {
        assert_eq!(
            score_match_line("int foo;", 4, "foo"),
            SCORE_BOUNDARY_BEFORE + SCORE_SEMICOLON_AFTER
        );
        assert_eq!(
            score_match_line("std::vector<int> items(3);", 17, "items"),
            SCORE_CLOSING_ANGLE_BEFORE + SCORE_PAREN_AFTER
        );
    }

    #[test]
    fn test_embedded_token_gets_no_boundary_bonus() {
        assert_eq!(score_match_line("myfoo = 1", 2, "foo"), 0);
    }

    #[test]
    fn test_rank_filters_unknown_columns_and_self_match() {
        let matches = vec![
            grep_match("/w/a.cpp", 3, "// foo in a comment", "foo"),
            grep_match("/w/a.cpp", 5, "int foo;", "foo"),
            grep_match("/w/b.cpp", 7, "foo();", "foo"),
        ];
        let ranked = rank_and_filter(
            matches,
            "foo",
            Some((Path::new("/w/a.cpp"), 5)),
            None,
            identity_abs,
        );
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].abs_path, PathBuf::from("/w/b.cpp"));
    }

    #[test]
    fn test_rank_same_file_preference_breaks_even_scores() {
        let matches = vec![
            grep_match("/w/z.cpp", 1, "int foo;", "foo"),
            grep_match("/w/a.cpp", 9, "int foo;", "foo"),
        ];
        let ranked = rank_and_filter(
            matches,
            "foo",
            None,
            Some(Path::new("/w/z.cpp")),
            identity_abs,
        );
        assert_eq!(ranked[0].abs_path, PathBuf::from("/w/z.cpp"));
        assert_eq!(ranked[0].score - ranked[1].score, SCORE_SAME_FILE);
    }

    #[test]
    fn test_rank_order_is_deterministic() {
        let matches = vec![
            grep_match("/w/b.cpp", 2, "foo = 1;", "foo"),
            grep_match("/w/a.cpp", 8, "foo = 2;", "foo"),
            grep_match("/w/a.cpp", 2, "foo = 3;", "foo"),
        ];
        let first = rank_and_filter(matches.clone(), "foo", None, None, identity_abs);
        let second = rank_and_filter(matches, "foo", None, None, identity_abs);

        let keys: Vec<_> = first.iter().map(|r| (r.abs_path.clone(), r.m.line)).collect();
        assert_eq!(
            keys,
            vec![
                (PathBuf::from("/w/a.cpp"), 2),
                (PathBuf::from("/w/a.cpp"), 8),
                (PathBuf::from("/w/b.cpp"), 2),
            ]
        );
        let keys2: Vec<_> = second.iter().map(|r| (r.abs_path.clone(), r.m.line)).collect();
        assert_eq!(keys, keys2);
    }

    #[test]
    fn test_primitive_list_sorted_for_binary_search() {
        for pair in PRIMITIVE_TYPES.windows(2) {
            assert!(pair[0] < pair[1], "{} >= {}", pair[0], pair[1]);
        }
    }
}
