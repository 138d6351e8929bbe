//! Token matcher: the one place that knows what an evidence code looks like.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::types::Token;

/// Source of the code pattern, also printed by `evlink info`.
pub const CODE_PATTERN: &str = r"\[(?P<code>\d+\.\d+-\d{3})\]";

/// Bracketed code such as `[1.2-001]`: digits, dot, digits, dash, three digits.
/// No whitespace is tolerated inside the brackets.
static PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    return Regex::new(CODE_PATTERN).expect("valid regex");
});

/// Find every bracketed code in `text`, left to right, non-overlapping.
/// Returns an empty vector when nothing matches.
///
/// # Panics
///
/// Panics if the hardcoded code regex is invalid (compile-time invariant).
pub fn find_tokens(text: &str) -> Vec<Token> {
    return PATTERN
        .captures_iter(text)
        .filter_map(|cap| return token_from_capture(&cap))
        .collect();
}

/// Convert one regex capture into a token with its byte span.
fn token_from_capture(cap: &Captures<'_>) -> Option<Token> {
    let whole = cap.get(0)?;
    let code = cap.name("code")?;
    return Some(Token {
        code: code.as_str().to_string(),
        end: whole.end(),
        raw: whole.as_str().to_string(),
        start: whole.start(),
    });
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, reason = "tests")]
#[allow(clippy::indexing_slicing, reason = "tests")]
mod tests {
    use super::*;

    #[test]
    fn finds_codes_with_spans() {
        let text = "See [1.2-001] and [9.9-999] for details.";
        let tokens = find_tokens(text);

        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].code, "1.2-001");
        assert_eq!(tokens[0].raw, "[1.2-001]");
        assert_eq!(&text[tokens[0].start..tokens[0].end], "[1.2-001]");
        assert_eq!(tokens[1].code, "9.9-999");
        assert_eq!(&text[tokens[1].start..tokens[1].end], "[9.9-999]");
    }

    #[test]
    fn multi_digit_sections() {
        let tokens = find_tokens("[12.34-567]");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].code, "12.34-567");
    }

    #[test]
    fn suffix_must_be_exactly_three_digits() {
        assert!(find_tokens("[1.2-01]").is_empty());
        assert!(find_tokens("[1.2-0001]").is_empty());
    }

    #[test]
    fn rejects_internal_whitespace() {
        assert!(find_tokens("[ 1.2-001]").is_empty());
        assert!(find_tokens("[1.2 -001]").is_empty());
        assert!(find_tokens("[1.2-001 ]").is_empty());
    }

    #[test]
    fn rejects_missing_brackets() {
        assert!(find_tokens("1.2-001").is_empty());
        assert!(find_tokens("(1.2-001)").is_empty());
    }

    #[test]
    fn adjacent_tokens_do_not_overlap() {
        let tokens = find_tokens("[1.1-001][1.1-002]");
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].end, tokens[1].start);
    }

    #[test]
    fn offsets_are_bytes_after_multibyte_text() {
        let text = "Minh chứng [1.2-003].";
        let tokens = find_tokens(text);
        assert_eq!(tokens.len(), 1);
        assert_eq!(&text[tokens[0].start..tokens[0].end], "[1.2-003]");
    }

    #[test]
    fn empty_text_yields_nothing() {
        assert!(find_tokens("").is_empty());
    }
}
