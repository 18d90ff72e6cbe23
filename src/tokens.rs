//! Protected-token analysis for translation strings
//!
//! A protected token is a substring that must survive translation
//! byte-for-byte: a double-curly interpolation variable (`{{name}}`) or a
//! backslash-digit positional reference (`\1`, `\2`, ...). Tokens are
//! extracted in a single left-to-right lexer pass; identity and count
//! matter, position does not.
//!
//! # Example
//!
//! ```ignore
//! use transmem::tokens::{signature, validate};
//!
//! assert_eq!(signature("Hej {{name}}"), "{{name}}:1");
//! let check = validate("Hej {{name}}", "Hello {{name}}");
//! assert!(check.valid);
//! ```

use std::collections::BTreeMap;

/// Multiset of protected tokens, keyed by token text.
///
/// A `BTreeMap` keeps iteration lexicographic, which makes every derived
/// artifact (signatures, diffs) deterministic.
pub type TokenCounts = BTreeMap<String, usize>;

/// Difference between two token multisets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenDiff {
    /// Tokens present in the source but absent (or undercounted) in the candidate
    pub missing: TokenCounts,
    /// Tokens present in the candidate but absent (or undercounted) in the source
    pub extra: TokenCounts,
}

/// Outcome of comparing a candidate translation against its source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenValidation {
    /// True iff the token multisets are exactly equal
    pub valid: bool,
    /// Per-token counts of what is missing and what is extra
    pub diff: TokenDiff,
}

/// Extract all protected tokens from a string
///
/// Single lexer pass, left to right:
/// - At `{{`, the span runs non-greedily to the first `}}`; nesting is not
///   recognized. An unterminated `{{` is literal text.
/// - At `\` followed by one or more ASCII digits, the maximal digit run
///   forms one token. A doubled backslash escapes itself, so `\\1` yields
///   no token. Backslash-digit sequences inside a recognized `{{...}}`
///   span are part of that span, never separate tokens.
///
/// # Returns
///
/// Map from token text to occurrence count.
pub fn extract_tokens(text: &str) -> TokenCounts {
    let mut tokens = TokenCounts::new();
    let bytes = text.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'{' && bytes.get(i + 1) == Some(&b'{') {
            if let Some(close) = find_subslice(&bytes[i + 2..], b"}}") {
                let end = i + 2 + close + 2;
                let token = &text[i..end];
                *tokens.entry(token.to_string()).or_insert(0) += 1;
                i = end;
                continue;
            }
            // Unterminated `{{` is plain text.
            i += 1;
        } else if bytes[i] == b'\\' {
            match bytes.get(i + 1) {
                Some(b'\\') => {
                    // Escaped backslash; neither half can start a token.
                    i += 2;
                }
                Some(c) if c.is_ascii_digit() => {
                    let mut end = i + 1;
                    while end < bytes.len() && bytes[end].is_ascii_digit() {
                        end += 1;
                    }
                    let token = &text[i..end];
                    *tokens.entry(token.to_string()).or_insert(0) += 1;
                    i = end;
                }
                _ => i += 1,
            }
        } else {
            // Advance one whole UTF-8 character.
            i += utf8_len(bytes[i]);
        }
    }

    tokens
}

/// Derive the canonical protected-token signature of a string
///
/// Empty when the string carries no tokens; otherwise each distinct token
/// is rendered as `TOKEN:COUNT`, entries are sorted lexicographically by
/// token text and joined with `|`. The signature is invariant to token
/// order and to any non-token text around them.
///
/// # Example
///
/// ```ignore
/// assert_eq!(signature("\\1 and {{name}}"), "\\1:1|{{name}}:1");
/// ```
pub fn signature(text: &str) -> String {
    let tokens = extract_tokens(text);
    if tokens.is_empty() {
        return String::new();
    }

    tokens
        .iter()
        .map(|(token, count)| format!("{}:{}", token, count))
        .collect::<Vec<_>>()
        .join("|")
}

/// Validate that a candidate translation preserves every protected token
///
/// Valid iff the token multisets of `source` and `candidate` are exactly
/// equal (same tokens, same counts). Never fails; callers build
/// human-readable messages from the returned diff.
pub fn validate(source: &str, candidate: &str) -> TokenValidation {
    let source_tokens = extract_tokens(source);
    let candidate_tokens = extract_tokens(candidate);

    let missing = multiset_subtract(&source_tokens, &candidate_tokens);
    let extra = multiset_subtract(&candidate_tokens, &source_tokens);

    TokenValidation {
        valid: missing.is_empty() && extra.is_empty(),
        diff: TokenDiff { missing, extra },
    }
}

/// Saturating multiset subtraction: counts in `a` exceeding those in `b`
fn multiset_subtract(a: &TokenCounts, b: &TokenCounts) -> TokenCounts {
    let mut out = TokenCounts::new();
    for (token, count) in a {
        let other = b.get(token).copied().unwrap_or(0);
        if *count > other {
            out.insert(token.clone(), count - other);
        }
    }
    out
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn utf8_len(first_byte: u8) -> usize {
    match first_byte {
        b if b < 0x80 => 1,
        b if b >= 0xF0 => 4,
        b if b >= 0xE0 => 3,
        _ => 2,
    }
}
