//! First-pass structural repair of raw LLM output
//!
//! LLMs wrap JSON in markdown fences, preface it with commentary, and
//! emit positional-token backslashes without JSON escaping. These fixes
//! run before schema validation; anything they cannot recover fails
//! validation and enters the re-prompt repair protocol.

use regex::Regex;
use std::sync::OnceLock;

fn code_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json)?\s*\n?(.*?)```").expect("code block pattern is valid")
    })
}

fn json_object_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)\{[^{}]*(?:\{[^{}]*\}[^{}]*)*\}").expect("json object pattern is valid")
    })
}

fn parses(text: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(text).is_ok()
}

/// Extract JSON from a raw response, tolerating markdown and commentary
///
/// Tries, in order: the text as-is, each fenced code block, each
/// top-level `{...}` span. Returns the original (trimmed) text when
/// nothing parses; the caller's validation will report it.
pub fn extract_json_from_response(text: &str) -> String {
    let trimmed = text.trim();
    if parses(trimmed) {
        return trimmed.to_string();
    }

    for capture in code_block_re().captures_iter(text) {
        let candidate = capture[1].trim();
        if parses(candidate) {
            return candidate.to_string();
        }
    }

    for matched in json_object_re().find_iter(text) {
        let candidate = matched.as_str().trim();
        if parses(candidate) {
            return candidate.to_string();
        }
    }

    trimmed.to_string()
}

/// Fix unescaped positional-token backslashes inside `"text"` fields
///
/// A lone `\1` in a JSON string is invalid (or, if the model emitted the
/// control character, unrepresentable); this rewrites `\<digits>` to
/// `\\<digits>` and stray control characters to their `\\<code>` spelling
/// inside `"text": "..."` values, leaving the JSON structure untouched.
pub fn fix_token_escaping(text: &str) -> String {
    static FIELD_RE: OnceLock<Regex> = OnceLock::new();
    let field_re = FIELD_RE
        .get_or_init(|| Regex::new(r#""text"\s*:\s*""#).expect("text field pattern is valid"));

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;

    while let Some(found) = field_re.find_at(text, cursor) {
        out.push_str(&text[cursor..found.end()]);

        // Field content runs to the next quote; repair escaping inside it.
        let content_start = found.end();
        let content_end = text[content_start..]
            .find('"')
            .map(|offset| content_start + offset)
            .unwrap_or(text.len());

        out.push_str(&fix_content(&text[content_start..content_end]));
        cursor = content_end;
    }

    out.push_str(&text[cursor..]);
    out
}

fn fix_content(content: &str) -> String {
    let mut fixed = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if chars.peek() == Some(&'\\') {
                    // Already escaped; copy the pair untouched.
                    fixed.push('\\');
                    fixed.push('\\');
                    chars.next();
                } else if chars.peek().is_some_and(|next| next.is_ascii_digit()) {
                    fixed.push_str("\\\\");
                } else {
                    fixed.push('\\');
                }
            }
            // Control characters produced by an unescaped \1 etc.; keep
            // \t, \n and \r which are legitimate whitespace.
            c if (c as u32) < 0x20 && !matches!(c, '\t' | '\n' | '\r') => {
                fixed.push_str(&format!("\\\\{}", c as u32));
            }
            c => fixed.push(c),
        }
    }

    fixed
}
