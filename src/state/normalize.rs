//! Cosmetic cleanup applied to free-text guesses before they are stored.
//!
//! The goal is to remove stylistic tells (missing capitals, sloppy
//! punctuation) so decoys read like the true response. Meaning is never
//! altered.

use std::sync::LazyLock;

use regex::Regex;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static SPACE_BEFORE_PUNCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+([,.;:!?])").unwrap());
static ELLIPSIS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.{3,}").unwrap());
static BANGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"!{2,}").unwrap());
static QUESTIONS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\?{2,}").unwrap());
static MIXED_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[!?]{3,}").unwrap());
static LEADING_LOWER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^([“"'(\[{]*\s*)([a-z])"#).unwrap());
static TRAILING_CLOSERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[”"')\]}]+$"#).unwrap());

/// Normalize a guess, truncating the result to `max_len` characters.
///
/// Returns an empty string when the input holds nothing but whitespace.
pub fn normalize_guess(input: &str, max_len: usize) -> String {
    let collapsed = WHITESPACE.replace_all(input, " ");
    let trimmed = collapsed.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let s = SPACE_BEFORE_PUNCT.replace_all(trimmed, "$1");
    let s = ELLIPSIS.replace_all(&s, "…");
    let s = BANGS.replace_all(&s, "!");
    let s = QUESTIONS.replace_all(&s, "?");
    let s = MIXED_RUN.replace_all(&s, |caps: &regex::Captures<'_>| {
        let run = &caps[0];
        if run.contains('?') && run.contains('!') {
            "?!".to_string()
        } else {
            run[..1].to_string()
        }
    });
    let s = LEADING_LOWER.replace(&s, |caps: &regex::Captures<'_>| {
        format!("{}{}", &caps[1], caps[2].to_ascii_uppercase())
    });

    let mut normalized = terminate_sentence(&s);

    if normalized.chars().count() > max_len {
        normalized = normalized.chars().take(max_len).collect::<String>();
        normalized.truncate(normalized.trim_end().len());
    }

    normalized
}

/// Ensure the text ends with `.`, `!`, `?` or `…` ahead of any closing quotes.
fn terminate_sentence(s: &str) -> String {
    let split = TRAILING_CLOSERS
        .find(s)
        .map_or(s.len(), |closers| closers.start());
    let (core, trailing) = s.split_at(split);

    if core.is_empty() || core.ends_with(['.', '!', '?', '…']) {
        return s.to_string();
    }

    let core = core.strip_suffix([',', ':', ';']).unwrap_or(core);
    format!("{core}.{trailing}")
}
