// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Text normalization, tokenization, and phrase parsing.
//!
//! Everything downstream (the lexicon, the posting stream, phrase
//! enforcement, the KNS signature) assumes one canonical text pipeline, so
//! this module is the single place where strings get folded. Identical input
//! yields identical output on every platform: case folding is plain
//! `to_lowercase`, no locale anywhere.
//!
//! # Normalization
//!
//! 1. NFKD compatibility decomposition
//! 2. Drop combining marks ("café" → "cafe")
//! 3. Lowercase
//! 4. Everything that is not a letter, digit, whitespace, or hyphen becomes a
//!    single space
//! 5. Collapse whitespace runs
//!
//! Tokens carry the 0-based ordinal of kept tokens only; whitespace runs do
//! not advance positions.

use std::sync::OnceLock;

use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// A normalized term with its 0-based ordinal position in the source string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub term: String,
    pub position: u32,
}

/// Normalize a string for indexing and querying.
///
/// Idempotent: `normalize(normalize(s)) == normalize(s)`.
pub fn normalize(value: &str) -> String {
    let folded: String = value
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() || c == '-' {
                c
            } else {
                ' '
            }
        })
        .collect();

    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Tokenize a string into normalized terms with kept-token positions.
pub fn tokenize(value: &str) -> Vec<Token> {
    normalize(value)
        .split(' ')
        .filter(|t| !t.is_empty())
        .enumerate()
        .map(|(i, t)| Token {
            term: t.to_string(),
            position: i as u32,
        })
        .collect()
}

/// Tokenize and keep only the terms. Used wherever positions are irrelevant
/// (phrase matching, heading overlap, expansion counting).
pub fn tokenize_terms(value: &str) -> Vec<String> {
    tokenize(value).into_iter().map(|t| t.term).collect()
}

/// A parsed query: free terms outside quotes, plus quoted phrase sequences.
#[derive(Debug, Clone, Default)]
pub struct ParsedQuery {
    pub free_terms: Vec<String>,
    pub phrases: Vec<Vec<String>>,
}

/// Split a query into free terms and quoted phrases.
///
/// Straight double quotes and the curly pairs `“…”` / `”…”` both delimit a
/// phrase. An unclosed quote is treated as ordinary punctuation (normalization
/// turns it into a space). Phrases whose contents normalize to nothing are
/// dropped.
pub fn parse_query(query: &str) -> ParsedQuery {
    let chars: Vec<char> = query.chars().collect();
    let mut free = String::new();
    let mut phrases = Vec::new();

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if let Some(close) = closing_quote(c) {
            if let Some(end) = chars[i + 1..].iter().position(|&x| x == close) {
                let inner: String = chars[i + 1..i + 1 + end].iter().collect();
                let terms = tokenize_terms(&inner);
                if !terms.is_empty() {
                    phrases.push(terms);
                }
                i += end + 2;
                free.push(' ');
                continue;
            }
        }
        free.push(c);
        i += 1;
    }

    ParsedQuery {
        free_terms: tokenize_terms(&free),
        phrases,
    }
}

/// Which character closes a phrase opened by `c`, if `c` opens one at all.
fn closing_quote(c: char) -> Option<char> {
    match c {
        '"' => Some('"'),
        '\u{201C}' | '\u{201D}' => Some('\u{201D}'),
        _ => None,
    }
}

/// Check whether `haystack` contains `phrase` as a contiguous ordered run.
pub fn contains_phrase(haystack: &[String], phrase: &[String]) -> bool {
    if phrase.is_empty() {
        return true;
    }
    if haystack.len() < phrase.len() {
        return false;
    }
    haystack
        .windows(phrase.len())
        .any(|window| window == phrase)
}

fn md_image_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"!\[([^\]]*)\]\([^)]*\)").unwrap())
}

fn md_link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").unwrap())
}

fn html_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"</?[A-Za-z][^>]*>").unwrap())
}

/// Strip markdown syntax, keeping the human-readable text.
///
/// Fenced code blocks keep their contents (code is searchable text here),
/// links and images reduce to their label, structural markers go away.
pub fn strip_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());

    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            continue;
        }
        let without_prefix = strip_line_prefix(trimmed);
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(without_prefix);
    }

    let out = md_image_re().replace_all(&out, "$1");
    let out = md_link_re().replace_all(&out, "$1");
    let out = html_tag_re().replace_all(&out, " ");
    out.replace(['`', '*', '_'], "").trim().to_string()
}

/// Remove heading hashes, blockquote arrows, and list bullets from a line.
fn strip_line_prefix(line: &str) -> &str {
    let mut rest = line;
    loop {
        let next = rest
            .strip_prefix('>')
            .or_else(|| strip_heading(rest))
            .or_else(|| strip_bullet(rest));
        match next {
            Some(n) => rest = n.trim_start(),
            None => return rest,
        }
    }
}

fn strip_heading(line: &str) -> Option<&str> {
    let stripped = line.trim_start_matches('#');
    if stripped.len() != line.len() && (stripped.is_empty() || stripped.starts_with(' ')) {
        Some(stripped)
    } else {
        None
    }
}

fn strip_bullet(line: &str) -> Option<&str> {
    for marker in ["- ", "* ", "+ "] {
        if let Some(rest) = line.strip_prefix(marker) {
            return Some(rest);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_diacritics_and_case() {
        assert_eq!(normalize("Café NAÏVE"), "cafe naive");
    }

    #[test]
    fn normalize_maps_punctuation_to_space() {
        assert_eq!(normalize("a,b;c!d"), "a b c d");
        // hyphen survives
        assert_eq!(normalize("local-first"), "local-first");
    }

    #[test]
    fn normalize_is_idempotent() {
        let samples = ["Hello, Wörld!", "  spaced   out  ", "ça—va", "ＦＵＬＬ"];
        for s in samples {
            let once = normalize(s);
            assert_eq!(normalize(&once), once, "not idempotent for {s:?}");
        }
    }

    #[test]
    fn tokenize_assigns_positions_to_kept_tokens_only() {
        let tokens = tokenize("  one,,  two  three ");
        let terms: Vec<_> = tokens.iter().map(|t| t.term.as_str()).collect();
        assert_eq!(terms, ["one", "two", "three"]);
        let positions: Vec<_> = tokens.iter().map(|t| t.position).collect();
        assert_eq!(positions, [0, 1, 2]);
    }

    #[test]
    fn tokenize_empty_is_empty() {
        assert!(tokenize("").is_empty());
        assert!(tokenize(" \t\n ").is_empty());
        assert!(tokenize("!!!").is_empty());
    }

    #[test]
    fn parse_query_extracts_straight_quotes() {
        let parsed = parse_query(r#""react native bridge" throttling"#);
        assert_eq!(parsed.free_terms, ["throttling"]);
        assert_eq!(parsed.phrases, vec![vec!["react", "native", "bridge"]]);
    }

    #[test]
    fn parse_query_extracts_curly_quotes() {
        let parsed = parse_query("\u{201C}react native bridge\u{201D} throttling");
        assert_eq!(parsed.free_terms, ["throttling"]);
        assert_eq!(parsed.phrases.len(), 1);

        // a lone curly close-quote can open too
        let parsed = parse_query("\u{201D}alpha beta\u{201D} gamma");
        assert_eq!(parsed.phrases, vec![vec!["alpha", "beta"]]);
        assert_eq!(parsed.free_terms, ["gamma"]);
    }

    #[test]
    fn parse_query_drops_empty_phrase() {
        let parsed = parse_query(r#""..." term"#);
        assert!(parsed.phrases.is_empty());
        assert_eq!(parsed.free_terms, ["term"]);
    }

    #[test]
    fn parse_query_unclosed_quote_is_punctuation() {
        let parsed = parse_query(r#"alpha "beta"#);
        assert!(parsed.phrases.is_empty());
        assert_eq!(parsed.free_terms, ["alpha", "beta"]);
    }

    #[test]
    fn contains_phrase_requires_contiguous_order() {
        let hay: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        let yes: Vec<String> = ["b", "c"].iter().map(|s| s.to_string()).collect();
        let no: Vec<String> = ["b", "d"].iter().map(|s| s.to_string()).collect();
        assert!(contains_phrase(&hay, &yes));
        assert!(!contains_phrase(&hay, &no));
    }

    #[test]
    fn strip_markdown_keeps_text() {
        let md = "# Title\n\nSome *bold* text with a [link](https://x.y) and `code`.\n\n- item one\n> quoted";
        let plain = strip_markdown(md);
        assert!(plain.contains("Title"));
        assert!(plain.contains("bold"));
        assert!(plain.contains("link"));
        assert!(plain.contains("code"));
        assert!(plain.contains("item one"));
        assert!(plain.contains("quoted"));
        assert!(!plain.contains('#'));
        assert!(!plain.contains('['));
        assert!(!plain.contains('*'));
    }

    #[test]
    fn strip_markdown_drops_fence_markers() {
        let md = "before\n```rust\nlet x = 1;\n```\nafter";
        let plain = strip_markdown(md);
        assert!(!plain.contains("```"));
        assert!(plain.contains("let x = 1;"));
    }
}
