// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Budget-bounded context patch projection.
//!
//! A pure projection from ranked hits to the structured shape prompt
//! assembly consumes downstream. The projector never re-ranks and never
//! touches the pack; it only cuts text to budget. `definitions` and `facts`
//! are part of the stable shape and stay empty here — downstream layers fill
//! them from their own sources.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::query::Hit;

/// Snippet-count and character budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchBudget {
    Mini,
    Small,
    Full,
}

impl PatchBudget {
    /// `(max_snippets, max_chars)` per budget tier.
    pub fn limits(self) -> (usize, usize) {
        match self {
            PatchBudget::Mini => (3, 240),
            PatchBudget::Small => (6, 420),
            PatchBudget::Full => (10, 900),
        }
    }
}

/// The stable projection shape.
#[derive(Debug, Clone, Serialize)]
pub struct ContextPatch {
    /// First sentence of the first two snippets.
    pub background: Vec<String>,
    pub snippets: Vec<Snippet>,
    pub definitions: Vec<String>,
    pub facts: Vec<String>,
}

/// One budgeted snippet with its provenance.
#[derive(Debug, Clone, Serialize)]
pub struct Snippet {
    pub text: String,
    pub source: Option<String>,
}

/// Project hits into a context patch under the given budget.
pub fn make_context_patch(hits: &[Hit], budget: PatchBudget) -> ContextPatch {
    let (max_snippets, max_chars) = budget.limits();

    let snippets: Vec<Snippet> = hits
        .iter()
        .take(max_snippets)
        .map(|hit| Snippet {
            text: truncate_chars(&hit.text, max_chars),
            source: hit.source.clone(),
        })
        .collect();

    let background = snippets
        .iter()
        .take(2)
        .map(|s| first_sentence(&s.text))
        .collect();

    ContextPatch {
        background,
        snippets,
        definitions: Vec::new(),
        facts: Vec::new(),
    }
}

/// Cut to a character budget, appending an ellipsis on overflow.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push('…');
    cut
}

fn sentence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // first 10..=200 chars ending in sentence punctuation
    RE.get_or_init(|| Regex::new(r"(?s)^(.{9,199}?[.!?])").unwrap())
}

/// First sentence, 10–200 chars and terminated by `.!?`; otherwise the first
/// 160 chars.
fn first_sentence(text: &str) -> String {
    let trimmed = text.trim();
    if let Some(captures) = sentence_re().captures(trimmed) {
        return captures[1].trim().to_string();
    }
    trimmed.chars().take(160).collect()
}
