// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Deterministic pseudo-relevance query expansion.
//!
//! No model, no randomness: the top-ranked blocks vote for the terms they
//! contain, votes are weighted by how close each block's score is to the
//! best one, and the winners get a damped weight before a targeted rescan.
//! The whole step is a pure function of the first ranking, so expansion
//! never breaks reproducibility.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use super::options::ExpansionOptions;
use super::Scored;
use crate::pack::Pack;
use crate::text;

/// An expansion term with its final per-occurrence weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ExpansionTerm {
    pub term_id: u32,
    pub weight: f64,
}

/// Pick expansion terms from the top-ranked blocks.
///
/// A term qualifies when it is long enough, exists in the lexicon, and is
/// not already part of the query (free terms or required phrases). Each top
/// block contributes `count * max(0.2, score/best)` votes; the top
/// `opts.terms` by accumulated vote win, each weighted
/// `opts.weight * clamp(votes, 0.5, 1.5)`.
pub(crate) fn select_expansion_terms(
    pack: &Pack,
    ranked: &[Scored],
    opts: &ExpansionOptions,
    query_terms: &BTreeSet<String>,
) -> Vec<ExpansionTerm> {
    let best = match ranked.first() {
        Some(top) if top.score > 0.0 => top.score,
        _ => return Vec::new(),
    };

    let mut votes: BTreeMap<u32, f64> = BTreeMap::new();
    for scored in ranked.iter().take(opts.docs) {
        let block_weight = (scored.score / best).max(0.2);
        let block = pack.block(scored.block_id);

        let mut counts: BTreeMap<u32, u32> = BTreeMap::new();
        for term in text::tokenize_terms(&block.text) {
            if term.chars().count() < opts.min_term_length {
                continue;
            }
            if query_terms.contains(&term) {
                continue;
            }
            let Some(term_id) = pack.term_id(&term) else {
                continue;
            };
            *counts.entry(term_id).or_insert(0) += 1;
        }

        for (term_id, count) in counts {
            *votes.entry(term_id).or_insert(0.0) += f64::from(count) * block_weight;
        }
    }

    let mut scored_terms: Vec<(u32, f64)> = votes.into_iter().collect();
    scored_terms.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    scored_terms.truncate(opts.terms);

    let terms: Vec<ExpansionTerm> = scored_terms
        .into_iter()
        .map(|(term_id, vote)| ExpansionTerm {
            term_id,
            weight: opts.weight * vote.clamp(0.5, 1.5),
        })
        .collect();

    debug!(
        terms = terms.len(),
        "expansion terms selected"
    );
    terms
}
