// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! The query pipeline.
//!
//! One call, ten strictly ordered phases:
//!
//! 1. parse the query (free terms + quoted phrases)
//! 2. single-pass candidate scan with query-time df
//! 3. phrase rescue when the free terms alone found nothing
//! 4. namespace/source filters and phrase enforcement
//! 5. heading overlap
//! 6. BM25L + proximity + phrase + heading ranking
//! 7. pseudo-relevance expansion and re-rank
//! 8. KNS tie-break
//! 9. optional semantic rerank, gated by lexical confidence
//! 10. hand-off of the `top_k * 5` pool to the diversifier
//!
//! The pipeline allocates per-call scratch only; a mounted pack is shared
//! read-only and concurrent queries need no synchronization. All candidate
//! maps are ordered so floating-point accumulation has one fixed order —
//! identical pack bytes and inputs give bit-identical hits.

mod diversify;
mod expand;
mod options;
mod rerank;
mod scan;
mod score;

pub use diversify::jaccard5;
pub use options::{
    validate_query_options, BlendOptions, ExpansionOptions, QueryOptions, RankParams, RerankMode,
    SemanticQueryOptions,
};

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::pack::{Block, Pack};
use crate::signature::{kns_distance, kns_signature};
use crate::text;
use score::ScoreContext;

/// One ranked result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hit {
    pub block_id: u32,
    pub score: f64,
    pub text: String,
    /// The document's external id, when it had one.
    pub source: Option<String>,
    pub namespace: Option<String>,
}

/// Per-candidate scratch collected during the scan.
///
/// Ordered maps keep score accumulation deterministic.
#[derive(Debug, Default)]
pub(crate) struct Candidate {
    /// term id → term frequency (fractional once expansion weights land).
    pub tf: BTreeMap<u32, f64>,
    /// term id → 0-based positions, original query terms only.
    pub pos: BTreeMap<u32, Vec<u32>>,
    pub has_phrase: bool,
    pub heading_score: f64,
}

pub(crate) type CandidateMap = BTreeMap<u32, Candidate>;

/// A block with its current pipeline score.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Scored {
    pub block_id: u32,
    pub score: f64,
}

/// Run a query against a mounted pack.
///
/// Returns up to `top_k` diversified hits. An empty candidate set is an
/// empty result, not an error.
pub fn query(pack: &Pack, query_text: &str, options: &QueryOptions) -> Result<Vec<Hit>> {
    validate_query_options(options)?;

    // --- step 1: parse ---
    let parsed = text::parse_query(query_text);
    let mut phrases = parsed.phrases.clone();
    for raw in &options.require_phrases {
        let terms = text::tokenize_terms(raw);
        if !terms.is_empty() {
            phrases.push(terms);
        }
    }
    let has_quoted = !parsed.phrases.is_empty();

    let free_ids: BTreeSet<u32> = parsed
        .free_terms
        .iter()
        .filter_map(|t| pack.term_id(t))
        .collect();

    // --- step 2: candidate scan ---
    let mut scanned = if free_ids.is_empty() {
        scan::ScanResult {
            candidates: BTreeMap::new(),
            df: vec![0; pack.term_count() + 1],
        }
    } else {
        scan::scan(pack, &free_ids)
    };

    // --- step 3: phrase rescue ---
    if scanned.candidates.is_empty() && !phrases.is_empty() {
        let phrase_ids: BTreeSet<u32> = phrases
            .iter()
            .flatten()
            .filter_map(|t| pack.term_id(t))
            .collect();
        if !phrase_ids.is_empty() {
            scanned = scan::scan(pack, &phrase_ids);
        }
    }
    let scan::ScanResult { mut candidates, df } = scanned;

    // --- step 4: filters and phrase enforcement ---
    let ns_filter: Vec<String> = options.namespace.iter().map(|s| text::normalize(s)).collect();
    let src_filter: Vec<String> = options.source.iter().map(|s| text::normalize(s)).collect();
    let mut block_terms: HashMap<u32, Vec<String>> = HashMap::new();

    candidates.retain(|&block_id, cand| {
        let block = pack.block(block_id);
        if !passes_label_filters(block, &ns_filter, &src_filter) {
            return false;
        }
        if !phrases.is_empty() {
            let terms = block_terms
                .entry(block_id)
                .or_insert_with(|| text::tokenize_terms(&block.text));
            if !phrases.iter().all(|p| text::contains_phrase(terms, p)) {
                return false;
            }
            cand.has_phrase = has_quoted;
        }
        true
    });

    // --- step 5: heading overlap ---
    let query_term_set: BTreeSet<String> = parsed.free_terms.iter().cloned().collect();
    for (&block_id, cand) in &mut candidates {
        cand.heading_score =
            heading_overlap(pack.block(block_id).heading.as_deref(), &query_term_set);
    }

    // --- step 6: first ranking ---
    let ctx = ScoreContext {
        avg_len: pack.avg_block_len(),
        doc_count: pack.stats().blocks,
        params: options.params,
    };
    let mut ranked = rank(pack, &candidates, &df, &ctx);

    // --- step 7: expansion ---
    if options.expansion.enabled
        && options.expansion.docs > 0
        && options.expansion.terms > 0
        && !ranked.is_empty()
    {
        let mut exclude = query_term_set.clone();
        for phrase in &phrases {
            for term in phrase {
                exclude.insert(term.clone());
            }
        }
        let expansion_terms =
            expand::select_expansion_terms(pack, &ranked, &options.expansion, &exclude);
        if !expansion_terms.is_empty() {
            apply_expansion(
                pack,
                &mut candidates,
                &expansion_terms,
                &phrases,
                has_quoted,
                &ns_filter,
                &src_filter,
                &query_term_set,
                &mut block_terms,
            );
            ranked = rank(pack, &candidates, &df, &ctx);
        }
    }

    // --- step 8: KNS tie-break ---
    let query_sig = kns_signature(&text::normalize(query_text));
    for scored in &mut ranked {
        let block_sig = kns_signature(&text::normalize(&pack.block(scored.block_id).text));
        let dist = kns_distance(query_sig, block_sig);
        scored.score *= 1.0 + ctx.params.kns_strength * (1.0 - dist);
    }
    sort_ranked(&mut ranked);

    // --- step 9: semantic rerank ---
    if options.semantic.enabled {
        if pack.has_semantic() {
            let scores: Vec<f64> = ranked.iter().map(|s| s.score).collect();
            let confidence = confidence_of(&scores);
            if options.semantic.force || confidence < options.semantic.min_lex_confidence {
                rerank::semantic_rerank(pack, &mut ranked, &options.semantic)?;
            }
        } else if options.semantic.force {
            return Err(Error::SemanticMissing);
        }
        // enabled but absent and not forced: silently skip
    }

    // --- step 10: pool and diversify ---
    if let Some(min_score) = options.min_score {
        ranked.retain(|s| s.score >= min_score);
    }
    ranked.truncate(options.top_k.saturating_mul(5));

    let pool: Vec<Hit> = ranked
        .iter()
        .map(|s| {
            let block = pack.block(s.block_id);
            Hit {
                block_id: s.block_id,
                score: s.score,
                text: block.text.clone(),
                source: block.doc_id.clone(),
                namespace: block.namespace.clone(),
            }
        })
        .collect();

    let hits = diversify::diversify(
        pool,
        options.top_k,
        ctx.params.lambda,
        ctx.params.sim_threshold,
    );
    debug!(hits = hits.len(), "query complete");
    Ok(hits)
}

/// Lexical confidence of a ranked hit list: relative gap between the top two
/// scores. 1 with a single hit, 0 with none.
pub fn lex_confidence(hits: &[Hit]) -> f64 {
    let scores: Vec<f64> = hits.iter().map(|h| h.score).collect();
    confidence_of(&scores)
}

fn confidence_of(scores: &[f64]) -> f64 {
    match scores {
        [] => 0.0,
        [_] => 1.0,
        [first, second, ..] => {
            if *first > 0.0 {
                (first - second) / first
            } else {
                0.0
            }
        }
    }
}

fn sort_ranked(ranked: &mut [Scored]) {
    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.block_id.cmp(&b.block_id))
    });
}

fn rank(pack: &Pack, candidates: &CandidateMap, df: &[u32], ctx: &ScoreContext) -> Vec<Scored> {
    let mut ranked: Vec<Scored> = candidates
        .iter()
        .map(|(&block_id, cand)| Scored {
            block_id,
            score: score::score_candidate(
                cand,
                f64::from(pack.block(block_id).effective_len()),
                df,
                ctx,
            ),
        })
        .collect();
    sort_ranked(&mut ranked);
    ranked
}

/// Rescan for the expansion terms and fold their weighted occurrences into
/// the candidate set. Blocks surfaced only by expansion enter as new
/// candidates after passing the same filters and phrase checks.
#[allow(clippy::too_many_arguments)]
fn apply_expansion(
    pack: &Pack,
    candidates: &mut CandidateMap,
    expansion_terms: &[expand::ExpansionTerm],
    phrases: &[Vec<String>],
    has_quoted: bool,
    ns_filter: &[String],
    src_filter: &[String],
    query_term_set: &BTreeSet<String>,
    block_terms: &mut HashMap<u32, Vec<String>>,
) {
    let wanted: BTreeSet<u32> = expansion_terms.iter().map(|t| t.term_id).collect();
    let weights: BTreeMap<u32, f64> = expansion_terms
        .iter()
        .map(|t| (t.term_id, t.weight))
        .collect();

    for (block_id, term_counts) in scan::rescan_counts(pack, &wanted) {
        let is_new = !candidates.contains_key(&block_id);
        if is_new {
            let block = pack.block(block_id);
            if !passes_label_filters(block, ns_filter, src_filter) {
                continue;
            }
            if !phrases.is_empty() {
                let terms = block_terms
                    .entry(block_id)
                    .or_insert_with(|| text::tokenize_terms(&block.text));
                if !phrases.iter().all(|p| text::contains_phrase(terms, p)) {
                    continue;
                }
            }
        }

        let cand = candidates.entry(block_id).or_default();
        if is_new {
            cand.has_phrase = has_quoted && !phrases.is_empty();
            cand.heading_score =
                heading_overlap(pack.block(block_id).heading.as_deref(), query_term_set);
        }
        for (term_id, occurrences) in term_counts {
            *cand.tf.entry(term_id).or_insert(0.0) += f64::from(occurrences) * weights[&term_id];
        }
    }
}

fn passes_label_filters(block: &Block, ns_filter: &[String], src_filter: &[String]) -> bool {
    if !ns_filter.is_empty() {
        match &block.namespace {
            Some(label) if ns_filter.contains(&text::normalize(label)) => {}
            _ => return false,
        }
    }
    if !src_filter.is_empty() {
        match &block.doc_id {
            Some(id) if src_filter.contains(&text::normalize(id)) => {}
            _ => return false,
        }
    }
    true
}

/// Share of unique query terms that also appear in the heading.
fn heading_overlap(heading: Option<&str>, query_terms: &BTreeSet<String>) -> f64 {
    let Some(heading) = heading else {
        return 0.0;
    };
    if query_terms.is_empty() {
        return 0.0;
    }
    let heading_terms: BTreeSet<String> = text::tokenize_terms(heading).into_iter().collect();
    let overlap = query_terms.intersection(&heading_terms).count();
    overlap as f64 / query_terms.len() as f64
}
