// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Query options, ranking knobs, and eager validation.
//!
//! Options deserialize with `deny_unknown_fields`, so a typo'd option coming
//! in through JSON is a validation error, not a silent no-op. Numeric ranges
//! are checked by [`validate_query_options`] before any scan touches the
//! pack.

use serde::{Deserialize, Deserializer};

use crate::error::{Error, Result};

/// The ranking knobs, all defaulted to the tuned values.
///
/// Everything is passed explicitly; there is no global configuration.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RankParams {
    pub k1: f64,
    pub b: f64,
    pub phrase_boost: f64,
    pub heading_boost: f64,
    pub proximity_strength: f64,
    pub kns_strength: f64,
    /// MMR score/similarity trade-off in the diversifier.
    pub lambda: f64,
    /// jaccard5 near-duplicate threshold.
    pub sim_threshold: f64,
}

impl Default for RankParams {
    fn default() -> Self {
        Self {
            k1: 1.5,
            b: 0.75,
            phrase_boost: 0.6,
            heading_boost: 0.3,
            proximity_strength: 0.15,
            kns_strength: 0.02,
            lambda: 0.8,
            sim_threshold: 0.92,
        }
    }
}

/// Options for one query call.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueryOptions {
    /// Maximum hits returned after diversification.
    pub top_k: usize,
    /// Drop hits whose pre-diversification score is below this.
    pub min_score: Option<f64>,
    /// Additional phrases that must appear (normalized) in every hit.
    pub require_phrases: Vec<String>,
    /// Restrict to blocks whose normalized namespace matches one of these.
    #[serde(deserialize_with = "one_or_many")]
    pub namespace: Vec<String>,
    /// Restrict to blocks whose normalized doc id matches one of these.
    #[serde(deserialize_with = "one_or_many")]
    pub source: Vec<String>,
    #[serde(rename = "query_expansion")]
    pub expansion: ExpansionOptions,
    pub semantic: SemanticQueryOptions,
    pub params: RankParams,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            top_k: 10,
            min_score: None,
            require_phrases: Vec::new(),
            namespace: Vec::new(),
            source: Vec::new(),
            expansion: ExpansionOptions::default(),
            semantic: SemanticQueryOptions::default(),
            params: RankParams::default(),
        }
    }
}

/// Deterministic pseudo-relevance feedback knobs.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExpansionOptions {
    pub enabled: bool,
    /// How many top-ranked blocks vote.
    pub docs: usize,
    /// How many expansion terms to keep.
    pub terms: usize,
    /// Base weight applied to expansion occurrences.
    pub weight: f64,
    pub min_term_length: usize,
}

impl Default for ExpansionOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            docs: 3,
            terms: 4,
            weight: 0.35,
            min_term_length: 3,
        }
    }
}

/// Semantic rerank layer. Off unless enabled, and even then gated by lexical
/// confidence unless forced.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SemanticQueryOptions {
    pub enabled: bool,
    pub mode: RerankMode,
    /// How many lexical candidates to re-score.
    pub top_n: usize,
    /// Rerank only when lexical confidence falls below this (unless forced).
    pub min_lex_confidence: f64,
    pub blend: BlendOptions,
    /// Pre-computed query embedding; required whenever `enabled`.
    pub query_embedding: Option<Vec<f32>>,
    /// Rerank regardless of lexical confidence. Errors if the pack has no
    /// semantic section.
    pub force: bool,
}

impl Default for SemanticQueryOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: RerankMode::Rerank,
            top_n: 50,
            min_lex_confidence: 0.35,
            blend: BlendOptions::default(),
            query_embedding: None,
            force: false,
        }
    }
}

/// The only semantic mode: bounded-N rerank. A variant, not a string, so
/// future modes extend the enum instead of a stringly contract.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RerankMode {
    #[default]
    Rerank,
}

/// Lexical/semantic score blending over the rerank subset.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BlendOptions {
    pub enabled: bool,
    pub w_lex: f64,
    pub w_sem: f64,
}

impl Default for BlendOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            w_lex: 0.75,
            w_sem: 0.25,
        }
    }
}

/// Accept `"mobile"` or `["mobile", "backend"]` for the label filters.
fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(value)) => vec![value],
        Some(OneOrMany::Many(values)) => values,
    })
}

/// Eagerly validate option shapes and ranges. Runs before any scan.
pub fn validate_query_options(options: &QueryOptions) -> Result<()> {
    if options.top_k == 0 {
        return Err(Error::invalid("top_k: must be at least 1"));
    }
    if let Some(min_score) = options.min_score {
        if !min_score.is_finite() {
            return Err(Error::invalid("min_score: must be finite"));
        }
    }

    let exp = &options.expansion;
    if !exp.weight.is_finite() || exp.weight < 0.0 {
        return Err(Error::invalid(
            "query_expansion.weight: must be a non-negative finite number",
        ));
    }

    let sem = &options.semantic;
    if sem.top_n == 0 {
        return Err(Error::invalid("semantic.top_n: must be at least 1"));
    }
    if !(0.0..=1.0).contains(&sem.min_lex_confidence) {
        return Err(Error::invalid(
            "semantic.min_lex_confidence: must be within [0, 1]",
        ));
    }
    for (name, w) in [("w_lex", sem.blend.w_lex), ("w_sem", sem.blend.w_sem)] {
        if !w.is_finite() || w < 0.0 {
            return Err(Error::invalid(format!(
                "semantic.blend.{name}: must be a non-negative finite number"
            )));
        }
    }
    if sem.enabled {
        match &sem.query_embedding {
            None => {
                return Err(Error::invalid(
                    "semantic.query_embedding: required when semantic rerank is enabled",
                ));
            }
            Some(embedding) if !embedding.iter().all(|x| x.is_finite()) => {
                return Err(Error::invalid(
                    "semantic.query_embedding: contains a non-finite value",
                ));
            }
            Some(_) => {}
        }
    }

    let p = &options.params;
    if !p.k1.is_finite() || p.k1 <= 0.0 {
        return Err(Error::invalid("params.k1: must be a positive finite number"));
    }
    if !(0.0..=1.0).contains(&p.b) {
        return Err(Error::invalid("params.b: must be within [0, 1]"));
    }
    if !(0.0..=1.0).contains(&p.lambda) {
        return Err(Error::invalid("params.lambda: must be within [0, 1]"));
    }
    if !(p.sim_threshold > 0.0 && p.sim_threshold <= 1.0) {
        return Err(Error::invalid("params.sim_threshold: must be within (0, 1]"));
    }
    for (name, value) in [
        ("phrase_boost", p.phrase_boost),
        ("heading_boost", p.heading_boost),
        ("proximity_strength", p.proximity_strength),
        ("kns_strength", p.kns_strength),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(Error::invalid(format!(
                "params.{name}: must be a non-negative finite number"
            )));
        }
    }

    Ok(())
}
