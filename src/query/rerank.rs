// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Int8 semantic rerank over the lexical top-N.
//!
//! This is a bounded rerank, not a nearest-neighbor search: similarity is
//! computed for at most `top_n` candidates that lexical scoring already
//! surfaced. The query embedding goes through the same quantizer as the
//! stored vectors, so both sides live in the same int8 space and the dot
//! product needs only one multiply per pair of scales.
//!
//! Blending min-max normalizes each side over the rerank subset. Candidates
//! past the subset keep their relative order below it; their raw BM25L
//! scores are not comparable with blended [0, 1] scores, so they are never
//! interleaved.

use tracing::debug;

use super::options::SemanticQueryOptions;
use super::Scored;
use crate::error::{Error, Result};
use crate::pack::Pack;
use crate::quant::{int8_similarity, quantize};

/// Re-score the top of `ranked` by semantic similarity.
///
/// Preconditions (checked by the caller): the pack has a semantic section
/// and `opts.query_embedding` is present.
pub(crate) fn semantic_rerank(
    pack: &Pack,
    ranked: &mut Vec<Scored>,
    opts: &SemanticQueryOptions,
) -> Result<()> {
    let semantic = pack
        .semantic()
        .ok_or_else(|| Error::Internal("rerank called without a semantic section".into()))?;
    let embedding = opts
        .query_embedding
        .as_ref()
        .ok_or_else(|| Error::Internal("rerank called without a query embedding".into()))?;

    if embedding.len() != semantic.dims {
        return Err(Error::invalid(format!(
            "semantic.query_embedding: expected dims {}, got {}",
            semantic.dims,
            embedding.len()
        )));
    }

    let query = quantize(embedding);
    let query_scale = query.scale();

    let n = opts.top_n.min(ranked.len());
    if n == 0 {
        return Ok(());
    }

    let subset = &ranked[..n];
    let sims: Vec<f64> = subset
        .iter()
        .map(|s| {
            let block = s.block_id as usize;
            int8_similarity(
                &query.values,
                query_scale,
                semantic.vector(block),
                semantic.scale(block),
            )
        })
        .collect();

    let rescored: Vec<Scored> = if opts.blend.enabled {
        let lex: Vec<f64> = subset.iter().map(|s| s.score).collect();
        let lex_norm = min_max(&lex);
        let sem_norm = min_max(&sims);
        subset
            .iter()
            .enumerate()
            .map(|(i, s)| Scored {
                block_id: s.block_id,
                score: opts.blend.w_lex * lex_norm[i] + opts.blend.w_sem * sem_norm[i],
            })
            .collect()
    } else {
        subset
            .iter()
            .enumerate()
            .map(|(i, s)| Scored {
                block_id: s.block_id,
                score: sims[i],
            })
            .collect()
    };

    let mut rescored = rescored;
    rescored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.block_id.cmp(&b.block_id))
    });

    debug!(reranked = n, blended = opts.blend.enabled, "semantic rerank applied");
    for (slot, new) in ranked[..n].iter_mut().zip(rescored) {
        *slot = new;
    }
    Ok(())
}

/// Min-max normalize into [0, 1]; a degenerate range maps to all zeros.
fn min_max(values: &[f64]) -> Vec<f64> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if range <= 0.0 {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v - min) / range).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{build_pack, BuildOptions, Document, Quantization, SemanticBuildOptions};
    use crate::pack::mount_pack;
    use crate::query::options::BlendOptions;

    fn semantic_pack(embeddings: Vec<Vec<f32>>) -> Pack {
        let docs: Vec<Document> = (0..embeddings.len())
            .map(|i| Document::new(format!("block number {i}")))
            .collect();
        let options = BuildOptions {
            semantic: Some(SemanticBuildOptions {
                model_id: "test-model".into(),
                embeddings,
                quantization: Quantization::default(),
            }),
            meta_extra: serde_json::Map::new(),
        };
        mount_pack(build_pack(&docs, &options).unwrap()).unwrap()
    }

    fn opts(embedding: Vec<f32>, blend: bool) -> SemanticQueryOptions {
        SemanticQueryOptions {
            enabled: true,
            query_embedding: Some(embedding),
            blend: BlendOptions {
                enabled: blend,
                ..BlendOptions::default()
            },
            ..SemanticQueryOptions::default()
        }
    }

    #[test]
    fn pure_semantic_reverses_lexical_order() {
        let pack = semantic_pack(vec![vec![1.0, 0.0, 0.0, 0.0], vec![0.0, 1.0, 0.0, 0.0]]);
        // lexical order favors block 0; query embedding aligns with block 1
        let mut ranked = vec![
            Scored { block_id: 0, score: 2.0 },
            Scored { block_id: 1, score: 1.9 },
        ];
        semantic_rerank(&pack, &mut ranked, &opts(vec![0.0, 1.0, 0.0, 0.0], false)).unwrap();
        assert_eq!(ranked[0].block_id, 1);
    }

    #[test]
    fn blend_keeps_strong_lexical_signal_in_play() {
        let pack = semantic_pack(vec![vec![1.0, 0.0, 0.0, 0.0], vec![0.0, 1.0, 0.0, 0.0]]);
        // huge lexical gap, semantic prefers block 1
        let mut ranked = vec![
            Scored { block_id: 0, score: 100.0 },
            Scored { block_id: 1, score: 1.0 },
        ];
        semantic_rerank(&pack, &mut ranked, &opts(vec![0.0, 1.0, 0.0, 0.0], true)).unwrap();
        // lex_norm = [1, 0], sem_norm = [0, 1]: 0.75 vs 0.25
        assert_eq!(ranked[0].block_id, 0);
    }

    #[test]
    fn dimension_mismatch_is_invalid_input() {
        let pack = semantic_pack(vec![vec![1.0, 0.0, 0.0, 0.0]]);
        let mut ranked = vec![Scored { block_id: 0, score: 1.0 }];
        let err =
            semantic_rerank(&pack, &mut ranked, &opts(vec![1.0, 0.0], false)).unwrap_err();
        assert!(err.to_string().contains("expected dims 4, got 2"));
    }

    #[test]
    fn candidates_past_top_n_keep_their_order() {
        let pack = semantic_pack(vec![
            vec![1.0, 0.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0, 0.0],
            vec![0.0, 0.0, 1.0, 0.0],
        ]);
        let mut ranked = vec![
            Scored { block_id: 0, score: 3.0 },
            Scored { block_id: 1, score: 2.0 },
            Scored { block_id: 2, score: 1.0 },
        ];
        let mut o = opts(vec![0.0, 1.0, 0.0, 0.0], false);
        o.top_n = 2;
        semantic_rerank(&pack, &mut ranked, &o).unwrap();
        assert_eq!(ranked[0].block_id, 1);
        assert_eq!(ranked[1].block_id, 0);
        assert_eq!(ranked[2].block_id, 2); // untouched tail
    }

    #[test]
    fn min_max_degenerate_range_is_zero() {
        assert_eq!(min_max(&[2.0, 2.0, 2.0]), vec![0.0, 0.0, 0.0]);
        assert_eq!(min_max(&[1.0, 3.0]), vec![0.0, 1.0]);
    }
}
