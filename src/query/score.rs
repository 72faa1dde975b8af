// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! BM25L scoring with query-time IDF, plus the multiplicative adjustments.
//!
//! Document frequencies are counted during the candidate scan rather than
//! persisted, so the same pack scores correctly no matter which subset of
//! terms a query touches. The adjustments apply in a fixed order: proximity,
//! phrase, heading. Each one is bounded, so BM25L stays the dominant term.

use super::{Candidate, RankParams};

/// Everything scoring needs besides the candidate itself.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ScoreContext {
    pub avg_len: f64,
    pub doc_count: u32,
    pub params: RankParams,
}

/// Query-time inverse document frequency.
pub(crate) fn idf(df: u32, doc_count: u32) -> f64 {
    let df = f64::from(df);
    let n = f64::from(doc_count);
    (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
}

/// One term's BM25L contribution.
fn term_score(tf: f64, df: u32, len: f64, ctx: &ScoreContext) -> f64 {
    let RankParams { k1, b, .. } = ctx.params;
    let avg = if ctx.avg_len > 0.0 { ctx.avg_len } else { 1.0 };
    let norm = k1 * (1.0 - b + b * len / avg);
    idf(df, ctx.doc_count) * (tf * (k1 + 1.0)) / (tf + norm)
}

/// Full candidate score: BM25L sum, then proximity, phrase, and heading
/// multipliers in that order.
pub(crate) fn score_candidate(
    cand: &Candidate,
    token_len: f64,
    df: &[u32],
    ctx: &ScoreContext,
) -> f64 {
    let len = if token_len > 0.0 {
        token_len
    } else {
        cand.tf.values().sum()
    };

    let mut score = 0.0;
    for (&term_id, &tf) in &cand.tf {
        let term_df = df.get(term_id as usize).copied().unwrap_or(0);
        score += term_score(tf, term_df, len, ctx);
    }

    let lists: Vec<&[u32]> = cand.pos.values().map(Vec::as_slice).collect();
    score *= proximity_multiplier(min_cover_span(&lists), ctx.params.proximity_strength);

    if cand.has_phrase {
        score *= 1.0 + ctx.params.phrase_boost;
    }
    score *= 1.0 + ctx.params.heading_boost * cand.heading_score;
    score
}

/// Minimal window covering one position from every list.
///
/// Standard k-pointer sweep: emit the current tuple, advance the list owning
/// the minimum, stop when any list runs dry. `None` when there are no lists.
pub(crate) fn min_cover_span(lists: &[&[u32]]) -> Option<u32> {
    if lists.is_empty() || lists.iter().any(|l| l.is_empty()) {
        return None;
    }

    let mut cursor = vec![0usize; lists.len()];
    let mut best = u32::MAX;
    loop {
        let mut min_value = u32::MAX;
        let mut max_value = 0u32;
        let mut min_list = 0usize;
        for (li, list) in lists.iter().enumerate() {
            let value = list[cursor[li]];
            if value < min_value {
                min_value = value;
                min_list = li;
            }
            max_value = max_value.max(value);
        }
        best = best.min(max_value - min_value);
        if best == 0 {
            break;
        }
        cursor[min_list] += 1;
        if cursor[min_list] >= lists[min_list].len() {
            break;
        }
    }
    Some(best)
}

/// `1 + strength / (1 + span)`; neutral when the span is undefined.
pub(crate) fn proximity_multiplier(span: Option<u32>, strength: f64) -> f64 {
    match span {
        Some(span) => 1.0 + strength / (1.0 + f64::from(span)),
        None => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn ctx(avg_len: f64, doc_count: u32) -> ScoreContext {
        ScoreContext {
            avg_len,
            doc_count,
            params: RankParams::default(),
        }
    }

    #[test]
    fn bm25l_reference_value() {
        // k1=1.5, b=0.75, avg_len=10, len=10, tf=2, df=1, N=2:
        // idf = ln(1 + 1.5/1.5) = ln 2; tf part = 2*2.5 / (2 + 1.5) = 5/3.5
        let score = term_score(2.0, 1, 10.0, &ctx(10.0, 2));
        let expected = std::f64::consts::LN_2 * 5.0 / 3.5;
        assert!((score - expected).abs() < 1e-12);
        assert!((score - 0.990).abs() < 1e-3);
    }

    #[test]
    fn idf_decreases_with_df() {
        assert!(idf(1, 100) > idf(10, 100));
        assert!(idf(10, 100) > idf(100, 100));
    }

    #[test]
    fn rare_terms_outweigh_common_ones() {
        let mut rare = Candidate::default();
        rare.tf.insert(1, 1.0);
        let mut common = Candidate::default();
        common.tf.insert(2, 1.0);
        // df: term 1 rare (1 block), term 2 common (90 blocks)
        let df = vec![0, 1, 90];
        let c = ctx(10.0, 100);
        assert!(score_candidate(&rare, 10.0, &df, &c) > score_candidate(&common, 10.0, &df, &c));
    }

    #[test]
    fn min_cover_span_basics() {
        assert_eq!(min_cover_span(&[]), None);
        assert_eq!(min_cover_span(&[&[3, 9][..]]), Some(0));
        // terms at (1, 5, 9) and (4): best window picks 5 and 4 -> span 1
        assert_eq!(min_cover_span(&[&[1, 5, 9][..], &[4][..]]), Some(1));
        // adjacent terms
        assert_eq!(min_cover_span(&[&[0, 7][..], &[1][..], &[2][..]]), Some(2));
    }

    #[test]
    fn min_cover_span_finds_late_window() {
        // early positions are far apart, the tight window is at the end
        let a = [0, 100];
        let b = [50, 101];
        assert_eq!(min_cover_span(&[&a[..], &b[..]]), Some(1));
    }

    #[test]
    fn proximity_is_bounded_and_gentle() {
        let strength = RankParams::default().proximity_strength;
        assert_eq!(proximity_multiplier(None, strength), 1.0);
        assert!((proximity_multiplier(Some(0), strength) - 1.15).abs() < 1e-12);
        let far = proximity_multiplier(Some(1000), strength);
        assert!(far > 1.0 && far < 1.001);
    }

    #[test]
    fn phrase_and_heading_multipliers_apply_in_order() {
        let mut cand = Candidate::default();
        cand.tf.insert(1, 1.0);
        let df = vec![0, 1];
        let c = ctx(10.0, 10);
        let base = score_candidate(&cand, 10.0, &df, &c);

        cand.has_phrase = true;
        let with_phrase = score_candidate(&cand, 10.0, &df, &c);
        assert!((with_phrase / base - 1.6).abs() < 1e-9);

        cand.heading_score = 1.0;
        let with_heading = score_candidate(&cand, 10.0, &df, &c);
        assert!((with_heading / with_phrase - 1.3).abs() < 1e-9);
    }

    #[test]
    fn missing_token_len_falls_back_to_tf_sum() {
        let mut cand = Candidate::default();
        cand.tf.insert(1, 3.0);
        let df = vec![0, 1];
        let c = ctx(3.0, 10);
        // len 0 -> falls back to sum of tf (3.0), same as passing 3.0
        let explicit = score_candidate(&cand, 3.0, &df, &c);
        let fallback = score_candidate(&cand, 0.0, &df, &c);
        assert!((explicit - fallback).abs() < 1e-12);
    }
}
