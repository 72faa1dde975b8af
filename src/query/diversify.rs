// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Near-duplicate suppression and MMR selection over the ranked pool.
//!
//! Two corpus quirks drive this stage: mirrored documents (identical text
//! under different ids) and boilerplate-heavy blocks that crowd the top of
//! the ranking. Shingle Jaccard catches the first, the MMR trade-off spreads
//! out the second.
//!
//! Guarantees: no two returned hits reach the similarity threshold, the top
//! hit is always the top-scoring candidate, and the output is a pure
//! function of the input order.

use std::collections::HashSet;

use super::Hit;
use crate::text::normalize;

/// Shingle width for the similarity measure.
const SHINGLE: usize = 5;

/// Jaccard similarity over 5-character shingles of normalized text.
///
/// Strings shorter than one shingle compare as single units; two empty
/// strings are identical (similarity 1).
pub fn jaccard5(a: &str, b: &str) -> f64 {
    set_jaccard(&shingle_set(a), &shingle_set(b))
}

fn shingle_set(text: &str) -> HashSet<String> {
    let normalized = normalize(text);
    let chars: Vec<char> = normalized.chars().collect();
    if chars.len() < SHINGLE {
        let mut set = HashSet::new();
        set.insert(normalized);
        return set;
    }
    chars
        .windows(SHINGLE)
        .map(|w| w.iter().collect::<String>())
        .collect()
}

fn set_jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        1.0
    } else {
        intersection as f64 / union as f64
    }
}

/// MMR selection with duplicate skip.
///
/// Each round scores every remaining candidate as
/// `lambda * score - (1 - lambda) * maxsim` where `maxsim` is its highest
/// similarity to anything already kept; candidates at or above the duplicate
/// threshold are skipped. When every remaining candidate is a duplicate, the
/// next one by pure score is consumed instead, and the final appending check
/// keeps the no-near-duplicates guarantee intact.
pub(crate) fn diversify(pool: Vec<Hit>, k: usize, lambda: f64, threshold: f64) -> Vec<Hit> {
    let mut pool = pool;
    pool.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.block_id.cmp(&b.block_id))
    });
    let mut shingles: Vec<HashSet<String>> = pool.iter().map(|h| shingle_set(&h.text)).collect();

    let mut kept: Vec<Hit> = Vec::with_capacity(k.min(pool.len()));
    let mut kept_shingles: Vec<HashSet<String>> = Vec::with_capacity(k.min(pool.len()));

    while !pool.is_empty() && kept.len() < k {
        let max_sims: Vec<f64> = shingles
            .iter()
            .map(|s| {
                kept_shingles
                    .iter()
                    .map(|ks| set_jaccard(s, ks))
                    .fold(0.0, f64::max)
            })
            .collect();

        let mut chosen: Option<usize> = None;
        let mut best_value = f64::NEG_INFINITY;
        for (i, hit) in pool.iter().enumerate() {
            if max_sims[i] >= threshold {
                continue;
            }
            let value = lambda * hit.score - (1.0 - lambda) * max_sims[i];
            if value > best_value {
                best_value = value;
                chosen = Some(i);
            }
        }

        // All remaining are duplicates: advance by pure score. The appending
        // check below drops it, which drains duplicates deterministically.
        let idx = chosen.unwrap_or(0);
        let hit = pool.remove(idx);
        let hit_shingles = shingles.remove(idx);

        if max_sims[idx] < threshold {
            kept.push(hit);
            kept_shingles.push(hit_shingles);
        }
    }

    kept
}
