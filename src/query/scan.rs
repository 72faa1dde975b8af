// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Single-pass candidate gathering over the posting stream.
//!
//! The stream was validated at mount, so the walk here trusts the grammar
//! and spends its branches on the interesting part: counting document
//! frequency for every scanned term (not just query terms — expansion needs
//! those df values later) while collecting tf and positions for the relevant
//! ones.

use std::collections::{BTreeMap, BTreeSet};

use tracing::trace;

use super::{Candidate, CandidateMap};
use crate::pack::Pack;

/// Outcome of one pass: candidates keyed by block id, and per-term document
/// frequency indexed by term id.
pub(crate) struct ScanResult {
    pub candidates: CandidateMap,
    pub df: Vec<u32>,
}

/// Walk the whole stream once. `relevant` selects the terms whose tf and
/// positions feed candidate entries.
pub(crate) fn scan(pack: &Pack, relevant: &BTreeSet<u32>) -> ScanResult {
    let stream = pack.postings();
    let bias = pack.id_bias();
    let mut candidates: CandidateMap = BTreeMap::new();
    let mut df = vec![0u32; pack.term_count() + 1];

    let mut i = 0;
    while i < stream.len() {
        let term_id = stream[i];
        i += 1;
        let is_relevant = relevant.contains(&term_id);

        loop {
            let stored = stream[i];
            i += 1;
            if stored == 0 {
                break;
            }
            let block_id = stored - bias;
            df[term_id as usize] += 1;

            if is_relevant {
                let cand = candidates.entry(block_id).or_insert_with(Candidate::default);
                let positions = cand.pos.entry(term_id).or_default();
                while stream[i] != 0 {
                    positions.push(stream[i] - 1); // stored 1-based
                    i += 1;
                }
                i += 1;
                *cand.tf.entry(term_id).or_insert(0.0) += positions.len() as f64;
            } else {
                while stream[i] != 0 {
                    i += 1;
                }
                i += 1;
            }
        }
    }

    trace!(
        candidates = candidates.len(),
        relevant = relevant.len(),
        "candidate scan complete"
    );
    ScanResult { candidates, df }
}

/// Count occurrences of specific terms per block, positions ignored.
/// Used by the expansion rescan.
pub(crate) fn rescan_counts(pack: &Pack, wanted: &BTreeSet<u32>) -> BTreeMap<u32, BTreeMap<u32, u32>> {
    let stream = pack.postings();
    let bias = pack.id_bias();
    let mut counts: BTreeMap<u32, BTreeMap<u32, u32>> = BTreeMap::new();

    let mut i = 0;
    while i < stream.len() {
        let term_id = stream[i];
        i += 1;
        let is_wanted = wanted.contains(&term_id);

        loop {
            let stored = stream[i];
            i += 1;
            if stored == 0 {
                break;
            }
            let block_id = stored - bias;
            let mut occurrences = 0u32;
            while stream[i] != 0 {
                occurrences += 1;
                i += 1;
            }
            i += 1;
            if is_wanted {
                *counts
                    .entry(block_id)
                    .or_default()
                    .entry(term_id)
                    .or_insert(0) += occurrences;
            }
        }
    }
    counts
}
