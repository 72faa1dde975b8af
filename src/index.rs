// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Positional inverted index construction.
//!
//! One pass over the block sequence produces two artifacts: the lexicon
//! (term ↔ dense id, first-seen order, ids from 1) and the flat posting
//! stream. The stream is a single `u32` sequence:
//!
//! ```text
//! stream      := (term_entry)*
//! term_entry  := term_id block_entry+ 0
//! block_entry := (block_id+1) position+ 0
//! position    := u32 > 0
//! ```
//!
//! `0` is the delimiter at both nesting levels, which is why block ids are
//! stored with a +1 bias and token positions (0-based in the tokenizer) are
//! stored 1-based. Term id 0 is reserved.
//!
//! Term entries are emitted in term-id order; within a term, block entries
//! appear in the order the single pass added them, which is ascending block
//! order.

use std::collections::HashMap;

use crate::text::Token;

/// Accumulates term assignments and per-term block/position lists, then
/// flattens them into the posting stream.
#[derive(Debug, Default)]
pub struct IndexBuilder {
    term_ids: HashMap<String, u32>,
    terms: Vec<String>,
    /// Per term (index `term_id - 1`): blocks in insertion order with their
    /// 0-based token positions.
    postings: Vec<Vec<(u32, Vec<u32>)>>,
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct terms seen so far.
    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    /// Feed one block's tokens. Blocks must arrive in ascending block-id
    /// order; the builder relies on that to keep block entries sorted without
    /// a second pass.
    pub fn add_block(&mut self, block_id: u32, tokens: &[Token]) {
        for token in tokens {
            let next_id = self.terms.len() as u32 + 1;
            let term_id = *self.term_ids.entry(token.term.clone()).or_insert(next_id);
            if term_id == next_id {
                self.terms.push(token.term.clone());
                self.postings.push(Vec::new());
            }

            let list = &mut self.postings[(term_id - 1) as usize];
            match list.last_mut() {
                Some((last_block, positions)) if *last_block == block_id => {
                    positions.push(token.position);
                }
                _ => list.push((block_id, vec![token.position])),
            }
        }
    }

    /// Flatten into the `(term, term_id)` lexicon and the posting stream.
    ///
    /// Block ids are written with the +1 bias of the current pack format;
    /// positions are written 1-based.
    pub fn finish(self) -> (Vec<(String, u32)>, Vec<u32>) {
        let lexicon: Vec<(String, u32)> = self
            .terms
            .into_iter()
            .enumerate()
            .map(|(i, term)| (term, i as u32 + 1))
            .collect();

        let total: usize = self
            .postings
            .iter()
            .map(|blocks| {
                2 + blocks
                    .iter()
                    .map(|(_, positions)| positions.len() + 2)
                    .sum::<usize>()
            })
            .sum();
        let mut stream = Vec::with_capacity(total);

        for (idx, blocks) in self.postings.iter().enumerate() {
            stream.push(idx as u32 + 1);
            for (block_id, positions) in blocks {
                stream.push(block_id + 1);
                for pos in positions {
                    stream.push(pos + 1);
                }
                stream.push(0);
            }
            stream.push(0);
        }

        (lexicon, stream)
    }
}
