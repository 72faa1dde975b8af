// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! KNS tie-break signatures.
//!
//! Three streaming accumulators over the character codes of a normalized
//! string, reduced modulo three small co-prime moduli. Two near-tied blocks
//! almost never share all three residues, so the distance gives a stable,
//! deterministic ordering nudge. That is the entire job of this module: the
//! score adjustment it feeds is bounded at 2%, it can only split ties.
//!
//! Distance is the mean circular distance per modulus, so 0 and p-1 count as
//! neighbors, not opposites.

const P1: u64 = 257;
const P2: u64 = 263;
const P3: u64 = 269;

/// Compact fingerprint of a normalized string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnsSignature {
    pub s1: u32,
    pub s2: u32,
    pub s3: u32,
}

/// Compute the signature of an already-normalized string.
///
/// Character positions are 1-based: for position `j` and code `c`,
/// `s1 += c`, `s2 += c * j`, `s3 += (c << 1) ^ (j + 7)`.
pub fn kns_signature(normalized: &str) -> KnsSignature {
    let mut s1: u64 = 0;
    let mut s2: u64 = 0;
    let mut s3: u64 = 0;

    for (i, c) in normalized.chars().enumerate() {
        let code = c as u64;
        let j = i as u64 + 1;
        s1 = (s1 + code) % P1;
        s2 = (s2 + code * j) % P2;
        s3 = (s3 + ((code << 1) ^ (j + 7))) % P3;
    }

    KnsSignature {
        s1: s1 as u32,
        s2: s2 as u32,
        s3: s3 as u32,
    }
}

/// Mean circular distance between two signatures, in [0, 0.5].
///
/// Per modulus: `min(|a-b|, p-|a-b|) / p`, averaged over the three moduli.
pub fn kns_distance(a: KnsSignature, b: KnsSignature) -> f64 {
    let d1 = circular(a.s1, b.s1, P1);
    let d2 = circular(a.s2, b.s2, P2);
    let d3 = circular(a.s3, b.s3, P3);
    (d1 + d2 + d3) / 3.0
}

fn circular(a: u32, b: u32, p: u64) -> f64 {
    let diff = (i64::from(a) - i64::from(b)).unsigned_abs();
    let wrapped = diff.min(p - diff);
    wrapped as f64 / p as f64
}
