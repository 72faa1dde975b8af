// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Deterministic int8 quantization for the semantic section.
//!
//! Embeddings arrive pre-computed; we never run a model. Each vector is
//! L2-normalized, scaled so its largest component maps to 127, and rounded
//! half-away-from-zero into `[-127, 127]`. The lower bound is -127, not -128:
//! the representable range stays symmetric, so dot products of two quantized
//! vectors cannot be skewed by one asymmetric code point.
//!
//! The per-vector scale is persisted as IEEE-754 binary16. Dequantization is
//! `scale * q[i]`, done on the fly during rerank; nothing is ever decoded
//! into an f32 buffer.

use half::f16;

/// One quantized embedding: int8 codes plus the f16-encoded scale bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantizedVector {
    pub values: Vec<i8>,
    /// IEEE-754 binary16 bit pattern of the per-vector scale.
    pub scale_bits: u16,
}

impl QuantizedVector {
    /// Scale decoded back to f32.
    pub fn scale(&self) -> f32 {
        f16::from_bits(self.scale_bits).to_f32()
    }
}

/// Quantize one raw embedding.
///
/// A zero-norm input produces an all-zero vector with scale 0; the rerank
/// path then yields similarity 0 for it instead of dividing by nothing.
/// Inputs must be finite; the build pipeline validates that before calling.
pub fn quantize(embedding: &[f32]) -> QuantizedVector {
    let norm = embedding.iter().map(|x| f64::from(*x) * f64::from(*x)).sum::<f64>().sqrt();
    if norm == 0.0 {
        return QuantizedVector {
            values: vec![0; embedding.len()],
            scale_bits: 0,
        };
    }

    let unit: Vec<f64> = embedding.iter().map(|x| f64::from(*x) / norm).collect();
    let max_abs = unit.iter().fold(0.0_f64, |acc, x| acc.max(x.abs()));
    let scale = max_abs / 127.0;

    let values = unit.iter().map(|n| round_clamp(n / scale)).collect();

    QuantizedVector {
        values,
        scale_bits: f16::from_f64(scale).to_bits(),
    }
}

/// Round half away from zero, then clamp into the symmetric int8 range.
fn round_clamp(x: f64) -> i8 {
    // f64::round is round-half-away-from-zero
    x.round().clamp(-127.0, 127.0) as i8
}

/// Dequantized dot product of two int8 vectors with their scales.
///
/// For unit-norm inputs the result lands approximately in [-1, 1].
pub fn int8_similarity(a: &[i8], a_scale: f32, b: &[i8], b_scale: f32) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    let dot: i64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| i64::from(*x) * i64::from(*y))
        .sum();
    dot as f64 * f64::from(a_scale) * f64::from(b_scale)
}

/// Decode a stored binary16 scale.
pub fn decode_scale(bits: u16) -> f32 {
    f16::from_bits(bits).to_f32()
}
