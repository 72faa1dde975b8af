// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! The build pipeline: documents in, pack bytes out.
//!
//! Build is one pass. Each document is markdown-stripped, tokenized, and fed
//! to the index builder; the optional embeddings are quantized; then the
//! writer frames everything. Validation runs before any work: a build either
//! returns complete pack bytes or an error, never a partial artifact.
//!
//! With the `parallel` feature, embedding quantization fans out over rayon.
//! Results are collected by index, so the artifact is byte-identical with
//! and without the feature.

mod document;

pub use document::Document;

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::index::IndexBuilder;
use crate::pack::{
    write_pack, BlockPayload, ByteRange, PackMeta, PackSections, PackStats, ScaleRange,
    SemanticLayout, SemanticMeta, PACK_VERSION,
};
use crate::quant::{quantize, QuantizedVector};
use crate::text;

/// Build-time options.
#[derive(Debug, Default)]
pub struct BuildOptions {
    /// Pre-computed embeddings to quantize into the semantic tail.
    pub semantic: Option<SemanticBuildOptions>,
    /// Opaque metadata written alongside version/stats and returned verbatim
    /// by the loader (e.g. an agent registry).
    pub meta_extra: serde_json::Map<String, Value>,
}

/// Embeddings arrive from outside the core, one per document, fixed
/// dimensionality.
#[derive(Debug)]
pub struct SemanticBuildOptions {
    pub model_id: String,
    pub embeddings: Vec<Vec<f32>>,
    pub quantization: Quantization,
}

/// Quantization scheme selector. Only int8 L2-norm with per-vector scales is
/// defined; the field exists so the pack format can grow without an options
/// break.
#[derive(Debug, Clone)]
pub struct Quantization {
    pub kind: QuantizationKind,
    pub per_vector_scale: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantizationKind {
    Int8L2Norm,
}

impl Default for Quantization {
    fn default() -> Self {
        Self {
            kind: QuantizationKind::Int8L2Norm,
            per_vector_scale: true,
        }
    }
}

/// Build a pack from documents. Returns the complete byte artifact.
pub fn build_pack(docs: &[Document], options: &BuildOptions) -> Result<Vec<u8>> {
    validate_docs(docs)?;
    let dims = match &options.semantic {
        Some(sem) => Some(validate_embeddings(docs.len(), sem)?),
        None => None,
    };

    let mut builder = IndexBuilder::new();
    let mut blocks = Vec::with_capacity(docs.len());

    for (block_id, doc) in docs.iter().enumerate() {
        let stripped = text::strip_markdown(&doc.text);
        let tokens = text::tokenize(&stripped);
        builder.add_block(block_id as u32, &tokens);
        blocks.push(BlockPayload {
            text: stripped,
            heading: doc.heading.clone(),
            doc_id: doc.id.clone(),
            namespace: doc.namespace.clone(),
            len: Some(tokens.len() as u32),
        });
    }

    let avg_block_len = if blocks.is_empty() {
        0.0
    } else {
        blocks
            .iter()
            .map(|b| f64::from(b.len.unwrap_or(0)))
            .sum::<f64>()
            / blocks.len() as f64
    };

    let (lexicon, postings) = builder.finish();

    let semantic = match (&options.semantic, dims) {
        (Some(sem), Some(dims)) => Some(build_semantic(sem, dims, blocks.len())),
        _ => None,
    };

    let sections = PackSections {
        meta: PackMeta {
            version: PACK_VERSION,
            stats: PackStats {
                docs: docs.len() as u32,
                blocks: blocks.len() as u32,
                terms: lexicon.len() as u32,
                avg_block_len: Some(avg_block_len),
            },
            extra: options.meta_extra.clone(),
        },
        lexicon,
        postings,
        blocks,
        semantic,
    };

    debug!(
        docs = docs.len(),
        terms = sections.lexicon.len(),
        semantic = sections.semantic.is_some(),
        "pack built"
    );
    write_pack(&sections)
}

/// Build and write the artifact to a file in one call.
pub fn build_pack_to(
    docs: &[Document],
    options: &BuildOptions,
    path: impl AsRef<std::path::Path>,
) -> Result<()> {
    let bytes = build_pack(docs, options)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

fn validate_docs(docs: &[Document]) -> Result<()> {
    for (i, doc) in docs.iter().enumerate() {
        if doc.text.is_empty() {
            return Err(Error::invalid(format!(
                "doc at index {i}: text must be a non-empty string"
            )));
        }
    }
    Ok(())
}

/// Check count, dimensionality, and finiteness; returns the dimensionality.
fn validate_embeddings(doc_count: usize, sem: &SemanticBuildOptions) -> Result<usize> {
    if !sem.quantization.per_vector_scale || sem.quantization.kind != QuantizationKind::Int8L2Norm {
        return Err(Error::invalid(
            "quantization: only int8_l2norm with per-vector scales is supported",
        ));
    }
    if sem.embeddings.len() != doc_count {
        return Err(Error::invalid(format!(
            "embeddings: expected {doc_count} vectors, got {}",
            sem.embeddings.len()
        )));
    }
    let dims = sem.embeddings.first().map_or(0, Vec::len);
    if dims == 0 {
        return Err(Error::invalid("embeddings[0]: dimensionality must be positive"));
    }
    for (i, embedding) in sem.embeddings.iter().enumerate() {
        if embedding.len() != dims {
            return Err(Error::invalid(format!(
                "embeddings[{i}]: expected dims {dims}, got {}",
                embedding.len()
            )));
        }
        if !embedding.iter().all(|x| x.is_finite()) {
            return Err(Error::invalid(format!(
                "embeddings[{i}]: contains a non-finite value"
            )));
        }
    }
    Ok(dims)
}

/// Quantize all embeddings and lay out the blob: vectors first, scales after.
fn build_semantic(
    sem: &SemanticBuildOptions,
    dims: usize,
    block_count: usize,
) -> (SemanticMeta, Vec<u8>) {
    #[cfg(feature = "parallel")]
    let quantized: Vec<QuantizedVector> =
        sem.embeddings.par_iter().map(|e| quantize(e)).collect();
    #[cfg(not(feature = "parallel"))]
    let quantized: Vec<QuantizedVector> = sem.embeddings.iter().map(|e| quantize(e)).collect();

    let vectors_len = block_count * dims;
    let scales_len = block_count * 2;
    let mut blob = Vec::with_capacity(vectors_len + scales_len);
    for q in &quantized {
        blob.extend(q.values.iter().map(|&v| v as u8));
    }
    for q in &quantized {
        blob.extend_from_slice(&q.scale_bits.to_le_bytes());
    }

    let meta = SemanticMeta {
        version: 1,
        model_id: sem.model_id.clone(),
        dims: dims as u32,
        encoding: "int8_l2norm".to_string(),
        per_vector_scale: true,
        blocks: SemanticLayout {
            vectors: ByteRange {
                byte_offset: 0,
                length: vectors_len as u32,
            },
            scales: ScaleRange {
                byte_offset: vectors_len as u32,
                length: scales_len as u32,
                encoding: "float16".to_string(),
            },
        },
    };
    (meta, blob)
}
