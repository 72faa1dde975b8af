// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Serde shapes for the JSON sections of a pack.
//!
//! Field names are camelCase on the wire. Unknown metadata fields are kept
//! verbatim in `extra` and written back untouched; the core never interprets
//! them (higher layers embed things like agent registries there).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Metadata section: format version, corpus stats, opaque pass-through.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackMeta {
    pub version: u32,
    pub stats: PackStats,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Corpus statistics persisted for query-time scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackStats {
    pub docs: u32,
    pub blocks: u32,
    pub terms: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_block_len: Option<f64>,
}

/// One block as persisted in the blocks JSON array (v2/v3).
///
/// `heading`/`docId`/`namespace` serialize as explicit nulls when absent;
/// `len` is the token count so queries never re-tokenize for length
/// normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockPayload {
    pub text: String,
    pub heading: Option<String>,
    pub doc_id: Option<String>,
    pub namespace: Option<String>,
    #[serde(default)]
    pub len: Option<u32>,
}

/// Semantic section descriptor; the blob layout is self-describing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticMeta {
    pub version: u32,
    pub model_id: String,
    pub dims: u32,
    /// Always `"int8_l2norm"`; anything else is refused at mount.
    pub encoding: String,
    pub per_vector_scale: bool,
    pub blocks: SemanticLayout,
}

/// Byte ranges of the two regions inside the semantic blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticLayout {
    pub vectors: ByteRange,
    pub scales: ScaleRange,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ByteRange {
    pub byte_offset: u32,
    pub length: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleRange {
    pub byte_offset: u32,
    pub length: u32,
    /// Always `"float16"`.
    pub encoding: String,
}

/// Blocks section: `string[]` in v1 packs, objects from v2 on.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum BlocksJson {
    Legacy(Vec<String>),
    Payload(Vec<BlockPayload>),
}
