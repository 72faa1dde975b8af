// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Mounting pack bytes into typed, queryable views.
//!
//! `mount_pack` is the only place in the crate that performs I/O, and only to
//! resolve a byte source (file read or URL fetch). Everything after buffer
//! acquisition is synchronous parsing. A mounted [`Pack`] is immutable and
//! safe to share across threads; queries borrow it read-only.
//!
//! The loader is tolerant of older formats (see the version gates in the
//! module docs of [`crate::pack`]) and refuses future ones. Structural
//! validation is eager: a pack that mounts successfully has a well-formed
//! posting stream whose term ids all exist in the lexicon and whose block
//! ids are all in range.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use super::meta::{BlocksJson, PackMeta, SemanticMeta};
use super::{SectionReader, BLOCK_ID_BIAS_VERSION, MAX_POSTING_ENTRIES, PACK_VERSION};
use crate::error::{Error, Result};
use crate::quant::decode_scale;
use crate::text;

/// Where pack bytes come from.
#[derive(Debug, Clone)]
pub enum PackSource {
    Bytes(Vec<u8>),
    File(PathBuf),
    /// Requires the `remote` feature; resolved with one blocking GET.
    Url(String),
}

impl From<Vec<u8>> for PackSource {
    fn from(bytes: Vec<u8>) -> Self {
        PackSource::Bytes(bytes)
    }
}

impl From<&[u8]> for PackSource {
    fn from(bytes: &[u8]) -> Self {
        PackSource::Bytes(bytes.to_vec())
    }
}

impl From<PathBuf> for PackSource {
    fn from(path: PathBuf) -> Self {
        PackSource::File(path)
    }
}

impl From<&Path> for PackSource {
    fn from(path: &Path) -> Self {
        PackSource::File(path.to_path_buf())
    }
}

impl PackSource {
    /// Resolve to bytes. The single suspension point of the mount path.
    fn resolve(self) -> Result<Vec<u8>> {
        match self {
            PackSource::Bytes(bytes) => Ok(bytes),
            PackSource::File(path) => Ok(std::fs::read(&path)?),
            #[cfg(feature = "remote")]
            PackSource::Url(url) => {
                let response = reqwest::blocking::get(&url)
                    .and_then(reqwest::blocking::Response::error_for_status)
                    .map_err(|e| Error::invalid(format!("fetching {url}: {e}")))?;
                let bytes = response
                    .bytes()
                    .map_err(|e| Error::invalid(format!("reading body of {url}: {e}")))?;
                Ok(bytes.to_vec())
            }
            #[cfg(not(feature = "remote"))]
            PackSource::Url(url) => Err(Error::invalid(format!(
                "url source {url} requires the `remote` feature"
            ))),
        }
    }
}

/// One retrievable block with its payload fields.
#[derive(Debug, Clone)]
pub struct Block {
    pub text: String,
    pub heading: Option<String>,
    pub doc_id: Option<String>,
    pub namespace: Option<String>,
    /// Persisted token count; 0 means "recompute on demand" (v2 packs that
    /// omitted it).
    pub token_len: u32,
}

impl Block {
    /// Token count, recomputing from text when the pack did not persist one.
    pub fn effective_len(&self) -> u32 {
        if self.token_len > 0 || self.text.is_empty() {
            self.token_len
        } else {
            text::tokenize_terms(&self.text).len() as u32
        }
    }
}

/// Decoded semantic tail: int8 vectors plus per-block float16 scales.
#[derive(Debug, Clone)]
pub struct SemanticSection {
    pub model_id: String,
    pub dims: usize,
    vectors: Vec<i8>,
    scales: Vec<u16>,
}

impl SemanticSection {
    pub fn vector(&self, block_id: usize) -> &[i8] {
        let start = block_id * self.dims;
        &self.vectors[start..start + self.dims]
    }

    pub fn scale(&self, block_id: usize) -> f32 {
        decode_scale(self.scales[block_id])
    }
}

/// A mounted, immutable pack.
#[derive(Debug)]
pub struct Pack {
    meta: PackMeta,
    /// Term by `term_id - 1`.
    terms: Vec<String>,
    term_lookup: HashMap<String, u32>,
    postings: Vec<u32>,
    blocks: Vec<Block>,
    /// 1 for packs that store posting block ids as `block_id + 1`, else 0.
    id_bias: u32,
    avg_block_len: f64,
    semantic: Option<SemanticSection>,
}

impl Pack {
    pub fn version(&self) -> u32 {
        self.meta.version
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block(&self, block_id: u32) -> &Block {
        &self.blocks[block_id as usize]
    }

    pub fn term_id(&self, term: &str) -> Option<u32> {
        self.term_lookup.get(term).copied()
    }

    pub fn term(&self, term_id: u32) -> Option<&str> {
        let index = (term_id as usize).checked_sub(1)?;
        self.terms.get(index).map(String::as_str)
    }

    pub fn postings(&self) -> &[u32] {
        &self.postings
    }

    pub(crate) fn id_bias(&self) -> u32 {
        self.id_bias
    }

    pub fn avg_block_len(&self) -> f64 {
        self.avg_block_len
    }

    pub fn stats(&self) -> &super::meta::PackStats {
        &self.meta.stats
    }

    /// Opaque metadata fields carried alongside version/stats.
    pub fn meta_extra(&self) -> &serde_json::Map<String, Value> {
        &self.meta.extra
    }

    pub fn semantic(&self) -> Option<&SemanticSection> {
        self.semantic.as_ref()
    }

    pub fn has_semantic(&self) -> bool {
        self.semantic.is_some()
    }
}

/// Mount a pack from a byte source.
pub fn mount_pack(src: impl Into<PackSource>) -> Result<Pack> {
    mount_inner(src.into(), None)
}

/// Mount with a caller-supplied hook that validates the opaque metadata
/// fields (e.g. an embedded registry). The hook runs after JSON parsing and
/// before any further decoding; a rejection aborts the mount.
pub fn mount_pack_with(
    src: impl Into<PackSource>,
    validate_meta: impl FnOnce(&serde_json::Map<String, Value>) -> std::result::Result<(), String>,
) -> Result<Pack> {
    mount_inner(src.into(), Some(Box::new(validate_meta)))
}

type MetaHook<'a> =
    Box<dyn FnOnce(&serde_json::Map<String, Value>) -> std::result::Result<(), String> + 'a>;

fn mount_inner(src: PackSource, hook: Option<MetaHook<'_>>) -> Result<Pack> {
    let bytes = src.resolve()?;
    let mut reader = SectionReader::new(&bytes);

    // --- metadata ---
    let meta_bytes = reader.read_section("meta")?;
    let meta: PackMeta = serde_json::from_slice(meta_bytes)
        .map_err(|e| Error::malformed(format!("meta JSON: {e}")))?;
    if meta.version == 0 {
        return Err(Error::malformed("meta version must be >= 1"));
    }
    if meta.version > PACK_VERSION {
        return Err(Error::VersionUnsupported {
            found: meta.version,
            supported: PACK_VERSION,
        });
    }
    if let Some(hook) = hook {
        hook(&meta.extra).map_err(|msg| Error::malformed(format!("metadata rejected: {msg}")))?;
    }

    // --- lexicon ---
    let lex_bytes = reader.read_section("lexicon")?;
    let lexicon: Vec<(String, u32)> = serde_json::from_slice(lex_bytes)
        .map_err(|e| Error::malformed(format!("lexicon JSON: {e}")))?;
    let mut terms = Vec::with_capacity(lexicon.len());
    let mut term_lookup = HashMap::with_capacity(lexicon.len());
    for (idx, (term, term_id)) in lexicon.into_iter().enumerate() {
        if term_id as usize != idx + 1 {
            return Err(Error::malformed(format!(
                "lexicon entry {idx} has id {term_id}, expected {}",
                idx + 1
            )));
        }
        term_lookup.insert(term.clone(), term_id);
        terms.push(term);
    }

    // --- postings ---
    let post_count = reader.read_u32("postings")?;
    if post_count > MAX_POSTING_ENTRIES {
        return Err(Error::malformed(format!(
            "posting stream claims {post_count} entries (limit {MAX_POSTING_ENTRIES})"
        )));
    }
    let post_bytes = reader.read_bytes(post_count as usize * 4, "postings")?;
    let postings: Vec<u32> = post_bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    // --- blocks ---
    let blk_bytes = reader.read_section("blocks")?;
    let blocks_json: BlocksJson = serde_json::from_slice(blk_bytes)
        .map_err(|e| Error::malformed(format!("blocks JSON: {e}")))?;
    let blocks: Vec<Block> = match blocks_json {
        BlocksJson::Legacy(texts) => texts
            .into_iter()
            .map(|text_content| {
                let token_len = text::tokenize_terms(&text_content).len() as u32;
                Block {
                    text: text_content,
                    heading: None,
                    doc_id: None,
                    namespace: None,
                    token_len,
                }
            })
            .collect(),
        BlocksJson::Payload(payloads) => payloads
            .into_iter()
            .map(|p| Block {
                text: p.text,
                heading: p.heading,
                doc_id: p.doc_id,
                namespace: p.namespace,
                token_len: p.len.unwrap_or(0),
            })
            .collect(),
    };

    if meta.stats.blocks as usize != blocks.len() {
        return Err(Error::malformed(format!(
            "stats.blocks is {} but the blocks section holds {}",
            meta.stats.blocks,
            blocks.len()
        )));
    }
    if meta.stats.terms as usize != terms.len() {
        return Err(Error::malformed(format!(
            "stats.terms is {} but the lexicon holds {}",
            meta.stats.terms,
            terms.len()
        )));
    }

    // --- optional semantic tail ---
    let semantic = if reader.remaining() > 0 {
        let sem_bytes = reader.read_section("semantic meta")?;
        let sem_meta: SemanticMeta = serde_json::from_slice(sem_bytes)
            .map_err(|e| Error::malformed(format!("semantic JSON: {e}")))?;
        let blob = reader.read_section("semantic blob")?;
        Some(decode_semantic(&sem_meta, blob, blocks.len())?)
    } else {
        None
    };

    // --- stream validation ---
    let id_bias = u32::from(meta.version >= BLOCK_ID_BIAS_VERSION);
    validate_stream(&postings, terms.len() as u32, blocks.len() as u32, id_bias)?;

    let avg_block_len = match meta.stats.avg_block_len {
        Some(avg) if avg > 0.0 => avg,
        _ => {
            if blocks.is_empty() {
                0.0
            } else {
                blocks.iter().map(|b| f64::from(b.effective_len())).sum::<f64>()
                    / blocks.len() as f64
            }
        }
    };

    debug!(
        version = meta.version,
        blocks = blocks.len(),
        terms = terms.len(),
        postings = postings.len(),
        semantic = semantic.is_some(),
        "pack mounted"
    );

    Ok(Pack {
        meta,
        terms,
        term_lookup,
        postings,
        blocks,
        id_bias,
        avg_block_len,
        semantic,
    })
}

fn decode_semantic(
    sem_meta: &SemanticMeta,
    blob: &[u8],
    block_count: usize,
) -> Result<SemanticSection> {
    if sem_meta.encoding != "int8_l2norm" {
        return Err(Error::malformed(format!(
            "semantic encoding {:?} is not int8_l2norm",
            sem_meta.encoding
        )));
    }
    let dims = sem_meta.dims as usize;
    if dims == 0 {
        return Err(Error::malformed("semantic dims must be positive"));
    }

    let vec_range = &sem_meta.blocks.vectors;
    let scale_range = &sem_meta.blocks.scales;
    let vectors_bytes = slice_range(blob, vec_range.byte_offset, vec_range.length, "vectors")?;
    let scales_bytes = slice_range(blob, scale_range.byte_offset, scale_range.length, "scales")?;

    if vectors_bytes.len() != block_count * dims {
        return Err(Error::malformed(format!(
            "semantic vectors hold {} bytes, expected {} ({} blocks x {} dims)",
            vectors_bytes.len(),
            block_count * dims,
            block_count,
            dims
        )));
    }
    if scales_bytes.len() != block_count * 2 {
        return Err(Error::malformed(format!(
            "semantic scales hold {} bytes, expected {}",
            scales_bytes.len(),
            block_count * 2
        )));
    }

    let vectors: Vec<i8> = vectors_bytes.iter().map(|&b| b as i8).collect();
    let scales: Vec<u16> = scales_bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();

    Ok(SemanticSection {
        model_id: sem_meta.model_id.clone(),
        dims,
        vectors,
        scales,
    })
}

fn slice_range<'a>(blob: &'a [u8], offset: u32, length: u32, what: &str) -> Result<&'a [u8]> {
    let start = offset as usize;
    let end = start
        .checked_add(length as usize)
        .ok_or_else(|| Error::malformed(format!("semantic {what} range overflows")))?;
    blob.get(start..end).ok_or_else(|| {
        Error::malformed(format!(
            "semantic {what} range {start}..{end} exceeds blob of {} bytes",
            blob.len()
        ))
    })
}

/// Walk the stream once, checking the grammar, term-id range, and block-id
/// range. Positions only need to be nonzero for the walk itself.
fn validate_stream(stream: &[u32], term_count: u32, block_count: u32, bias: u32) -> Result<()> {
    let mut i = 0;
    while i < stream.len() {
        let term_id = stream[i];
        if term_id == 0 || term_id > term_count {
            return Err(Error::malformed(format!(
                "posting stream references term id {term_id} outside the lexicon (1..={term_count})"
            )));
        }
        i += 1;

        let mut blocks_seen = 0u32;
        loop {
            let stored = *stream
                .get(i)
                .ok_or_else(|| Error::malformed("posting stream truncated inside a term entry"))?;
            i += 1;
            if stored == 0 {
                if blocks_seen == 0 {
                    return Err(Error::malformed(format!(
                        "term id {term_id} has an empty posting entry"
                    )));
                }
                break;
            }

            let block_id = stored - bias;
            if block_id >= block_count {
                return Err(Error::malformed(format!(
                    "posting stream references block id {block_id} but the pack has {block_count} blocks"
                )));
            }
            blocks_seen += 1;

            let mut positions_seen = 0u32;
            loop {
                let p = *stream.get(i).ok_or_else(|| {
                    Error::malformed("posting stream truncated inside a block entry")
                })?;
                i += 1;
                if p == 0 {
                    if positions_seen == 0 {
                        return Err(Error::malformed(format!(
                            "block id {block_id} has a posting entry with no positions"
                        )));
                    }
                    break;
                }
                positions_seen += 1;
            }
        }
    }
    Ok(())
}
