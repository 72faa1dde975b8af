// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Serialization of built sections into pack bytes.
//!
//! The writer is the trivial half of the format: every section is already
//! assembled by the build pipeline, so this is framing only. Determinism
//! matters here — the same sections must serialize to the same bytes, which
//! holds because struct fields serialize in declaration order and the opaque
//! metadata map is key-sorted.

use tracing::debug;

use super::meta::{BlockPayload, PackMeta, SemanticMeta};
use super::write_section;
use crate::error::{Error, Result};

/// Fully assembled sections, ready for framing.
#[derive(Debug)]
pub struct PackSections {
    pub meta: PackMeta,
    /// `(term, term_id)` pairs in ascending term id.
    pub lexicon: Vec<(String, u32)>,
    pub postings: Vec<u32>,
    pub blocks: Vec<BlockPayload>,
    /// Present iff the pack carries a semantic tail.
    pub semantic: Option<(SemanticMeta, Vec<u8>)>,
}

/// Frame the sections into the final byte artifact.
pub fn write_pack(sections: &PackSections) -> Result<Vec<u8>> {
    let meta_bytes = serde_json::to_vec(&sections.meta)
        .map_err(|e| Error::Internal(format!("meta serialization failed: {e}")))?;
    let lex_bytes = serde_json::to_vec(&sections.lexicon)
        .map_err(|e| Error::Internal(format!("lexicon serialization failed: {e}")))?;
    let blk_bytes = serde_json::to_vec(&sections.blocks)
        .map_err(|e| Error::Internal(format!("blocks serialization failed: {e}")))?;

    let mut buf = Vec::with_capacity(
        meta_bytes.len() + lex_bytes.len() + blk_bytes.len() + sections.postings.len() * 4 + 64,
    );

    write_section(&mut buf, &meta_bytes);
    write_section(&mut buf, &lex_bytes);

    // postings: count of u32 entries, then the entries
    buf.extend_from_slice(&(sections.postings.len() as u32).to_le_bytes());
    for value in &sections.postings {
        buf.extend_from_slice(&value.to_le_bytes());
    }

    write_section(&mut buf, &blk_bytes);

    if let Some((sem_meta, blob)) = &sections.semantic {
        let sem_bytes = serde_json::to_vec(sem_meta)
            .map_err(|e| Error::Internal(format!("semantic meta serialization failed: {e}")))?;
        write_section(&mut buf, &sem_bytes);
        write_section(&mut buf, blob);
    }

    debug!(
        bytes = buf.len(),
        blocks = sections.blocks.len(),
        terms = sections.lexicon.len(),
        semantic = sections.semantic.is_some(),
        "pack serialized"
    );
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::meta::PackStats;

    fn minimal_sections() -> PackSections {
        PackSections {
            meta: PackMeta {
                version: 3,
                stats: PackStats {
                    docs: 1,
                    blocks: 1,
                    terms: 1,
                    avg_block_len: Some(1.0),
                },
                extra: serde_json::Map::new(),
            },
            lexicon: vec![("hello".into(), 1)],
            postings: vec![1, 1, 1, 0, 0],
            blocks: vec![BlockPayload {
                text: "hello".into(),
                heading: None,
                doc_id: None,
                namespace: None,
                len: Some(1),
            }],
            semantic: None,
        }
    }

    #[test]
    fn layout_starts_with_meta_length() {
        let bytes = write_pack(&minimal_sections()).unwrap();
        let meta_len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        let meta: serde_json::Value = serde_json::from_slice(&bytes[4..4 + meta_len]).unwrap();
        assert_eq!(meta["version"], 3);
    }

    #[test]
    fn identical_sections_serialize_identically() {
        let a = write_pack(&minimal_sections()).unwrap();
        let b = write_pack(&minimal_sections()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn postings_count_is_entries_not_bytes() {
        let sections = minimal_sections();
        let bytes = write_pack(&sections).unwrap();
        // skip meta + lexicon sections
        let meta_len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        let lex_off = 4 + meta_len;
        let lex_len = u32::from_le_bytes([
            bytes[lex_off],
            bytes[lex_off + 1],
            bytes[lex_off + 2],
            bytes[lex_off + 3],
        ]) as usize;
        let post_off = lex_off + 4 + lex_len;
        let count = u32::from_le_bytes([
            bytes[post_off],
            bytes[post_off + 1],
            bytes[post_off + 2],
            bytes[post_off + 3],
        ]);
        assert_eq!(count as usize, sections.postings.len());
    }
}
