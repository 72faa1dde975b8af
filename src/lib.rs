//! Local-first knowledge retrieval over a single pack file.
//!
//! Knolo builds a self-contained binary artifact (the *pack*) from a corpus
//! of short documents and serves deterministic ranked queries against it.
//! No vector database, no network service, no background process: mount the
//! bytes, query, done.
//!
//! # Architecture
//!
//! ```text
//! build time                              query time
//! ──────────                              ──────────
//! docs ──▶ text.rs ──▶ index.rs ─┐        bytes ──▶ pack/loader.rs
//!           (tokenize) (postings) │                      │
//!          quant.rs ──────────────┤                      ▼
//!           (int8 embeddings)     ├──▶ pack/writer.rs  query/ ──▶ hits
//!                                 │        (sections)   (scan, BM25L,
//!          meta + lexicon ────────┘                      expand, rerank,
//!                                                        diversify)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use knolo::{build_pack, mount_pack, query, BuildOptions, Document, QueryOptions};
//!
//! let docs = vec![
//!     Document::new("Throttling caps the event rate across the bridge.").with_id("a"),
//!     Document::new("Debounce waits for a quiet period instead.").with_id("b"),
//! ];
//! let bytes = build_pack(&docs, &BuildOptions::default())?;
//! let pack = mount_pack(bytes)?;
//! let hits = query(&pack, "bridge throttling", &QueryOptions::default())?;
//! assert_eq!(hits[0].source.as_deref(), Some("a"));
//! ```
//!
//! # Determinism
//!
//! Identical pack bytes and identical query inputs produce bit-identical hit
//! sequences, across runs and platforms. Everything that could reorder
//! floating-point accumulation is pinned down: ordered candidate maps, a
//! fixed pipeline phase order, and explicit tie-breaks (score, then KNS
//! signature, then block id).

// Module declarations
mod build;
mod error;
mod index;
mod pack;
mod patch;
mod quant;
mod query;
mod signature;
mod text;

// Re-exports for public API
pub use build::{
    build_pack, build_pack_to, BuildOptions, Document, Quantization, QuantizationKind,
    SemanticBuildOptions,
};
pub use error::{Error, Result};
pub use pack::{
    mount_pack, mount_pack_with, Block, Pack, PackSource, PackStats, SemanticSection, PACK_VERSION,
};
pub use patch::{make_context_patch, ContextPatch, PatchBudget, Snippet};
pub use quant::{int8_similarity, quantize, QuantizedVector};
pub use query::{
    jaccard5, lex_confidence, query, validate_query_options, BlendOptions, ExpansionOptions, Hit,
    QueryOptions, RankParams, RerankMode, SemanticQueryOptions,
};
pub use signature::{kns_distance, kns_signature, KnsSignature};
pub use text::{normalize, tokenize, tokenize_terms, Token};

#[cfg(test)]
mod tests {
    //! End-to-end smoke tests over the whole pipeline. The scenario-level
    //! coverage lives in `tests/`.

    use super::*;

    fn corpus() -> Vec<Document> {
        vec![
            Document::new("React native bridge event throttling improves performance.")
                .with_id("react"),
            Document::new("Throttle limits event rate across the bridge for responsiveness.")
                .with_id("throttle")
                .with_heading("Throttle"),
            Document::new("Image caching accelerates rendering in the gallery view.")
                .with_id("cache"),
        ]
    }

    #[test]
    fn build_mount_query_happy_path() {
        let bytes = build_pack(&corpus(), &BuildOptions::default()).unwrap();
        let pack = mount_pack(bytes).unwrap();
        assert_eq!(pack.version(), PACK_VERSION);
        assert_eq!(pack.block_count(), 3);
        assert!(!pack.has_semantic());

        let hits = query(&pack, "bridge throttling", &QueryOptions::default()).unwrap();
        assert!(!hits.is_empty());
        assert!(hits
            .iter()
            .all(|h| h.source.as_deref() != Some("cache")));
    }

    #[test]
    fn round_trip_is_deterministic() {
        let options = QueryOptions::default();
        let run = || {
            let bytes = build_pack(&corpus(), &BuildOptions::default()).unwrap();
            let pack = mount_pack(bytes).unwrap();
            query(&pack, "event throttling", &options).unwrap()
        };
        let first = run();
        let second = run();
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.block_id, b.block_id);
            assert!(a.score.to_bits() == b.score.to_bits(), "scores must be bit-identical");
        }
    }

    #[test]
    fn empty_query_returns_no_hits() {
        let bytes = build_pack(&corpus(), &BuildOptions::default()).unwrap();
        let pack = mount_pack(bytes).unwrap();
        assert!(query(&pack, "", &QueryOptions::default()).unwrap().is_empty());
        assert!(query(&pack, "zzzunknown", &QueryOptions::default()).unwrap().is_empty());
    }

    #[test]
    fn concurrent_queries_share_a_pack() {
        let bytes = build_pack(&corpus(), &BuildOptions::default()).unwrap();
        let pack = std::sync::Arc::new(mount_pack(bytes).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pack = pack.clone();
                std::thread::spawn(move || {
                    query(&pack, "bridge throttling", &QueryOptions::default()).unwrap()
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for window in results.windows(2) {
            assert_eq!(window[0].len(), window[1].len());
        }
    }
}
