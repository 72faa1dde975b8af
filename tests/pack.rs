// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Container-level tests: layout, legacy version tolerance, malformed input
//! rejection, and metadata pass-through.

use knolo::{
    build_pack, build_pack_to, mount_pack, mount_pack_with, query, BuildOptions, Document, Error,
    QueryOptions, Quantization, SemanticBuildOptions, PACK_VERSION,
};

fn push_section(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
}

fn push_postings(buf: &mut Vec<u8>, entries: &[u32]) {
    buf.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    for e in entries {
        buf.extend_from_slice(&e.to_le_bytes());
    }
}

/// A hand-written v1 pack: string blocks, raw posting block ids, no tail.
fn legacy_v1_pack() -> Vec<u8> {
    let mut buf = Vec::new();
    push_section(
        &mut buf,
        br#"{"version":1,"stats":{"docs":2,"blocks":2,"terms":2}}"#,
    );
    push_section(&mut buf, br#"[["alpha",1],["beta",2]]"#);
    // alpha: block 1 (raw), position 1; beta: block 1, position 2
    push_postings(&mut buf, &[1, 1, 1, 0, 0, 2, 1, 2, 0, 0]);
    push_section(&mut buf, br#"["","alpha beta"]"#);
    buf
}

#[test]
fn current_packs_declare_version_3() {
    let bytes = build_pack(&[Document::new("hello")], &BuildOptions::default()).unwrap();
    let pack = mount_pack(bytes).unwrap();
    assert_eq!(pack.version(), PACK_VERSION);
    assert_eq!(pack.version(), 3);
}

#[test]
fn legacy_v1_pack_mounts_tolerantly() {
    let pack = mount_pack(legacy_v1_pack()).unwrap();
    assert_eq!(pack.version(), 1);
    assert!(!pack.has_semantic());
    // token lengths recomputed from the string blocks
    assert_eq!(pack.block(0).token_len, 0);
    assert_eq!(pack.block(1).token_len, 2);
    assert_eq!(pack.block(1).heading, None);

    let hits = query(&pack, "alpha", &QueryOptions::default()).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].block_id, 1);
}

#[test]
fn legacy_v2_pack_recomputes_missing_lengths() {
    let mut buf = Vec::new();
    push_section(
        &mut buf,
        br#"{"version":2,"stats":{"docs":1,"blocks":2,"terms":1}}"#,
    );
    push_section(&mut buf, br#"[["gamma",1]]"#);
    // raw block id 1 (v2: no +1 bias)
    push_postings(&mut buf, &[1, 1, 1, 0, 0]);
    push_section(
        &mut buf,
        br#"[{"text":"filler","heading":null,"docId":null,"namespace":null},{"text":"gamma rays","heading":"Gamma","docId":"g","namespace":null}]"#,
    );
    // stats.blocks=2 but docs=1 is tolerated; blocks count is what must match
    let pack = mount_pack(buf).unwrap();
    assert_eq!(pack.version(), 2);
    assert_eq!(pack.block(1).token_len, 0);

    let hits = query(&pack, "gamma", &QueryOptions::default()).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].source.as_deref(), Some("g"));
}

#[test]
fn future_versions_are_refused() {
    let mut buf = Vec::new();
    push_section(
        &mut buf,
        br#"{"version":9,"stats":{"docs":0,"blocks":0,"terms":0}}"#,
    );
    push_section(&mut buf, b"[]");
    push_postings(&mut buf, &[]);
    push_section(&mut buf, b"[]");
    let err = mount_pack(buf).unwrap_err();
    assert!(matches!(err, Error::VersionUnsupported { found: 9, .. }));
}

#[test]
fn truncated_buffer_is_malformed() {
    let bytes = build_pack(&[Document::new("hello world")], &BuildOptions::default()).unwrap();
    let cut = bytes[..bytes.len() / 2].to_vec();
    assert!(matches!(mount_pack(cut).unwrap_err(), Error::MalformedPack(_)));
}

#[test]
fn garbage_json_is_malformed() {
    let mut buf = Vec::new();
    push_section(&mut buf, b"{not json");
    let err = mount_pack(buf).unwrap_err();
    assert!(matches!(err, Error::MalformedPack(_)));
    assert!(err.to_string().contains("meta"));
}

#[test]
fn unknown_term_in_postings_is_malformed() {
    let mut buf = Vec::new();
    push_section(
        &mut buf,
        br#"{"version":3,"stats":{"docs":1,"blocks":1,"terms":1}}"#,
    );
    push_section(&mut buf, br#"[["only",1]]"#);
    push_postings(&mut buf, &[7, 1, 1, 0, 0]); // term 7 does not exist
    push_section(
        &mut buf,
        br#"[{"text":"only","heading":null,"docId":null,"namespace":null,"len":1}]"#,
    );
    let err = mount_pack(buf).unwrap_err();
    assert!(err.to_string().contains("term id 7"));
}

#[test]
fn out_of_range_block_is_malformed() {
    let mut buf = Vec::new();
    push_section(
        &mut buf,
        br#"{"version":3,"stats":{"docs":1,"blocks":1,"terms":1}}"#,
    );
    push_section(&mut buf, br#"[["only",1]]"#);
    push_postings(&mut buf, &[1, 5, 1, 0, 0]); // stored 5 -> block 4 of 1
    push_section(
        &mut buf,
        br#"[{"text":"only","heading":null,"docId":null,"namespace":null,"len":1}]"#,
    );
    let err = mount_pack(buf).unwrap_err();
    assert!(err.to_string().contains("block id 4"));
}

#[test]
fn stats_block_mismatch_is_malformed() {
    let mut buf = Vec::new();
    push_section(
        &mut buf,
        br#"{"version":3,"stats":{"docs":2,"blocks":2,"terms":0}}"#,
    );
    push_section(&mut buf, b"[]");
    push_postings(&mut buf, &[]);
    push_section(&mut buf, br#"["only one block"]"#);
    let err = mount_pack(buf).unwrap_err();
    assert!(err.to_string().contains("stats.blocks"));
}

#[test]
fn opaque_metadata_round_trips() {
    let mut extra = serde_json::Map::new();
    extra.insert(
        "agentRegistry".to_string(),
        serde_json::json!({"tools": ["search", "summarize"], "rev": 4}),
    );
    let options = BuildOptions {
        semantic: None,
        meta_extra: extra,
    };
    let pack = mount_pack(build_pack(&[Document::new("hi there")], &options).unwrap()).unwrap();
    let registry = &pack.meta_extra()["agentRegistry"];
    assert_eq!(registry["tools"][1], "summarize");
    assert_eq!(registry["rev"], 4);
}

#[test]
fn metadata_hook_can_reject_a_mount() {
    let mut extra = serde_json::Map::new();
    extra.insert("registry".to_string(), serde_json::json!({"rev": 1}));
    let bytes = build_pack(
        &[Document::new("content")],
        &BuildOptions {
            semantic: None,
            meta_extra: extra,
        },
    )
    .unwrap();

    let accepted = mount_pack_with(bytes.clone(), |meta| {
        if meta.contains_key("registry") {
            Ok(())
        } else {
            Err("registry missing".into())
        }
    });
    assert!(accepted.is_ok());

    let rejected = mount_pack_with(bytes, |meta| {
        match meta["registry"]["rev"].as_u64() {
            Some(rev) if rev >= 2 => Ok(()),
            _ => Err("registry too old".into()),
        }
    });
    let err = rejected.unwrap_err();
    assert!(err.to_string().contains("registry too old"));
}

#[test]
fn semantic_tail_round_trips() {
    let docs = vec![
        Document::new("first block text"),
        Document::new("second block text"),
    ];
    let options = BuildOptions {
        semantic: Some(SemanticBuildOptions {
            model_id: "mini-embedder-v2".into(),
            embeddings: vec![vec![0.6, 0.8, 0.0], vec![0.0, 0.0, 1.0]],
            quantization: Quantization::default(),
        }),
        meta_extra: serde_json::Map::new(),
    };
    let pack = mount_pack(build_pack(&docs, &options).unwrap()).unwrap();

    let semantic = pack.semantic().expect("semantic section present");
    assert_eq!(semantic.model_id, "mini-embedder-v2");
    assert_eq!(semantic.dims, 3);
    assert_eq!(semantic.vector(0), &[95i8, 127, 0]);
    assert_eq!(semantic.vector(1), &[0i8, 0, 127]);
    assert!(semantic.scale(0) > 0.0);
}

#[test]
fn pack_without_tail_reports_no_semantic() {
    let pack =
        mount_pack(build_pack(&[Document::new("plain")], &BuildOptions::default()).unwrap())
            .unwrap();
    assert!(!pack.has_semantic());
    assert!(pack.semantic().is_none());
}

#[test]
fn file_round_trip_through_build_pack_to() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("corpus.knolo");

    let docs = vec![
        Document::new("persisted to disk and mounted back").with_id("disk"),
        Document::new("other unrelated entry").with_id("other"),
    ];
    build_pack_to(&docs, &BuildOptions::default(), &path).unwrap();

    let pack = mount_pack(path.as_path()).unwrap();
    assert_eq!(pack.block_count(), 2);
    let hits = query(&pack, "mounted disk", &QueryOptions::default()).unwrap();
    assert_eq!(hits[0].source.as_deref(), Some("disk"));
}

#[test]
fn byte_identical_rebuilds() {
    let docs = vec![
        Document::new("determinism is a feature").with_id("a"),
        Document::new("not an accident").with_id("b"),
    ];
    let first = build_pack(&docs, &BuildOptions::default()).unwrap();
    let second = build_pack(&docs, &BuildOptions::default()).unwrap();
    assert_eq!(first, second);
}
