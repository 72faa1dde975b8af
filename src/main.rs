// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Knolo CLI: build, inspect, and query `.knolo` packs.
//!
//! ```bash
//! # Build a pack from a JSON documents file
//! knolo build --input docs.json --output corpus.knolo
//!
//! # Inspect the pack structure
//! knolo inspect corpus.knolo
//!
//! # Query it
//! knolo query corpus.knolo "bridge throttling" --top-k 5
//! ```
//!
//! Logging goes through `tracing`; set `KNOLO_LOG=debug` (or `RUST_LOG`) to
//! see build and query phase timings.

use std::fs;
use std::path::Path;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use knolo::{
    build_pack_to, make_context_patch, mount_pack, query, BuildOptions, Document, Pack,
    QueryOptions, Quantization, Result, SemanticBuildOptions,
};

mod cli;
use cli::{Cli, Commands};

fn main() {
    let filter = EnvFilter::try_from_env("KNOLO_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Commands::Build {
            input,
            output,
            embeddings,
            model_id,
        } => run_build(&input, &output, embeddings.as_deref(), &model_id),
        Commands::Inspect { pack } => run_inspect(&pack),
        Commands::Query {
            pack,
            query,
            top_k,
            namespace,
            source,
            require_phrases,
            min_score,
            no_expansion,
            json,
            patch,
        } => {
            let mut options = QueryOptions {
                top_k,
                min_score,
                require_phrases,
                namespace,
                source,
                ..QueryOptions::default()
            };
            options.expansion.enabled = !no_expansion;
            run_query(&pack, &query, &options, json, patch)
        }
    };

    if let Err(e) = outcome {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run_build(
    input: &Path,
    output: &Path,
    embeddings: Option<&Path>,
    model_id: &str,
) -> Result<()> {
    let docs: Vec<Document> = serde_json::from_slice(&fs::read(input)?)
        .map_err(|e| knolo::Error::InvalidInput(format!("{}: {e}", input.display())))?;

    let mut options = BuildOptions::default();
    if let Some(path) = embeddings {
        let vectors: Vec<Vec<f32>> = serde_json::from_slice(&fs::read(path)?)
            .map_err(|e| knolo::Error::InvalidInput(format!("{}: {e}", path.display())))?;
        options.semantic = Some(SemanticBuildOptions {
            model_id: model_id.to_string(),
            embeddings: vectors,
            quantization: Quantization::default(),
        });
    }

    build_pack_to(&docs, &options, output)?;
    let size = fs::metadata(output)?.len();
    println!(
        "wrote {} ({} docs, {} bytes)",
        output.display(),
        docs.len(),
        size
    );
    Ok(())
}

fn run_inspect(path: &Path) -> Result<()> {
    let pack = mount_pack(path)?;
    let stats = pack.stats();

    println!("pack      {}", path.display());
    println!("version   {}", pack.version());
    println!("docs      {}", stats.docs);
    println!("blocks    {}", stats.blocks);
    println!("terms     {}", stats.terms);
    println!("avg len   {:.2} tokens", pack.avg_block_len());
    match pack.semantic() {
        Some(sem) => println!("semantic  {} ({} dims)", sem.model_id, sem.dims),
        None => println!("semantic  absent"),
    }
    if !pack.meta_extra().is_empty() {
        let keys: Vec<&str> = pack.meta_extra().keys().map(String::as_str).collect();
        println!("extra     {}", keys.join(", "));
    }
    Ok(())
}

fn run_query(
    path: &Path,
    query_text: &str,
    options: &QueryOptions,
    json: bool,
    patch: Option<cli::BudgetArg>,
) -> Result<()> {
    let pack: Pack = mount_pack(path)?;
    let hits = query(&pack, query_text, options)?;

    if let Some(budget) = patch {
        let projected = make_context_patch(&hits, budget.into());
        println!("{}", serde_json::to_string_pretty(&projected).unwrap_or_default());
        return Ok(());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&hits).unwrap_or_default());
        return Ok(());
    }

    if hits.is_empty() {
        println!("no hits");
        return Ok(());
    }
    for (i, hit) in hits.iter().enumerate() {
        let source = hit.source.as_deref().unwrap_or("-");
        let mut text = hit.text.replace('\n', " ");
        if text.chars().count() > 96 {
            text = text.chars().take(96).collect::<String>() + "…";
        }
        println!("{:>2}. {:>8.4}  {:<12}  {}", i + 1, hit.score, source, text);
    }
    Ok(())
}
