// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Argument definitions for the `knolo` binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use knolo::PatchBudget;

#[derive(Parser)]
#[command(name = "knolo", version, about = "Local-first knowledge retrieval packs")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build a .knolo pack from a JSON documents file
    Build {
        /// JSON array of documents: [{"id", "text", "heading", "namespace"}]
        #[arg(long)]
        input: PathBuf,
        /// Output pack path
        #[arg(long)]
        output: PathBuf,
        /// Optional JSON array of embeddings (one f32 array per document)
        #[arg(long)]
        embeddings: Option<PathBuf>,
        /// Model identifier recorded in the semantic section
        #[arg(long, default_value = "unspecified")]
        model_id: String,
    },
    /// Show the structure and stats of a pack
    Inspect {
        pack: PathBuf,
    },
    /// Run a query against a pack
    Query {
        pack: PathBuf,
        query: String,
        #[arg(long, default_value_t = 10)]
        top_k: usize,
        /// Restrict to one or more namespaces
        #[arg(long)]
        namespace: Vec<String>,
        /// Restrict to one or more document ids
        #[arg(long)]
        source: Vec<String>,
        /// Phrases that must appear in every hit
        #[arg(long = "require-phrase")]
        require_phrases: Vec<String>,
        #[arg(long)]
        min_score: Option<f64>,
        /// Disable pseudo-relevance query expansion
        #[arg(long)]
        no_expansion: bool,
        /// Emit hits as JSON instead of the readable listing
        #[arg(long)]
        json: bool,
        /// Project the hits into a context patch of the given budget
        #[arg(long, value_enum)]
        patch: Option<BudgetArg>,
    },
}

/// Context patch budget tiers for `--patch`.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum BudgetArg {
    Mini,
    Small,
    Full,
}

impl From<BudgetArg> for PatchBudget {
    fn from(value: BudgetArg) -> Self {
        match value {
            BudgetArg::Mini => PatchBudget::Mini,
            BudgetArg::Small => PatchBudget::Small,
            BudgetArg::Full => PatchBudget::Full,
        }
    }
}
