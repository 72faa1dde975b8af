// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for the whole crate.
//!
//! One enum, five kinds. Every message names the item that failed
//! ("doc at index 4: ...", "embeddings[17]: ..."), because "invalid input"
//! with no subject is the kind of error you end up grepping the source for.
//!
//! Validation fails on the first offending field. Errors during build return
//! no partial pack bytes; errors during mount leave the caller with no
//! handle; errors during query leave the mounted pack usable.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// All failure modes surfaced by the public API.
#[derive(Debug, Error)]
pub enum Error {
    /// Caller supplied a value outside its contract (empty document text,
    /// out-of-range option, wrong embedding dimensionality, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Pack bytes are truncated, a length prefix overflows the buffer, a JSON
    /// section fails to parse, or the posting stream references an unknown
    /// term or block.
    #[error("malformed pack: {0}")]
    MalformedPack(String),

    /// The pack was written by a newer format version than this loader
    /// understands. Older versions are mounted tolerantly; future versions
    /// are refused.
    #[error("unsupported pack version {found} (this build reads up to {supported})")]
    VersionUnsupported { found: u32, supported: u32 },

    /// Semantic rerank was forced but the pack carries no semantic section.
    #[error("semantic rerank forced but the pack has no semantic section")]
    SemanticMissing,

    /// An I/O failure while resolving a pack source (file read, URL fetch).
    #[error("pack source i/o: {0}")]
    Io(#[from] std::io::Error),

    /// Invariant violation. Reaching this is a bug in knolo, not in the caller.
    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for [`Error::InvalidInput`] with a formatted message.
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Shorthand for [`Error::MalformedPack`] with a formatted message.
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Error::MalformedPack(msg.into())
    }
}
