// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Document input format for the build pipeline.
//!
//! One document becomes one block. Only `text` is required; `id` surfaces on
//! hits as `source`, `heading` feeds the ranking boost, `namespace` scopes
//! queries.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Stable external identifier, surfaced on hits as `source`.
    #[serde(default)]
    pub id: Option<String>,
    pub text: String,
    /// Short field used for the heading-overlap ranking boost.
    #[serde(default)]
    pub heading: Option<String>,
    /// Scoping label matched by the query `namespace` filter.
    #[serde(default)]
    pub namespace: Option<String>,
}

impl Document {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: None,
            text: text.into(),
            heading: None,
            namespace: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_heading(mut self, heading: impl Into<String>) -> Self {
        self.heading = Some(heading.into());
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}
