// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The persisted-state document.
//!
//! ```json
//! {
//!   "expandedDirectories": { "atSurface": ["src"], "buried": ["src/deep"] },
//!   "scrollPosition": 120.0
//! }
//! ```
//!
//! Paths are root-relative and use `/`. Missing fields read as empty.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Failure to read a persisted-state document.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// The text is not a valid state document.
    #[error("invalid tree state: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Expanded composite nodes, split by visibility.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExpandedDirectories {
    /// Expanded nodes whose ancestors are all expanded.
    pub at_surface: Vec<String>,
    /// Expanded nodes hidden behind a collapsed ancestor.
    pub buried: Vec<String>,
}

impl ExpandedDirectories {
    /// Returns `true` if no path is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.at_surface.is_empty() && self.buried.is_empty()
    }
}

/// Expansion and scroll state of a tree.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TreeStateSnapshot {
    /// Which composite nodes were expanded.
    pub expanded_directories: ExpandedDirectories,
    /// Scroll offset in pixels; absent when never saved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scroll_position: Option<f64>,
}

impl TreeStateSnapshot {
    /// Serializes to a pretty-printed JSON document.
    pub fn to_json_pretty(&self) -> Result<String, StateError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for TreeStateSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

impl FromStr for TreeStateSnapshot {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(serde_json::from_str(s)?)
    }
}
