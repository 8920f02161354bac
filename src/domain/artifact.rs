//! Artifacts declared by pipeline steps.
//!
//! A module announces what it produced by writing an output index into its
//! own step directory. Later steps reference entries of that index by name.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// File name of the output index inside a step directory
pub const OUTPUT_INDEX_FILE: &str = "output.json";

/// Output index written by a module (`<step dir>/output.json`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputIndex {
    /// Artifact name -> location and type hint
    #[serde(default)]
    pub artifacts: BTreeMap<String, ArtifactEntry>,
}

/// One declared artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    /// Path relative to the producing step's directory
    pub path: String,

    /// MIME-like hint, advisory only
    #[serde(rename = "type", default)]
    pub media_type: String,
}

impl OutputIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) an artifact entry
    pub fn with_artifact(
        mut self,
        name: impl Into<String>,
        path: impl Into<String>,
        media_type: impl Into<String>,
    ) -> Self {
        self.artifacts.insert(
            name.into(),
            ArtifactEntry {
                path: path.into(),
                media_type: media_type.into(),
            },
        );
        self
    }

    /// Look up an artifact by name
    pub fn get(&self, name: &str) -> Option<&ArtifactEntry> {
        self.artifacts.get(name)
    }
}
