//! Artifact resolution.
//!
//! Turns a step's declared input into the value handed to its module: a
//! literal passes through, an artifact reference becomes the absolute path
//! declared in the producing step's output index. The referenced file itself
//! is never opened; its existence is the producer's responsibility.

use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::domain::{OutputIndex, OUTPUT_INDEX_FILE};

use super::pipeline::{ArtifactRef, StepInput};

/// Errors raised while resolving a step input
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("missing output index for step '{step}' ({})", path.display())]
    MissingOutputIndex {
        step: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid output index for step '{step}': {source}")]
    InvalidOutputIndex {
        step: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("artifact '{artifact}' not found in {step}/output.json")]
    ArtifactNotFound { step: String, artifact: String },

    #[error("invalid artifact reference: expected a string or {{from, artifact}}, got {0}")]
    InvalidReference(serde_json::Value),
}

/// Concrete input handed to a module
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ResolvedInput {
    /// No input declared (serialized as `null`)
    Empty,

    /// Literal value from the pipeline
    Literal(String),

    /// Absolute path of an upstream artifact
    Path(PathBuf),
}

impl ResolvedInput {
    /// Textual form as seen by the module, if any
    pub fn as_str(&self) -> Option<std::borrow::Cow<'_, str>> {
        match self {
            Self::Empty => None,
            Self::Literal(s) => Some(std::borrow::Cow::Borrowed(s)),
            Self::Path(p) => Some(p.to_string_lossy()),
        }
    }
}

/// Resolve `input` against the run directory accumulated so far
pub fn resolve_input(run_dir: &Path, input: &StepInput) -> Result<ResolvedInput, ResolutionError> {
    match input {
        StepInput::None => Ok(ResolvedInput::Empty),
        StepInput::Literal(value) => Ok(ResolvedInput::Literal(value.clone())),
        StepInput::Reference(reference) => resolve_reference(run_dir, reference),
        StepInput::Invalid(value) => Err(ResolutionError::InvalidReference(value.clone())),
    }
}

/// Read the producer's output index and locate the referenced artifact
pub fn resolve_reference(
    run_dir: &Path,
    reference: &ArtifactRef,
) -> Result<ResolvedInput, ResolutionError> {
    let producer_dir = run_dir.join(&reference.from);
    let index = read_output_index(&producer_dir, &reference.from)?;

    let entry = index
        .get(&reference.artifact)
        .ok_or_else(|| ResolutionError::ArtifactNotFound {
            step: reference.from.clone(),
            artifact: reference.artifact.clone(),
        })?;

    Ok(ResolvedInput::Path(join_within(&producer_dir, Path::new(&entry.path))))
}

/// Join a declared artifact path onto the producer's directory.
///
/// Roots and prefixes are dropped and `..` never climbs above `base`, so the
/// result always lies under the producer's step directory.
fn join_within(base: &Path, relative: &Path) -> PathBuf {
    let mut parts: Vec<Component<'_>> = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(_) => parts.push(component),
            Component::ParentDir => {
                parts.pop();
            }
            Component::RootDir | Component::Prefix(_) | Component::CurDir => {}
        }
    }
    parts.iter().fold(base.to_path_buf(), |path, part| path.join(part))
}

fn read_output_index(step_dir: &Path, step: &str) -> Result<OutputIndex, ResolutionError> {
    let path = step_dir.join(OUTPUT_INDEX_FILE);

    let raw = std::fs::read(&path).map_err(|source| ResolutionError::MissingOutputIndex {
        step: step.to_string(),
        path: path.clone(),
        source,
    })?;

    serde_json::from_slice(&raw).map_err(|source| ResolutionError::InvalidOutputIndex {
        step: step.to_string(),
        source,
    })
}
