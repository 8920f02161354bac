//! Domain types for the opentrace engine.
//!
//! This module contains the core data structures:
//! - Artifact: the per-step output index written by modules
//! - Run: the record of one pipeline execution

pub mod artifact;
pub mod run;

// Re-export commonly used types
pub use artifact::{ArtifactEntry, OutputIndex, OUTPUT_INDEX_FILE};
pub use run::{Run, RunState, StepRecord, StepStatus};
