//! Core pipeline engine.
//!
//! This module contains:
//! - Pipeline: Pipeline definitions and loading
//! - Resolver: Step input and artifact resolution
//! - Cancel: Cancellation signal for in-flight runs
//! - Orchestrator: Sequential run coordinator

pub mod cancel;
pub mod orchestrator;
pub mod pipeline;
pub mod resolver;

// Re-export commonly used types
pub use cancel::{cancel_on_shutdown, CancelHandle, CancelSignal};
pub use orchestrator::{validate_installed, ModuleBinaries, Orchestrator, RunError};
pub use pipeline::{ArtifactRef, LoadError, Pipeline, Step, StepInput};
pub use resolver::{resolve_input, ResolutionError, ResolvedInput};
