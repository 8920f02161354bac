//! opentrace - Modular OSINT pipeline runner
//!
//! Runs a declarative pipeline of independently built executables
//! ("modules") and manages the lifecycle of those executables.
//!
//! # Architecture
//!
//! Modules never talk to each other directly. Each step runs in its own
//! directory inside a private run directory; a module publishes results by
//! writing files there plus an `output.json` index, and later steps refer to
//! those files by `(step, artifact)` name.
//!
//! # Modules
//!
//! - `adapters`: Module execution (subprocess protocol)
//! - `core`: Pipeline loading, input resolution, run coordination
//! - `domain`: Data structures (Run, OutputIndex)
//! - `installer`: Fetch, build, register and remove modules
//! - `sdk`: Helpers for writing modules in Rust
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Install a module from the official repository
//! opentrace install ip_lookup
//!
//! # Run a pipeline
//! opentrace run pipeline.yaml
//!
//! # List installed modules
//! opentrace modules
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod installer;
pub mod sdk;

// Re-export main types at crate root for convenience
pub use core::{Orchestrator, Pipeline};
pub use domain::{OutputIndex, Run, RunState};
pub use installer::{Installer, Registry};
