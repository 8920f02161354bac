//! Helpers for writing opentrace modules in Rust.
//!
//! A module is any executable that speaks the step protocol: JSON payload on
//! stdin, run and step directories in the environment, exit status as the
//! only completion signal. [`run`] takes care of the protocol so a module
//! only implements [`Module::run`].
//!
//! ```no_run
//! use std::process::ExitCode;
//!
//! use opentrace::domain::OutputIndex;
//! use opentrace::sdk::{self, Module, ModuleContext, ModuleInput};
//!
//! struct Echo;
//!
//! impl Module for Echo {
//!     fn name(&self) -> &str {
//!         "echo"
//!     }
//!
//!     fn run(&self, input: ModuleInput, ctx: &ModuleContext) -> anyhow::Result<()> {
//!         std::fs::write(ctx.step_dir.join("echo.txt"), input.input.unwrap_or_default())?;
//!         ctx.write_output_index(&OutputIndex::new().with_artifact("echo", "echo.txt", "text/plain"))?;
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> ExitCode {
//!     sdk::run(&Echo)
//! }
//! ```

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::adapters::{RUN_DIR_ENV, STEP_DIR_ENV};
use crate::domain::{OutputIndex, OUTPUT_INDEX_FILE};

/// Failures reported by the module harness
#[derive(Debug, Error)]
pub enum SdkError {
    #[error("bad input: {0}")]
    BadInput(#[source] serde_json::Error),

    #[error("missing runtime context")]
    MissingContext,

    #[error("cannot create step dir: {0}")]
    StepDir(#[source] io::Error),

    #[error("cannot write output index: {0}")]
    OutputIndex(#[source] io::Error),

    #[error("module error: {0:#}")]
    Module(anyhow::Error),
}

/// Decoded stdin payload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModuleInput {
    /// Literal value or absolute artifact path; `None` when the step has no input
    #[serde(default)]
    pub input: Option<String>,

    #[serde(default)]
    pub config: Map<String, Value>,
}

/// Directories handed to the module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleContext {
    pub run_dir: PathBuf,
    pub step_dir: PathBuf,
}

impl ModuleContext {
    /// Read the directories from the environment; `None` if either is unset
    pub fn from_env() -> Option<Self> {
        let var = |key: &str| std::env::var_os(key).filter(|v| !v.is_empty()).map(PathBuf::from);
        Some(Self {
            run_dir: var(RUN_DIR_ENV)?,
            step_dir: var(STEP_DIR_ENV)?,
        })
    }

    /// Absolute path of a file inside the step directory
    pub fn artifact_path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.step_dir.join(relative)
    }

    /// Write `output.json` so later steps can reference this step's artifacts
    pub fn write_output_index(&self, index: &OutputIndex) -> Result<PathBuf, SdkError> {
        let path = self.step_dir.join(OUTPUT_INDEX_FILE);
        let content = serde_json::to_vec_pretty(index)
            .map_err(|e| SdkError::OutputIndex(io::Error::new(io::ErrorKind::InvalidData, e)))?;
        std::fs::write(&path, content).map_err(SdkError::OutputIndex)?;
        Ok(path)
    }
}

/// A pipeline module
pub trait Module {
    /// Name used as the prefix of error messages
    fn name(&self) -> &str;

    fn run(&self, input: ModuleInput, ctx: &ModuleContext) -> anyhow::Result<()>;
}

/// Run `module` against this process's stdin and environment
pub fn run<M: Module>(module: &M) -> ExitCode {
    let stdin = io::stdin();
    match run_with(module, stdin.lock(), ModuleContext::from_env) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("[{}] {}", module.name(), e);
            ExitCode::FAILURE
        }
    }
}

/// Protocol harness with explicit stdin and context source
pub fn run_with<M, R, C>(module: &M, reader: R, context: C) -> Result<(), SdkError>
where
    M: Module,
    R: Read,
    C: FnOnce() -> Option<ModuleContext>,
{
    let input: ModuleInput = serde_json::from_reader(reader).map_err(SdkError::BadInput)?;
    let ctx = context().ok_or(SdkError::MissingContext)?;

    std::fs::create_dir_all(&ctx.step_dir).map_err(SdkError::StepDir)?;

    module.run(input, &ctx).map_err(SdkError::Module)
}
