//! Module execution interface.
//!
//! A step is executed by handing an [`Invocation`] to a [`ModuleExecutor`].
//! The only production executor is [`ProcessExecutor`], which runs the module
//! binary under the stdin/env/exit-code protocol. Completion is signalled by
//! the exit status alone; stdout carries no meaning and stderr belongs to the
//! operator.

pub mod process;

use std::path::PathBuf;
use std::process::ExitStatus;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::core::cancel::CancelSignal;
use crate::core::resolver::ResolvedInput;

pub use process::ProcessExecutor;

/// Environment variable holding the absolute run directory
pub const RUN_DIR_ENV: &str = "OPENTRACE_RUN_DIR";

/// Environment variable holding the absolute step directory
pub const STEP_DIR_ENV: &str = "OPENTRACE_STEP_DIR";

/// Everything needed to execute one step
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Step (and module) name
    pub step: String,

    /// Module executable
    pub binary: PathBuf,

    /// Resolved input value
    pub input: ResolvedInput,

    /// Config block from the pipeline, placeholders already expanded
    pub config: Map<String, Value>,

    /// Absolute run directory
    pub run_dir: PathBuf,

    /// Absolute, empty step directory
    pub step_dir: PathBuf,
}

/// JSON document written to the module's stdin
#[derive(Debug, Serialize)]
struct Payload<'a> {
    input: &'a ResolvedInput,
    config: &'a Map<String, Value>,
}

impl Invocation {
    /// Encode the stdin payload: `{"input": ..., "config": {...}}`
    pub fn payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&Payload {
            input: &self.input,
            config: &self.config,
        })
    }
}

/// Errors raised while executing a module
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("failed to launch {}: {source}", binary.display())]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode module payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to write module stdin: {0}")]
    Stdin(#[source] std::io::Error),

    #[error("failed to wait for module: {0}")]
    Wait(#[source] std::io::Error),

    #[error("module exited with {0}")]
    Exit(ExitStatus),

    #[error("module was cancelled")]
    Cancelled,
}

/// Capability that runs one module invocation to completion
#[async_trait]
pub trait ModuleExecutor: Send + Sync {
    /// Human-readable executor name
    fn name(&self) -> &str;

    /// Run the module; `Ok` only when it exited successfully
    async fn execute(
        &self,
        invocation: &Invocation,
        cancel: &CancelSignal,
    ) -> Result<(), ExecutionError>;
}
