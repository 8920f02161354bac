//! Run coordinator.
//!
//! Executes a pipeline's steps strictly in declaration order inside a fresh
//! run directory. Each step gets its own empty directory named after it; its
//! input is resolved against what earlier steps left behind, then the module
//! is executed. The first failure aborts the run and leaves every directory
//! in place for inspection.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{ExecutionError, Invocation, ModuleExecutor, ProcessExecutor};
use crate::domain::{Run, RunState, StepStatus};
use crate::installer::Registry;

use super::cancel::CancelSignal;
use super::pipeline::{Pipeline, Step};
use super::resolver::{resolve_input, ResolutionError};

/// Prefix of every run directory name
pub const RUN_DIR_PREFIX: &str = "opentrace-run-";

/// Errors that abort a run (or prevent it from starting)
#[derive(Debug, Error)]
pub enum RunError {
    #[error("module not installed: {module} (run: opentrace install {module})")]
    NotInstalled { module: String },

    #[error("failed to create run directory: {0}")]
    Setup(#[source] std::io::Error),

    #[error("[{step}] failed to create step directory: {source}")]
    StepSetup {
        step: String,
        #[source]
        source: std::io::Error,
    },

    #[error("[{step}] no binary known for module")]
    MissingBinary { step: String },

    #[error("[{step}] input resolution failed: {source}")]
    Resolution {
        step: String,
        #[source]
        source: ResolutionError,
    },

    #[error("[{step}] {source}")]
    Step {
        step: String,
        #[source]
        source: ExecutionError,
    },

    #[error("[{step}] cancelled")]
    Cancelled { step: String },
}

impl RunError {
    /// Step at which the run was aborted, if it got that far
    pub fn step(&self) -> Option<&str> {
        match self {
            Self::NotInstalled { .. } | Self::Setup(_) => None,
            Self::StepSetup { step, .. }
            | Self::MissingBinary { step }
            | Self::Resolution { step, .. }
            | Self::Step { step, .. }
            | Self::Cancelled { step } => Some(step),
        }
    }
}

/// Module name → executable, validated before a run starts
#[derive(Debug, Clone, Default)]
pub struct ModuleBinaries {
    binaries: HashMap<String, PathBuf>,
}

impl ModuleBinaries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, module: impl Into<String>, binary: impl Into<PathBuf>) {
        self.binaries.insert(module.into(), binary.into());
    }

    pub fn get(&self, module: &str) -> Option<&Path> {
        self.binaries.get(module).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.binaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.binaries.is_empty()
    }
}

/// Check that every module the pipeline invokes is installed.
///
/// Runs before any directory or subprocess is created.
pub fn validate_installed(pipeline: &Pipeline, registry: &Registry) -> Result<ModuleBinaries, RunError> {
    let mut binaries = ModuleBinaries::new();

    for module in pipeline.module_names() {
        let entry = registry.get(module).ok_or_else(|| RunError::NotInstalled {
            module: module.to_string(),
        })?;
        binaries.insert(module, entry.bin_path.clone());
    }

    Ok(binaries)
}

/// Sequential pipeline executor
pub struct Orchestrator {
    /// Directory under which run directories are created
    runs_dir: PathBuf,

    /// How modules are executed
    executor: Box<dyn ModuleExecutor>,
}

impl Orchestrator {
    /// Create an orchestrator that runs modules as subprocesses
    pub fn new(runs_dir: impl Into<PathBuf>) -> Self {
        Self {
            runs_dir: runs_dir.into(),
            executor: Box::new(ProcessExecutor::new()),
        }
    }

    /// Replace the module executor
    pub fn with_executor(mut self, executor: Box<dyn ModuleExecutor>) -> Self {
        self.executor = executor;
        self
    }

    /// Root directory for runs
    pub fn runs_dir(&self) -> &Path {
        &self.runs_dir
    }

    /// Execute a pipeline
    #[instrument(skip_all, fields(steps = pipeline.steps.len(), executor = self.executor.name()))]
    pub async fn run(
        &self,
        pipeline: &Pipeline,
        binaries: &ModuleBinaries,
        cancel: &CancelSignal,
    ) -> Result<Run, RunError> {
        let run_id = Uuid::new_v4();
        let run_dir = self.create_run_dir(run_id)?;
        let mut run = Run::new(run_id, run_dir);

        info!(%run_id, run_dir = %run.run_dir.display(), "Starting pipeline run");

        for step in &pipeline.steps {
            if let Err(e) = self.execute_step(&mut run, step, binaries, cancel).await {
                return Err(abort(&mut run, e));
            }
        }

        run.finish(RunState::Completed);
        info!(%run_id, steps = run.steps.len(), "Run completed");

        Ok(run)
    }

    fn create_run_dir(&self, run_id: Uuid) -> Result<PathBuf, RunError> {
        std::fs::create_dir_all(&self.runs_dir).map_err(RunError::Setup)?;

        let run_dir = self.runs_dir.join(format!("{RUN_DIR_PREFIX}{run_id}"));
        // create_dir (not _all): the directory must be new
        std::fs::create_dir(&run_dir).map_err(RunError::Setup)?;

        // Modules receive absolute paths
        run_dir.canonicalize().map_err(RunError::Setup)
    }

    async fn execute_step(
        &self,
        run: &mut Run,
        step: &Step,
        binaries: &ModuleBinaries,
        cancel: &CancelSignal,
    ) -> Result<(), RunError> {
        if cancel.is_cancelled() {
            return Err(RunError::Cancelled {
                step: step.name.clone(),
            });
        }

        run.start_step(&step.name);
        let started = Instant::now();
        let result = self.invoke(run, step, binaries, cancel).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let status = match &result {
            Ok(()) => StepStatus::Completed,
            Err(RunError::Cancelled { .. }) => StepStatus::Cancelled,
            Err(_) => StepStatus::Failed,
        };
        run.finish_step(status, duration_ms);

        if result.is_ok() {
            info!(step = %step.name, duration_ms, "Step completed");
        }

        result
    }

    async fn invoke(
        &self,
        run: &Run,
        step: &Step,
        binaries: &ModuleBinaries,
        cancel: &CancelSignal,
    ) -> Result<(), RunError> {
        let step_dir = run.step_dir(&step.name);
        std::fs::create_dir(&step_dir).map_err(|source| RunError::StepSetup {
            step: step.name.clone(),
            source,
        })?;

        let binary = binaries.get(&step.name).ok_or_else(|| RunError::MissingBinary {
            step: step.name.clone(),
        })?;

        let input = resolve_input(&run.run_dir, &step.input).map_err(|source| RunError::Resolution {
            step: step.name.clone(),
            source,
        })?;

        let invocation = Invocation {
            step: step.name.clone(),
            binary: binary.to_path_buf(),
            input,
            config: step.config.clone(),
            run_dir: run.run_dir.clone(),
            step_dir,
        };

        debug!(step = %step.name, binary = %binary.display(), "Executing module");

        self.executor
            .execute(&invocation, cancel)
            .await
            .map_err(|source| match source {
                ExecutionError::Cancelled => RunError::Cancelled {
                    step: step.name.clone(),
                },
                source => RunError::Step {
                    step: step.name.clone(),
                    source,
                },
            })
    }
}

/// Record the abort on the run and log where its directories are
fn abort(run: &mut Run, error: RunError) -> RunError {
    let step = error.step().unwrap_or_default().to_string();

    match &error {
        RunError::Cancelled { .. } => {
            run.finish(RunState::Cancelled { step });
            warn!(run_id = %run.id, run_dir = %run.run_dir.display(), state = ?run.state, "Run cancelled");
        }
        _ => {
            run.finish(RunState::Failed {
                step,
                error: error.to_string(),
            });
            error!(run_id = %run.id, run_dir = %run.run_dir.display(), state = ?run.state, "Run aborted");
        }
    }

    error
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use tempfile::TempDir;

    use crate::core::cancel;
    use crate::core::resolver::ResolvedInput;
    use crate::domain::{OutputIndex, OUTPUT_INDEX_FILE};
    use crate::installer::RegistryEntry;

    /// Executor double: records invocations, writes an output index for
    /// every step and fails the configured one
    #[derive(Default)]
    struct RecordingExecutor {
        calls: Arc<Mutex<Vec<Invocation>>>,
        fail_step: Option<String>,
    }

    #[async_trait]
    impl ModuleExecutor for RecordingExecutor {
        fn name(&self) -> &str {
            "recording"
        }

        async fn execute(&self, invocation: &Invocation, _cancel: &CancelSignal) -> Result<(), ExecutionError> {
            self.calls.lock().unwrap().push(invocation.clone());

            let index = OutputIndex::new().with_artifact("result", "result.json", "application/json");
            std::fs::write(
                invocation.step_dir.join(OUTPUT_INDEX_FILE),
                serde_json::to_vec(&index).unwrap(),
            )
            .unwrap();

            if self.fail_step.as_deref() == Some(invocation.step.as_str()) {
                return Err(ExecutionError::Stdin(std::io::Error::other("boom")));
            }
            Ok(())
        }
    }

    fn binaries_for(pipeline: &Pipeline) -> ModuleBinaries {
        let mut binaries = ModuleBinaries::new();
        for name in pipeline.module_names() {
            binaries.insert(name, format!("/opt/bin/{name}"));
        }
        binaries
    }

    const CHAIN: &str = r#"
modules:
  - name: a
    input: "8.8.8.8"
  - name: b
    input: { from: a, artifact: result }
  - name: c
    input: { from: b, artifact: result }
"#;

    #[tokio::test]
    async fn test_steps_run_in_order_with_resolved_inputs() {
        let temp = TempDir::new().unwrap();
        let executor = RecordingExecutor::default();
        let calls = executor.calls.clone();
        let orchestrator = Orchestrator::new(temp.path()).with_executor(Box::new(executor));
        let pipeline = Pipeline::from_yaml(CHAIN).unwrap();

        let run = orchestrator
            .run(&pipeline, &binaries_for(&pipeline), &CancelSignal::never())
            .await
            .unwrap();

        assert_eq!(run.state, RunState::Completed);
        assert!(run.is_step_completed("c"));
        assert!(run
            .run_dir
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(RUN_DIR_PREFIX));

        let calls = calls.lock().unwrap();
        let order: Vec<&str> = calls.iter().map(|c| c.step.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);

        assert_eq!(calls[0].input, ResolvedInput::Literal("8.8.8.8".to_string()));
        assert_eq!(calls[1].input, ResolvedInput::Path(run.run_dir.join("a").join("result.json")));
        assert_eq!(calls[1].binary, PathBuf::from("/opt/bin/b"));
        assert_eq!(calls[2].step_dir, run.run_dir.join("c"));
        assert!(calls[2].run_dir.is_absolute());
    }

    #[tokio::test]
    async fn test_failure_aborts_remaining_steps() {
        let temp = TempDir::new().unwrap();
        let executor = RecordingExecutor {
            fail_step: Some("b".to_string()),
            ..Default::default()
        };
        let calls = executor.calls.clone();
        let orchestrator = Orchestrator::new(temp.path()).with_executor(Box::new(executor));
        let pipeline = Pipeline::from_yaml(CHAIN).unwrap();

        let err = orchestrator
            .run(&pipeline, &binaries_for(&pipeline), &CancelSignal::never())
            .await
            .unwrap_err();

        assert!(matches!(err, RunError::Step { ref step, .. } if step == "b"));
        assert_eq!(err.step(), Some("b"));
        assert_eq!(calls.lock().unwrap().len(), 2);

        // Directories of attempted steps stay behind, c was never created
        let run_dir = std::fs::read_dir(temp.path()).unwrap().next().unwrap().unwrap().path();
        assert!(run_dir.join("a").is_dir());
        assert!(run_dir.join("b").is_dir());
        assert!(!run_dir.join("c").exists());
    }

    #[tokio::test]
    async fn test_reference_to_later_step_fails_resolution() {
        let temp = TempDir::new().unwrap();
        let executor = RecordingExecutor::default();
        let calls = executor.calls.clone();
        let orchestrator = Orchestrator::new(temp.path()).with_executor(Box::new(executor));
        let yaml = "modules:\n  - name: a\n    input: { from: b, artifact: result }\n  - name: b\n";
        let pipeline = Pipeline::from_yaml(yaml).unwrap();

        let err = orchestrator
            .run(&pipeline, &binaries_for(&pipeline), &CancelSignal::never())
            .await
            .unwrap_err();

        match err {
            RunError::Resolution { step, source } => {
                assert_eq!(step, "a");
                assert!(matches!(source, ResolutionError::MissingOutputIndex { .. }));
            }
            other => panic!("Expected Resolution, got {:?}", other),
        }
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let temp = TempDir::new().unwrap();
        let orchestrator =
            Orchestrator::new(temp.path()).with_executor(Box::new(RecordingExecutor::default()));
        let pipeline = Pipeline::from_yaml("modules:\n  - name: a\n").unwrap();

        let err = orchestrator
            .run(&pipeline, &ModuleBinaries::new(), &CancelSignal::never())
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::MissingBinary { ref step } if step == "a"));
    }

    #[tokio::test]
    async fn test_cancelled_before_first_step() {
        let temp = TempDir::new().unwrap();
        let executor = RecordingExecutor::default();
        let calls = executor.calls.clone();
        let orchestrator = Orchestrator::new(temp.path()).with_executor(Box::new(executor));
        let pipeline = Pipeline::from_yaml(CHAIN).unwrap();

        let (handle, signal) = cancel::channel();
        handle.cancel();

        let err = orchestrator
            .run(&pipeline, &binaries_for(&pipeline), &signal)
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Cancelled { ref step } if step == "a"));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_validate_installed() {
        let pipeline = Pipeline::from_yaml("modules:\n  - name: a\n  - name: b\n").unwrap();
        let mut registry = Registry::default();
        registry.insert(
            "a",
            RegistryEntry {
                bin_path: PathBuf::from("/opt/bin/a"),
                version: "1.0.0".to_string(),
                author: String::new(),
                official: true,
                verified: false,
            },
        );

        match validate_installed(&pipeline, &registry) {
            Err(RunError::NotInstalled { module }) => assert_eq!(module, "b"),
            other => panic!("Expected NotInstalled, got {:?}", other),
        }

        registry.insert(
            "b",
            RegistryEntry {
                bin_path: PathBuf::from("/opt/bin/b"),
                version: "0.2.0".to_string(),
                author: "someone".to_string(),
                official: false,
                verified: true,
            },
        );
        let binaries = validate_installed(&pipeline, &registry).unwrap();
        assert_eq!(binaries.len(), 2);
        assert_eq!(binaries.get("b"), Some(Path::new("/opt/bin/b")));
    }
}
