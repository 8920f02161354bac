//! Run state for a single pipeline execution.
//!
//! A Run is an in-memory summary. The run directory on disk is the only
//! durable trace of an execution; nothing here is persisted.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A pipeline execution run
#[derive(Debug, Clone)]
pub struct Run {
    /// Unique identifier for this run
    pub id: Uuid,

    /// Private directory holding one subdirectory per step
    pub run_dir: PathBuf,

    /// Current state of the run
    pub state: RunState,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// When the run finished (if applicable)
    pub completed_at: Option<DateTime<Utc>>,

    /// Steps attempted so far, in declaration order
    pub steps: Vec<StepRecord>,
}

impl Run {
    /// Create a new run rooted at `run_dir`
    pub fn new(id: Uuid, run_dir: PathBuf) -> Self {
        Self {
            id,
            run_dir,
            state: RunState::Running,
            started_at: Utc::now(),
            completed_at: None,
            steps: Vec::new(),
        }
    }

    /// Record that a step has started
    pub fn start_step(&mut self, name: &str) {
        self.steps.push(StepRecord {
            name: name.to_string(),
            status: StepStatus::Running,
            duration_ms: None,
        });
    }

    /// Close the most recently started step
    pub fn finish_step(&mut self, status: StepStatus, duration_ms: u64) {
        if let Some(step) = self.steps.last_mut() {
            step.status = status;
            step.duration_ms = Some(duration_ms);
        }
    }

    /// Mark the run as finished
    pub fn finish(&mut self, state: RunState) {
        self.state = state;
        self.completed_at = Some(Utc::now());
    }

    /// Directory of a step inside this run
    pub fn step_dir(&self, step_name: &str) -> PathBuf {
        self.run_dir.join(step_name)
    }

    /// Check if a specific step is completed
    pub fn is_step_completed(&self, step_name: &str) -> bool {
        self.steps
            .iter()
            .any(|s| s.name == step_name && s.status == StepStatus::Completed)
    }

    /// Check if the run is still in progress
    pub fn is_running(&self) -> bool {
        matches!(self.state, RunState::Running)
    }
}

/// Outcome of one attempted step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    pub name: String,
    pub status: StepStatus,
    pub duration_ms: Option<u64>,
}

/// Status of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// Currently executing
    Running,

    /// Exited with status 0
    Completed,

    /// Input resolution failed or the module exited nonzero
    Failed,

    /// Interrupted by cancellation
    Cancelled,
}

/// State of a pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RunState {
    /// Currently executing
    #[default]
    Running,

    /// All steps completed
    Completed,

    /// Aborted at a step
    Failed { step: String, error: String },

    /// Stopped by an external signal
    Cancelled { step: String },
}
