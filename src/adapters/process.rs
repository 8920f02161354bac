//! Subprocess executor.
//!
//! Spawns the module binary, writes the JSON payload to its stdin and closes
//! it, injects the run/step directories into its environment, discards
//! stdout, passes stderr through to the operator, and waits for the exit
//! status. No timeout is applied; only cancellation stops a running module.

use std::io;
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, warn};

use crate::core::cancel::CancelSignal;

use super::{ExecutionError, Invocation, ModuleExecutor, RUN_DIR_ENV, STEP_DIR_ENV};

/// Executor that runs each module as a child process
#[derive(Debug, Default, Clone)]
pub struct ProcessExecutor;

impl ProcessExecutor {
    /// Create a new process executor
    pub fn new() -> Self {
        Self
    }

    fn command(invocation: &Invocation) -> Command {
        let mut command = Command::new(&invocation.binary);
        command
            .env(RUN_DIR_ENV, &invocation.run_dir)
            .env(STEP_DIR_ENV, &invocation.step_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl ModuleExecutor for ProcessExecutor {
    fn name(&self) -> &str {
        "process"
    }

    async fn execute(
        &self,
        invocation: &Invocation,
        cancel: &CancelSignal,
    ) -> Result<(), ExecutionError> {
        let payload = invocation.payload()?;

        let mut child = Self::command(invocation)
            .spawn()
            .map_err(|source| ExecutionError::Spawn {
                binary: invocation.binary.clone(),
                source,
            })?;

        debug!(
            step = %invocation.step,
            pid = child.id(),
            payload_bytes = payload.len(),
            "Module spawned"
        );

        let stdin = child.stdin.take();
        let outcome = tokio::select! {
            result = feed_and_wait(&mut child, stdin, &payload) => Some(result),
            _ = cancel.cancelled() => None,
        };

        let Some(result) = outcome else {
            warn!(step = %invocation.step, "Cancelling module");
            if let Err(e) = child.kill().await {
                debug!(step = %invocation.step, error = %e, "Module already gone");
            }
            return Err(ExecutionError::Cancelled);
        };

        let status = result?;
        if status.success() {
            Ok(())
        } else {
            Err(ExecutionError::Exit(status))
        }
    }
}

/// Write the payload, close stdin, then wait for exit.
///
/// A module may exit without draining stdin; the resulting broken pipe is
/// not a failure on its own, the exit status decides.
async fn feed_and_wait(
    child: &mut Child,
    stdin: Option<ChildStdin>,
    payload: &[u8],
) -> Result<ExitStatus, ExecutionError> {
    if let Some(mut stdin) = stdin {
        match stdin.write_all(payload).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                debug!("Module closed stdin before reading the payload");
            }
            Err(e) => return Err(ExecutionError::Stdin(e)),
        }
        // Dropping the handle closes the pipe (EOF for the module)
        drop(stdin);
    }

    child.wait().await.map_err(ExecutionError::Wait)
}
