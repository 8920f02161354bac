//! End-to-end pipeline runs against real subprocess modules.
//!
//! Modules are small shell scripts, so these tests only run on unix.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tempfile::TempDir;

use opentrace::core::{cancel, validate_installed, CancelSignal, Orchestrator, Pipeline, RunError};
use opentrace::domain::{RunState, StepStatus};
use opentrace::installer::{Registry, RegistryEntry};

/// Writes the JSON it receives and an output index declaring `result`
const PRODUCER: &str = r#"cat > "$OPENTRACE_STEP_DIR/stdin.json"
echo '{"ip":"8.8.8.8","country":"US"}' > "$OPENTRACE_STEP_DIR/result.json"
printf '%s' '{"artifacts":{"result":{"path":"result.json","type":"application/json"}}}' > "$OPENTRACE_STEP_DIR/output.json"
echo "noise on stdout"
echo "progress on stderr" >&2
"#;

/// Records its stdin only
const RECORDER: &str = r#"cat > "$OPENTRACE_STEP_DIR/stdin.json""#;

struct Workspace {
    temp: TempDir,
    registry: Registry,
}

impl Workspace {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("bin")).unwrap();
        std::fs::create_dir_all(temp.path().join("runs")).unwrap();
        Self {
            temp,
            registry: Registry::default(),
        }
    }

    fn install_script(&mut self, name: &str, body: &str) -> PathBuf {
        let path = self.temp.path().join("bin").join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        self.registry.insert(
            name,
            RegistryEntry {
                bin_path: path.clone(),
                version: "0.0.1".to_string(),
                author: "tests".to_string(),
                official: false,
                verified: true,
            },
        );
        path
    }

    fn runs_dir(&self) -> PathBuf {
        self.temp.path().join("runs")
    }

    fn path(&self) -> &Path {
        self.temp.path()
    }

    fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(self.runs_dir())
    }
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[tokio::test]
async fn test_artifact_flows_between_steps() {
    let mut ws = Workspace::new();
    ws.install_script("a", PRODUCER);
    ws.install_script("b", RECORDER);

    let pipeline = Pipeline::from_yaml(
        r#"
modules:
  - name: a
    input: "8.8.8.8"
  - name: b
    input:
      from: a
      artifact: result
"#,
    )
    .unwrap();

    let binaries = validate_installed(&pipeline, &ws.registry).unwrap();
    let run = ws
        .orchestrator()
        .run(&pipeline, &binaries, &CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(run.state, RunState::Completed);
    assert!(run.run_dir.starts_with(ws.runs_dir().canonicalize().unwrap()));

    // Exact bytes for the first module
    let a_stdin = std::fs::read_to_string(run.run_dir.join("a").join("stdin.json")).unwrap();
    assert_eq!(a_stdin, r#"{"input":"8.8.8.8","config":{}}"#);

    // Second module receives the absolute artifact path
    let expected_path = run.run_dir.join("a").join("result.json");
    assert_eq!(
        read_json(&run.run_dir.join("b").join("stdin.json")),
        json!({"input": expected_path.to_str().unwrap(), "config": {}})
    );
    assert_eq!(read_json(&expected_path)["country"], "US");

    let statuses: Vec<StepStatus> = run.steps.iter().map(|s| s.status).collect();
    assert_eq!(statuses, vec![StepStatus::Completed, StepStatus::Completed]);
}

#[tokio::test]
async fn test_config_reaches_module_with_placeholders_expanded() {
    let mut ws = Workspace::new();
    ws.install_script("a", RECORDER);

    let pipeline = Pipeline::from_yaml_with_env(
        "modules:\n  - name: a\n    config:\n      token: ${API_TOKEN}\n      depth: 2\n",
        |name| (name == "API_TOKEN").then(|| "t0k3n".to_string()),
    )
    .unwrap();

    let binaries = validate_installed(&pipeline, &ws.registry).unwrap();
    let run = ws
        .orchestrator()
        .run(&pipeline, &binaries, &CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(
        read_json(&run.run_dir.join("a").join("stdin.json")),
        json!({"input": null, "config": {"token": "t0k3n", "depth": 2}})
    );
}

#[tokio::test]
async fn test_failing_step_aborts_run() {
    let mut ws = Workspace::new();
    let marker = ws.path().join("c-was-invoked");

    ws.install_script("a", PRODUCER);
    ws.install_script("b", "echo 'lookup failed' >&2\nexit 1");
    ws.install_script("c", &format!("touch '{}'", marker.display()));

    let pipeline = Pipeline::from_yaml(
        r#"
modules:
  - name: a
    input: "8.8.8.8"
  - name: b
    input: { from: a, artifact: result }
  - name: c
    input: { from: b, artifact: result }
"#,
    )
    .unwrap();

    let binaries = validate_installed(&pipeline, &ws.registry).unwrap();
    let err = ws
        .orchestrator()
        .run(&pipeline, &binaries, &CancelSignal::never())
        .await
        .unwrap_err();

    assert!(matches!(err, RunError::Step { ref step, .. } if step == "b"));
    assert!(err.to_string().starts_with("[b] "));
    assert!(!marker.exists(), "c must never be invoked");

    // Run directory is left behind with a and b only
    let run_dirs: Vec<PathBuf> = std::fs::read_dir(ws.runs_dir())
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(run_dirs.len(), 1);
    assert!(run_dirs[0].join("a").join("output.json").is_file());
    assert!(run_dirs[0].join("b").is_dir());
    assert!(!run_dirs[0].join("c").exists());
}

#[tokio::test]
async fn test_missing_artifact_fails_before_spawn() {
    let mut ws = Workspace::new();
    let marker = ws.path().join("b-was-invoked");

    // a succeeds but publishes no output index
    ws.install_script("a", "exit 0");
    ws.install_script("b", &format!("touch '{}'", marker.display()));

    let pipeline = Pipeline::from_yaml(
        "modules:\n  - name: a\n  - name: b\n    input: { from: a, artifact: result }\n",
    )
    .unwrap();

    let binaries = validate_installed(&pipeline, &ws.registry).unwrap();
    let err = ws
        .orchestrator()
        .run(&pipeline, &binaries, &CancelSignal::never())
        .await
        .unwrap_err();

    assert!(matches!(err, RunError::Resolution { ref step, .. } if step == "b"));
    assert!(!marker.exists());
}

#[tokio::test]
async fn test_uninstalled_module_fails_validation() {
    let mut ws = Workspace::new();
    ws.install_script("a", RECORDER);

    let pipeline = Pipeline::from_yaml("modules:\n  - name: a\n  - name: ghost\n").unwrap();

    match validate_installed(&pipeline, &ws.registry) {
        Err(RunError::NotInstalled { module }) => assert_eq!(module, "ghost"),
        other => panic!("Expected NotInstalled, got {:?}", other),
    }
    // Nothing was created
    assert_eq!(std::fs::read_dir(ws.runs_dir()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_cancellation_stops_running_module() {
    let mut ws = Workspace::new();
    let marker = ws.path().join("after-was-invoked");
    ws.install_script("slow", "exec sleep 30");
    ws.install_script("after", &format!("touch '{}'", marker.display()));

    let pipeline = Pipeline::from_yaml("modules:\n  - name: slow\n  - name: after\n").unwrap();
    let binaries = validate_installed(&pipeline, &ws.registry).unwrap();

    let (handle, signal) = cancel::channel();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        handle.cancel();
    });

    let started = Instant::now();
    let err = ws
        .orchestrator()
        .run(&pipeline, &binaries, &signal)
        .await
        .unwrap_err();

    assert!(matches!(err, RunError::Cancelled { ref step } if step == "slow"));
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(!marker.exists());
}
