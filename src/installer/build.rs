//! Module compilation.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{run_tool, InstallError};

/// Capability that compiles a module source tree into one executable
#[async_trait]
pub trait ModuleBuilder: Send + Sync {
    /// Build the module in `src` and write its binary to `out`
    async fn build(&self, name: &str, src: &Path, out: &Path) -> Result<(), InstallError>;
}

/// Builds Go modules with `go build`
#[derive(Debug, Clone)]
pub struct GoBuilder {
    go_binary: String,
}

impl GoBuilder {
    pub fn new(go_binary: impl Into<String>) -> Self {
        Self {
            go_binary: go_binary.into(),
        }
    }
}

impl Default for GoBuilder {
    fn default() -> Self {
        Self::new("go")
    }
}

#[async_trait]
impl ModuleBuilder for GoBuilder {
    async fn build(&self, name: &str, src: &Path, out: &Path) -> Result<(), InstallError> {
        let mut command = Command::new(&self.go_binary);
        command
            .args(["build", "-trimpath", "-o"])
            .arg(out)
            .arg(".")
            .current_dir(src);

        debug!(module = name, src = %src.display(), out = %out.display(), "Running go build");

        run_tool(&mut command).await.map_err(|output| InstallError::Build {
            name: name.to_string(),
            output,
        })
    }
}
