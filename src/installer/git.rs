//! Module source acquisition.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{run_tool, InstallError};

/// Capability that places a module's source tree on disk
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Fetch only `subtree` of the canonical modules repository into `dest`
    async fn fetch_official(&self, repo: &str, subtree: &str, dest: &Path) -> Result<(), InstallError>;

    /// Fetch a whole third-party repository into `dest`
    async fn fetch_repository(&self, url: &str, dest: &Path) -> Result<(), InstallError>;
}

/// Shallow clones through the `git` command-line tool
#[derive(Debug, Clone)]
pub struct GitFetcher {
    git_binary: PathBuf,
}

impl Default for GitFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl GitFetcher {
    pub fn new() -> Self {
        Self {
            git_binary: PathBuf::from("git"),
        }
    }

    async fn git(&self, reference: &str, args: &[&str], dest: Option<&Path>) -> Result<(), InstallError> {
        let mut command = Command::new(&self.git_binary);
        if let Some(repo) = dest {
            command.arg("-C").arg(repo);
        }
        command.args(args);

        debug!(git = %args.join(" "), "Running git");

        run_tool(&mut command).await.map_err(|output| InstallError::Clone {
            reference: reference.to_string(),
            output,
        })
    }
}

#[async_trait]
impl SourceFetcher for GitFetcher {
    async fn fetch_official(&self, repo: &str, subtree: &str, dest: &Path) -> Result<(), InstallError> {
        let dest_str = dest.to_string_lossy();
        // Blob-less sparse clone: only the requested subtree is materialised
        self.git(
            repo,
            &["clone", "--depth=1", "--filter=blob:none", "--sparse", repo, &*dest_str],
            None,
        )
        .await?;
        self.git(repo, &["sparse-checkout", "set", subtree], Some(dest)).await
    }

    async fn fetch_repository(&self, url: &str, dest: &Path) -> Result<(), InstallError> {
        let dest_str = dest.to_string_lossy();
        self.git(url, &["clone", "--depth=1", url, &*dest_str], None).await
    }
}
