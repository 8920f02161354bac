//! Module installation and registry.
//!
//! Installing a module means: fetch its source into a scratch directory, read
//! its manifest, ask for confirmation when it is unverified, compile it into
//! the bin directory and finally record it in the registry. Registration is
//! the last step, so a failure anywhere before it leaves the registry as it
//! was.
//!
//! References without a `/` are official module names looked up in the
//! canonical modules repository; anything else is a third-party repository
//! locator such as `github.com/alice/opentrace-face-osint`.

pub mod build;
pub mod git;
pub mod manifest;
pub mod prompt;
pub mod registry;

use std::path::{Path, PathBuf};
use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::config::ResolvedConfig;
use crate::core::pipeline::is_plain_name;

pub use build::{GoBuilder, ModuleBuilder};
pub use git::{GitFetcher, SourceFetcher};
pub use manifest::{Manifest, ManifestError, MANIFEST_FILE};
pub use prompt::{AssumeYes, StdinPrompt, TrustPrompt};
pub use registry::{Registry, RegistryEntry, RegistryError};

/// Repository name prefix dropped when deriving a module name
const REPO_NAME_PREFIX: &str = "opentrace-";

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("module \"{name}\" not found in the modules repository")]
    NotFound { name: String },

    #[error("no versions found for \"{name}\"")]
    NoVersions { name: String },

    #[error("manifest: {0}")]
    Manifest(#[from] ManifestError),

    #[error("build of {name} failed: {output}")]
    Build { name: String, output: String },

    #[error("git clone of {reference} failed: {output}")]
    Clone { reference: String, output: String },

    #[error("module \"{name}\" is not installed")]
    NotInstalled { name: String },

    #[error("invalid module name {name:?}")]
    InvalidName { name: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// What the user asked to install
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleReference {
    /// Name of a module in the canonical repository
    Official(String),

    /// Third-party repository locator
    External(String),
}

impl ModuleReference {
    pub fn parse(reference: &str) -> Self {
        if reference.contains('/') {
            Self::External(reference.to_string())
        } else {
            Self::Official(reference.to_string())
        }
    }
}

/// Clone URL for an external locator
pub fn external_url(locator: &str) -> String {
    if locator.starts_with("https://") || locator.starts_with("http://") {
        locator.to_string()
    } else {
        format!("https://{locator}")
    }
}

/// Module name derived from a locator, used until the manifest is read
pub fn fallback_name(locator: &str) -> String {
    let segment = locator
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    let segment = segment.strip_suffix(".git").unwrap_or(segment);
    segment
        .strip_prefix(REPO_NAME_PREFIX)
        .unwrap_or(segment)
        .to_string()
}

/// Lexicographically last subdirectory of a module directory
pub fn latest_version(module_dir: &Path) -> Result<Option<String>, std::io::Error> {
    let mut versions = Vec::new();
    for entry in std::fs::read_dir(module_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            versions.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    versions.sort();
    Ok(versions.pop())
}

/// A successfully installed module
#[derive(Debug, Clone)]
pub struct InstalledModule {
    pub name: String,
    pub version: String,
    pub binary: PathBuf,
    pub official: bool,
    pub manifest: Manifest,
}

/// Result of an install request
#[derive(Debug, Clone)]
pub enum InstallOutcome {
    Installed(InstalledModule),

    /// Trust prompt declined; nothing was changed
    Declined { name: String },
}

/// Installs, removes and lists modules
pub struct Installer {
    config: ResolvedConfig,
    fetcher: Box<dyn SourceFetcher>,
    builder: Box<dyn ModuleBuilder>,
    prompt: Box<dyn TrustPrompt>,
}

impl Installer {
    /// Installer backed by git and the Go toolchain
    pub fn new(config: ResolvedConfig, prompt: Box<dyn TrustPrompt>) -> Self {
        let builder = GoBuilder::new(config.go_binary.clone());
        Self {
            config,
            fetcher: Box::new(GitFetcher::new()),
            builder: Box::new(builder),
            prompt,
        }
    }

    pub fn with_fetcher(mut self, fetcher: Box<dyn SourceFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_builder(mut self, builder: Box<dyn ModuleBuilder>) -> Self {
        self.builder = builder;
        self
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// Install a module by official name or repository locator
    #[instrument(skip(self))]
    pub async fn install(&self, reference: &str) -> Result<InstallOutcome, InstallError> {
        match ModuleReference::parse(reference) {
            ModuleReference::Official(name) => self.install_official(&name).await,
            ModuleReference::External(locator) => self.install_external(&locator).await,
        }
    }

    async fn install_official(&self, name: &str) -> Result<InstallOutcome, InstallError> {
        if !is_plain_name(name) {
            return Err(InstallError::InvalidName {
                name: name.to_string(),
            });
        }

        let scratch = scratch_dir()?;
        let subtree = format!("{}/{}", self.config.modules_prefix, name);

        info!(module = name, repo = %self.config.modules_repo, "Fetching official module");
        self.fetcher
            .fetch_official(&self.config.modules_repo, &subtree, scratch.path())
            .await?;

        let module_dir = scratch.path().join(&self.config.modules_prefix).join(name);
        if !module_dir.is_dir() {
            return Err(InstallError::NotFound {
                name: name.to_string(),
            });
        }

        let version = latest_version(&module_dir)?.ok_or_else(|| InstallError::NoVersions {
            name: name.to_string(),
        })?;
        let src_dir = module_dir.join(&version);
        let manifest = Manifest::from_file(&src_dir.join(MANIFEST_FILE))?;
        self.prompt.show(name, &manifest);

        let installed = self.build_and_register(name, &src_dir, manifest, true).await?;
        Ok(InstallOutcome::Installed(installed))
    }

    async fn install_external(&self, locator: &str) -> Result<InstallOutcome, InstallError> {
        let url = external_url(locator);
        let provisional = fallback_name(locator);
        let scratch = scratch_dir()?;

        info!(module = %provisional, %url, "Fetching external module");
        self.fetcher.fetch_repository(&url, scratch.path()).await?;

        // A valid manifest always carries a name, which takes precedence
        let manifest = Manifest::from_file(&scratch.path().join(MANIFEST_FILE))?;
        let name = manifest.name.clone();
        if name != provisional {
            debug!(module = %name, repository = %provisional, "Manifest name differs from repository name");
        }
        if !is_plain_name(&name) {
            return Err(InstallError::InvalidName { name });
        }

        self.prompt.show(&name, &manifest);
        if !manifest.verified && !self.prompt.confirm(&name, &manifest).await {
            info!(module = %name, "Install declined");
            return Ok(InstallOutcome::Declined { name });
        }

        let installed = self
            .build_and_register(&name, scratch.path(), manifest, false)
            .await?;
        Ok(InstallOutcome::Installed(installed))
    }

    async fn build_and_register(
        &self,
        name: &str,
        src_dir: &Path,
        manifest: Manifest,
        official: bool,
    ) -> Result<InstalledModule, InstallError> {
        // Fail on a broken registry before spending time on a build
        let mut registry = Registry::load(&self.config.registry_path)?;

        std::fs::create_dir_all(&self.config.bin_dir)?;
        let bin_dir = std::path::absolute(&self.config.bin_dir)?;
        let binary = bin_dir.join(format!("{name}{}", std::env::consts::EXE_SUFFIX));

        info!(module = name, version = %manifest.version, "Building module");
        self.builder.build(name, src_dir, &binary).await?;

        registry.insert(
            name,
            RegistryEntry {
                bin_path: binary.clone(),
                version: manifest.version.clone(),
                author: manifest.author.clone(),
                official,
                verified: manifest.verified,
            },
        );
        registry.save(&self.config.registry_path)?;

        info!(module = name, binary = %binary.display(), "Module installed");

        Ok(InstalledModule {
            name: name.to_string(),
            version: manifest.version.clone(),
            binary,
            official,
            manifest,
        })
    }

    /// Remove a module's binary and registry entry
    #[instrument(skip(self))]
    pub fn uninstall(&self, name: &str) -> Result<RegistryEntry, InstallError> {
        let mut registry = Registry::load(&self.config.registry_path)?;
        let entry = registry.remove(name).ok_or_else(|| InstallError::NotInstalled {
            name: name.to_string(),
        })?;

        if let Err(e) = std::fs::remove_file(&entry.bin_path) {
            warn!(module = name, binary = %entry.bin_path.display(), error = %e, "Could not remove module binary");
        }

        registry.save(&self.config.registry_path)?;
        info!(module = name, "Module uninstalled");
        Ok(entry)
    }

    /// Current registry contents
    pub fn list(&self) -> Result<Registry, InstallError> {
        Ok(Registry::load(&self.config.registry_path)?)
    }
}

fn scratch_dir() -> Result<tempfile::TempDir, InstallError> {
    Ok(tempfile::Builder::new().prefix("opentrace-").tempdir()?)
}

/// Run an external tool; on failure return its combined output
async fn run_tool(command: &mut Command) -> Result<(), String> {
    let program = command.as_std().get_program().to_string_lossy().into_owned();

    let output = command
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| format!("failed to launch {program}: {e}"))?;

    if output.status.success() {
        return Ok(());
    }

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    let combined = combined.trim();

    if combined.is_empty() {
        Err(format!("{program} {}", output.status))
    } else {
        Err(combined.to_string())
    }
}
