//! Configuration for opentrace paths.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variable (OPENTRACE_HOME)
//! 2. Config file (.opentrace/config.yaml, or <home>/config.yaml)
//! 3. Defaults (~/.opentrace)
//!
//! Config file discovery:
//! - Searches current directory and parents for .opentrace/config.yaml
//! - Paths in config file are relative to the project root (the parent of
//!   .opentrace/), except `home` which is relative to .opentrace/ itself
//!
//! The resolved configuration is a plain value handed to each component;
//! nothing below the CLI reads the environment for paths.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Canonical repository hosting official modules
pub const DEFAULT_MODULES_REPO: &str = "https://github.com/its-ernest/opentrace-modules";

/// Subtree of the modules repository holding one directory per module
pub const DEFAULT_MODULES_PREFIX: &str = "modules";

/// Environment variable overriding the home directory
pub const HOME_ENV: &str = "OPENTRACE_HOME";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub install: InstallConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to .opentrace/)
    pub home: Option<String>,
    /// Module binary directory
    pub bin: Option<String>,
    /// Registry JSON document
    pub registry: Option<String>,
    /// Root under which run directories are created
    pub runs: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstallConfig {
    pub modules_repo: Option<String>,
    pub modules_prefix: Option<String>,
    pub go_binary: Option<String>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// opentrace home (state directory)
    pub home: PathBuf,
    /// Directory holding installed module executables
    pub bin_dir: PathBuf,
    /// Path of the registry document
    pub registry_path: PathBuf,
    /// Root under which each run creates its private directory
    pub runs_dir: PathBuf,
    /// Repository cloned for official modules
    pub modules_repo: String,
    /// Subtree of `modules_repo` containing module directories
    pub modules_prefix: String,
    /// Go toolchain used to build module sources
    pub go_binary: String,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

impl ResolvedConfig {
    /// Configuration rooted at `home` with every other setting defaulted.
    ///
    /// Used for hermetic setups (tests, scripted installs).
    pub fn from_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        Self {
            bin_dir: home.join("bin"),
            registry_path: home.join("registry.json"),
            runs_dir: std::env::temp_dir(),
            modules_repo: DEFAULT_MODULES_REPO.to_string(),
            modules_prefix: DEFAULT_MODULES_PREFIX.to_string(),
            go_binary: "go".to_string(),
            config_file: None,
            home,
        }
    }

    /// Load configuration from environment, config file and defaults
    pub fn load() -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to determine current directory")?;
        let env_home = std::env::var(HOME_ENV).ok().map(PathBuf::from);
        let default_home = dirs::home_dir()
            .context("Failed to determine home directory")?
            .join(".opentrace");

        load_config(&cwd, env_home, default_home)
    }
}

/// Find config file by searching `start` and its parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(".opentrace").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to `base`
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

fn load_config(cwd: &Path, env_home: Option<PathBuf>, default_home: PathBuf) -> Result<ResolvedConfig> {
    // Project-local file wins over the one in the user home
    let config_file = find_config_file(cwd).or_else(|| {
        let home = env_home.as_ref().unwrap_or(&default_home);
        let candidate = home.join("config.yaml");
        candidate.exists().then_some(candidate)
    });

    let Some(config_path) = config_file else {
        let home = env_home.unwrap_or(default_home);
        return Ok(ResolvedConfig::from_home(home));
    };

    let file = load_config_file(&config_path)?;
    let file_dir = config_path.parent().unwrap_or(Path::new("."));
    // A project file lives in <root>/.opentrace/; a home file lives in <home>/
    let base_dir = if file_dir.file_name().is_some_and(|n| n == ".opentrace") {
        file_dir.parent().unwrap_or(Path::new("."))
    } else {
        file_dir
    };

    let home = match (env_home, file.paths.home.as_deref()) {
        (Some(env_home), _) => env_home,
        (None, Some(home_path)) => resolve_path(file_dir, home_path),
        (None, None) => default_home,
    };

    let mut config = ResolvedConfig::from_home(home);

    if let Some(ref bin) = file.paths.bin {
        config.bin_dir = resolve_path(base_dir, bin);
    }
    if let Some(ref registry) = file.paths.registry {
        config.registry_path = resolve_path(base_dir, registry);
    }
    if let Some(ref runs) = file.paths.runs {
        config.runs_dir = resolve_path(base_dir, runs);
    }
    if let Some(repo) = file.install.modules_repo {
        config.modules_repo = repo;
    }
    if let Some(prefix) = file.install.modules_prefix {
        config.modules_prefix = prefix;
    }
    if let Some(go) = file.install.go_binary {
        config.go_binary = go;
    }
    config.config_file = Some(config_path);

    Ok(config)
}
