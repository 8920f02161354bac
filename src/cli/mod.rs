//! Command-line interface for opentrace.
//!
//! Provides commands for running pipelines and for installing, removing and
//! listing modules.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config::ResolvedConfig;
use crate::core::{cancel, cancel_on_shutdown, validate_installed, Orchestrator, Pipeline};
use crate::domain::{Run, StepStatus};
use crate::installer::{AssumeYes, InstallOutcome, Installer, StdinPrompt, TrustPrompt};

/// opentrace - Modular OSINT pipeline runner
#[derive(Parser, Debug)]
#[command(name = "opentrace")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a pipeline
    Run {
        /// Pipeline YAML file
        pipeline: PathBuf,
    },

    /// Install a module by name, or from a repository (host/owner/repo)
    Install {
        /// Official module name or repository locator
        module: String,

        /// Skip the confirmation for unverified modules
        #[arg(short, long)]
        yes: bool,
    },

    /// Uninstall a module
    Uninstall {
        /// Module name
        module: String,
    },

    /// List installed modules
    #[command(alias = "list")]
    Modules,

    /// Show resolved configuration
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let config = ResolvedConfig::load()?;

        match self.command {
            Commands::Run { pipeline } => run_pipeline(config, &pipeline).await,
            Commands::Install { module, yes } => install_module(config, &module, yes).await,
            Commands::Uninstall { module } => uninstall_module(config, &module),
            Commands::Modules => list_modules(config),
            Commands::Config => show_config(&config),
        }
    }
}

/// Run a pipeline file
async fn run_pipeline(config: ResolvedConfig, path: &Path) -> Result<()> {
    let pipeline = Pipeline::from_file(path)
        .with_context(|| format!("Failed to load pipeline: {}", path.display()))?;

    let installer = Installer::new(config.clone(), Box::new(StdinPrompt));
    let registry = installer.list()?;
    let binaries = validate_installed(&pipeline, &registry)?;

    let (handle, signal) = cancel::channel();
    cancel_on_shutdown(handle);

    let orchestrator = Orchestrator::new(&config.runs_dir);
    let run = orchestrator.run(&pipeline, &binaries, &signal).await?;

    print_summary(&run);
    Ok(())
}

fn print_summary(run: &Run) {
    println!();
    println!("Run {} completed", run.id);
    println!("  Directory: {}", run.run_dir.display());
    for step in &run.steps {
        let mark = match step.status {
            StepStatus::Completed => "✓",
            StepStatus::Failed | StepStatus::Cancelled => "✗",
            StepStatus::Running => "…",
        };
        println!(
            "  {} {:<22} {:>6}ms",
            mark,
            step.name,
            step.duration_ms.unwrap_or_default()
        );
    }
}

/// Install a module
async fn install_module(config: ResolvedConfig, reference: &str, yes: bool) -> Result<()> {
    let prompt: Box<dyn TrustPrompt> = if yes {
        Box::new(AssumeYes)
    } else {
        Box::new(StdinPrompt)
    };
    let installer = Installer::new(config, prompt);

    println!("  fetching {}...", reference);
    let outcome = installer
        .install(reference)
        .await
        .with_context(|| format!("Failed to install {}", reference))?;

    match outcome {
        InstallOutcome::Installed(module) => {
            println!(
                "  ✓ {}@{} installed → {}",
                module.name,
                module.version,
                module.binary.display()
            );
        }
        InstallOutcome::Declined { name } => {
            println!("  {} was not installed.", name);
        }
    }

    Ok(())
}

/// Uninstall a module
fn uninstall_module(config: ResolvedConfig, name: &str) -> Result<()> {
    let installer = Installer::new(config, Box::new(StdinPrompt));
    let entry = installer.uninstall(name)?;
    println!("  ✓ {}@{} uninstalled", name, entry.version);
    Ok(())
}

/// List installed modules
fn list_modules(config: ResolvedConfig) -> Result<()> {
    let installer = Installer::new(config, Box::new(StdinPrompt));
    let registry = installer.list()?;
    print!("{}", registry.render_table());
    Ok(())
}

/// Show resolved configuration
fn show_config(config: &ResolvedConfig) -> Result<()> {
    println!("opentrace configuration");
    println!();
    println!(
        "Config file: {}",
        config
            .config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:      {}", config.home.display());
    println!("  Binaries:  {}", config.bin_dir.display());
    println!("  Registry:  {}", config.registry_path.display());
    println!("  Runs:      {}", config.runs_dir.display());
    println!();
    println!("Install:");
    println!("  Modules repository: {}", config.modules_repo);
    println!("  Modules prefix:     {}", config.modules_prefix);
    println!("  Go toolchain:       {}", config.go_binary);

    Ok(())
}
