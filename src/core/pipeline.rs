//! Pipeline definitions and loading.
//!
//! Pipelines are YAML documents with a top-level `modules` sequence. Each
//! entry names an installed module, an optional input (a literal string or a
//! reference to an artifact of an earlier step) and an opaque config block.
//!
//! ```yaml
//! modules:
//!   - name: ip_lookup
//!     input: "8.8.8.8"
//!     config:
//!       api_key: ${IPINFO_TOKEN}
//!   - name: geo_map
//!     input:
//!       from: ip_lookup
//!       artifact: result
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised while loading a pipeline document
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to read pipeline file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse pipeline YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Pipeline has no modules")]
    Empty,

    #[error("Step {index} has an invalid name {name:?} (must be a plain file name)")]
    InvalidStepName { index: usize, name: String },

    #[error("Step '{0}' is declared more than once")]
    DuplicateStep(String),
}

/// A complete pipeline definition
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Ordered list of steps; declaration order is execution order
    pub steps: Vec<Step>,
}

/// A single step in a pipeline
#[derive(Debug, Clone)]
pub struct Step {
    /// Installed module to invoke (also the step directory name)
    pub name: String,

    /// Where the step's input comes from
    pub input: StepInput,

    /// Opaque configuration handed to the module
    pub config: Map<String, Value>,
}

/// Declared input of a step
#[derive(Debug, Clone, PartialEq)]
pub enum StepInput {
    /// No input declared
    None,

    /// Literal value passed through unchanged
    Literal(String),

    /// Artifact produced by an earlier step
    Reference(ArtifactRef),

    /// Any other shape; rejected when the step's input is resolved
    Invalid(Value),
}

/// Reference to an artifact in another step's output index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    pub from: String,
    pub artifact: String,
}

#[derive(Debug, Deserialize)]
struct RawPipeline {
    #[serde(default)]
    modules: Vec<RawStep>,
}

#[derive(Debug, Deserialize)]
struct RawStep {
    name: String,
    #[serde(default)]
    input: Value,
    #[serde(default)]
    config: Option<Map<String, Value>>,
}

impl Pipeline {
    /// Load a pipeline from a YAML file
    pub fn from_file(path: &Path) -> Result<Self, LoadError> {
        let content = std::fs::read_to_string(path).map_err(|source| LoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_yaml(&content)
    }

    /// Parse a pipeline from YAML content, expanding `${VAR}` in config values
    pub fn from_yaml(content: &str) -> Result<Self, LoadError> {
        Self::from_yaml_with_env(content, |name| std::env::var(name).ok())
    }

    /// Parse a pipeline, resolving placeholders through `lookup`
    pub fn from_yaml_with_env<F>(content: &str, lookup: F) -> Result<Self, LoadError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw: RawPipeline = serde_yaml::from_str(content)?;

        let steps = raw
            .modules
            .into_iter()
            .map(|step| {
                let mut config = step.config.unwrap_or_default();
                for value in config.values_mut() {
                    expand_value(value, &lookup);
                }
                Step {
                    name: step.name,
                    input: StepInput::from_value(step.input),
                    config,
                }
            })
            .collect();

        let pipeline = Self { steps };
        pipeline.validate()?;
        Ok(pipeline)
    }

    /// Validate the pipeline definition
    pub fn validate(&self) -> Result<(), LoadError> {
        if self.steps.is_empty() {
            return Err(LoadError::Empty);
        }

        let mut seen = HashSet::new();
        for (index, step) in self.steps.iter().enumerate() {
            if !is_plain_name(&step.name) {
                return Err(LoadError::InvalidStepName {
                    index,
                    name: step.name.clone(),
                });
            }
            if !seen.insert(step.name.as_str()) {
                return Err(LoadError::DuplicateStep(step.name.clone()));
            }
        }

        Ok(())
    }

    /// Get a step by name
    pub fn get_step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Get the index of a step by name
    pub fn step_index(&self, name: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.name == name)
    }

    /// Names of all modules the pipeline invokes, in order
    pub fn module_names(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|s| s.name.as_str())
    }
}

impl StepInput {
    /// Classify a raw `input` value
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Null => Self::None,
            Value::String(literal) => Self::Literal(literal),
            Value::Object(map) => {
                let field = |key: &str| {
                    map.get(key)
                        .and_then(Value::as_str)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                };
                match (field("from"), field("artifact")) {
                    (Some(from), Some(artifact)) if is_plain_name(&from) => {
                        Self::Reference(ArtifactRef { from, artifact })
                    }
                    _ => Self::Invalid(Value::Object(map)),
                }
            }
            other => Self::Invalid(other),
        }
    }
}

/// Whether `name` can be used as a single directory or file name
pub fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(&['/', '\\', '\0'][..])
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([^}]*)\}").expect("placeholder pattern is valid"))
}

/// Expand `${NAME}` placeholders; unset variables become empty strings
pub fn expand_placeholders<F>(text: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    placeholder_pattern()
        .replace_all(text, |caps: &Captures| lookup(&caps[1]).unwrap_or_default())
        .into_owned()
}

fn expand_value<F>(value: &mut Value, lookup: &F)
where
    F: Fn(&str) -> Option<String>,
{
    match value {
        Value::String(s) => {
            if s.contains("${") {
                *s = expand_placeholders(s, lookup);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|v| expand_value(v, lookup)),
        Value::Object(map) => map.values_mut().for_each(|v| expand_value(v, lookup)),
        _ => {}
    }
}
