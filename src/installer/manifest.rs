//! Module manifest (`manifest.yaml`).

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File name of a module manifest inside its source tree
pub const MANIFEST_FILE: &str = "manifest.yaml";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("cannot read manifest at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid manifest YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("manifest missing required fields: name and version")]
    MissingFields,
}

/// Metadata a module ships alongside its source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub author: String,

    #[serde(default)]
    pub official: bool,

    #[serde(default)]
    pub verified: bool,

    /// Kinds of entities the module consumes or produces
    #[serde(default)]
    pub entity_types: Vec<String>,

    #[serde(default)]
    pub repo: String,
}

impl Manifest {
    pub fn from_file(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ManifestError> {
        let manifest: Manifest = serde_yaml::from_str(content)?;
        if manifest.name.is_empty() || manifest.version.is_empty() {
            return Err(ManifestError::MissingFields);
        }
        Ok(manifest)
    }
}

impl fmt::Display for Manifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  name        : {}", self.name)?;
        writeln!(f, "  version     : {}", self.version)?;
        writeln!(f, "  author      : {}", self.author)?;
        writeln!(f, "  description : {}", self.description)?;
        if !self.entity_types.is_empty() {
            writeln!(f, "  entities    : {}", self.entity_types.join(", "))?;
        }
        writeln!(f, "  official    : {}", self.official)?;
        write!(f, "  verified    : {}", self.verified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_manifest() {
        let yaml = r#"
name: ip_lookup
version: 1.2.0
description: Resolve IP ownership
author: its-ernest
official: true
verified: true
entity_types: [ip, asn]
repo: github.com/its-ernest/opentrace-modules
"#;
        let manifest = Manifest::from_yaml(yaml).unwrap();
        assert_eq!(manifest.name, "ip_lookup");
        assert_eq!(manifest.version, "1.2.0");
        assert_eq!(manifest.entity_types, vec!["ip", "asn"]);
        assert!(manifest.official && manifest.verified);
    }

    #[test]
    fn test_optional_fields_default() {
        let manifest = Manifest::from_yaml("name: x\nversion: '0.1'\n").unwrap();
        assert!(!manifest.verified);
        assert!(manifest.author.is_empty());
        assert!(manifest.entity_types.is_empty());
    }

    #[test]
    fn test_missing_required_fields() {
        assert!(matches!(
            Manifest::from_yaml("name: x\n"),
            Err(ManifestError::MissingFields)
        ));
        assert!(matches!(
            Manifest::from_yaml("version: '1'\nname: ''\n"),
            Err(ManifestError::MissingFields)
        ));
    }

    #[test]
    fn test_unreadable_manifest() {
        let temp = tempfile::TempDir::new().unwrap();
        let err = Manifest::from_file(&temp.path().join(MANIFEST_FILE)).unwrap_err();
        assert!(matches!(err, ManifestError::Read { .. }));
    }
}
