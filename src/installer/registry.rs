//! Installed-module registry.
//!
//! A single JSON document mapping module name to where its binary lives and
//! how far it is trusted. Only the installer writes it; the run command reads
//! it to find binaries.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read registry {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse registry {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write registry {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode registry: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Install record of one module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub bin_path: PathBuf,
    pub version: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub official: bool,
    #[serde(default)]
    pub verified: bool,
}

impl RegistryEntry {
    /// Trust label shown in listings
    pub fn status(&self) -> &'static str {
        if self.official {
            "official"
        } else if self.verified {
            "verified"
        } else {
            "unverified"
        }
    }
}

/// All installed modules, keyed (and listed) by name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Registry {
    modules: BTreeMap<String, RegistryEntry>,
}

impl Registry {
    /// Load the registry; a missing file is an empty registry
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(RegistryError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        serde_json::from_str(&content).map_err(|source| RegistryError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the registry, creating its parent directory if needed
    pub fn save(&self, path: &Path) -> Result<(), RegistryError> {
        let write_err = |source| RegistryError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(write_err)
    }

    pub fn get(&self, name: &str) -> Option<&RegistryEntry> {
        self.modules.get(name)
    }

    /// Add or replace an entry
    pub fn insert(&mut self, name: impl Into<String>, entry: RegistryEntry) {
        self.modules.insert(name.into(), entry);
    }

    pub fn remove(&mut self, name: &str) -> Option<RegistryEntry> {
        self.modules.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RegistryEntry)> {
        self.modules.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Human-readable listing of installed modules
    pub fn render_table(&self) -> String {
        if self.is_empty() {
            return "  no modules installed — run: opentrace install <name>\n".to_string();
        }

        let mut out = String::from("\n");
        let _ = writeln!(
            out,
            "  {:<22}  {:<10}  {:<16}  {}",
            "MODULE", "VERSION", "AUTHOR", "STATUS"
        );
        let _ = writeln!(
            out,
            "  {:<22}  {:<10}  {:<16}  {}",
            "─".repeat(22),
            "─".repeat(9),
            "─".repeat(15),
            "─".repeat(10)
        );
        for (name, entry) in self.iter() {
            let _ = writeln!(
                out,
                "  {:<22}  {:<10}  {:<16}  {}",
                name,
                entry.version,
                entry.author,
                entry.status()
            );
        }
        out.push('\n');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(official: bool, verified: bool) -> RegistryEntry {
        RegistryEntry {
            bin_path: PathBuf::from("/home/u/.opentrace/bin/m"),
            version: "1.0.0".to_string(),
            author: "alice".to_string(),
            official,
            verified,
        }
    }

    #[test]
    fn test_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let registry = Registry::load(&temp.path().join("registry.json")).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("registry.json");

        let mut registry = Registry::default();
        registry.insert("ip_lookup", entry(true, true));
        registry.save(&path).unwrap();

        let loaded = Registry::load(&path).unwrap();
        assert_eq!(loaded, registry);
        assert!(loaded.contains("ip_lookup"));
    }

    #[test]
    fn test_on_disk_format() {
        let mut registry = Registry::default();
        registry.insert("m", entry(false, true));

        let value: serde_json::Value = serde_json::to_value(&registry).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "m": {
                    "bin_path": "/home/u/.opentrace/bin/m",
                    "version": "1.0.0",
                    "author": "alice",
                    "official": false,
                    "verified": true
                }
            })
        );
    }

    #[test]
    fn test_malformed_file_is_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("registry.json");
        std::fs::write(&path, "[1, 2").unwrap();
        assert!(matches!(Registry::load(&path), Err(RegistryError::Parse { .. })));
    }

    #[test]
    fn test_status_precedence() {
        assert_eq!(entry(true, false).status(), "official");
        assert_eq!(entry(true, true).status(), "official");
        assert_eq!(entry(false, true).status(), "verified");
        assert_eq!(entry(false, false).status(), "unverified");
    }

    #[test]
    fn test_render_table() {
        let empty = Registry::default().render_table();
        assert!(empty.contains("no modules installed — run: opentrace install <name>"));

        let mut registry = Registry::default();
        registry.insert("zeta", entry(false, false));
        registry.insert("alpha", entry(true, false));
        let table = registry.render_table();

        assert!(table.contains("MODULE"));
        let alpha = table.find("alpha").unwrap();
        let zeta = table.find("zeta").unwrap();
        assert!(alpha < zeta);
        assert!(table.lines().any(|l| l.contains("zeta") && l.ends_with("unverified")));
    }
}
