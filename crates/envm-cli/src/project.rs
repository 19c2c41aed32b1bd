//! `envm.json`: links a working directory to a server-side project.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::dotenv::EnvFile;

pub const CONFIG_FILE: &str = "envm.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub organization_id: String,
    pub project_id: String,
    /// `.env*` files found when the directory was linked.
    #[serde(default)]
    pub environments: Vec<EnvFile>,
}

impl ProjectConfig {
    /// Read `envm.json` from `dir`.
    ///
    /// # Errors
    ///
    /// Fails if the file is missing or is not valid JSON.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            bail!("no {CONFIG_FILE} found; run `envm init` to link this directory to a project");
        }
        let content =
            fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Write `envm.json` into `dir`.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be written.
    pub fn save(&self, dir: &Path) -> Result<()> {
        let path = dir.join(CONFIG_FILE);
        let mut json = serde_json::to_string_pretty(self).context("failed to encode project config")?;
        json.push('\n');
        fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let config = ProjectConfig {
            organization_id: "org".to_owned(),
            project_id: "proj".to_owned(),
            environments: vec![EnvFile {
                name: "default".to_owned(),
                path: ".env".to_owned(),
            }],
        };
        config.save(dir.path()).unwrap();
        assert_eq!(ProjectConfig::load(dir.path()).unwrap(), config);
    }

    #[test]
    fn missing_config_points_at_init() {
        let dir = tempfile::tempdir().unwrap();
        let err = ProjectConfig::load(dir.path()).unwrap_err();
        assert!(err.to_string().contains("envm init"));
    }
}
