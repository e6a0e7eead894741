//! Plan file schema
//!
//! A plan file lists steps under `[[step]]` (TOML) or `"step": [...]`
//! (JSON). The format is chosen by file extension; anything that is not
//! `.json` is read as TOML.

use anyhow::{Context, Result};
use plankit::StepDescriptor;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Supported plan file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanFormat {
    Toml,
    Json,
}

impl PlanFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Toml,
        }
    }
}

/// Top-level plan file
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanFile {
    /// Optional human-readable name shown in headers
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default, rename = "step")]
    pub steps: Vec<StepDescriptor>,
}

impl PlanFile {
    /// Load and parse a plan file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read plan file: {}", path.display()))?;
        Self::parse(&content, PlanFormat::from_path(path))
            .with_context(|| format!("Invalid plan file: {}", path.display()))
    }

    pub fn parse(content: &str, format: PlanFormat) -> Result<Self> {
        let plan: Self = match format {
            PlanFormat::Toml => toml::from_str(content).context("Invalid TOML format")?,
            PlanFormat::Json => serde_json::from_str(content).context("Invalid JSON format")?,
        };
        log::debug!("Parsed plan file with {} steps", plan.steps.len());
        Ok(plan)
    }

    /// Display name, falling back to the file name
    pub fn display_name(&self, path: &Path) -> String {
        self.name.clone().unwrap_or_else(|| {
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plankit::StepKind;

    const TOML_PLAN: &str = r#"
name = "build host"

[[step]]
id = "base-packages"
kind = "install-package"
[step.params]
manager = "apt"
packages = "build-essential curl"

[[step]]
id = "rustup"
kind = "fetch-file"
requires = ["base-packages"]
[step.params]
url = "https://sh.rustup.rs"
dest = "/tmp/rustup-init.sh"
mode = "755"
"#;

    #[test]
    fn test_parse_toml() {
        let plan = PlanFile::parse(TOML_PLAN, PlanFormat::Toml).unwrap();
        assert_eq!(plan.name.as_deref(), Some("build host"));
        assert_eq!(plan.steps.len(), 2);

        let rustup = &plan.steps[1];
        assert_eq!(rustup.kind(), StepKind::FetchFile);
        assert_eq!(rustup.prerequisites(), ["base-packages".to_string()]);
        assert_eq!(rustup.param("mode"), Some("755"));
    }

    #[test]
    fn test_parse_json() {
        let json = r#"{
            "step": [
                { "id": "path", "kind": "set-env", "params": { "name": "PATH", "value": "$HOME/.cargo/bin:$PATH" } },
                { "id": "prepare", "kind": "run-command", "requires": ["path"], "params": { "command": "npm run prepare" } }
            ]
        }"#;
        let plan = PlanFile::parse(json, PlanFormat::Json).unwrap();
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[0].kind(), StepKind::SetEnv);
        assert!(plan.steps[0].prerequisites().is_empty());
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let toml = "[[step]]\nid = \"x\"\nkind = \"reboot\"\n";
        assert!(PlanFile::parse(toml, PlanFormat::Toml).is_err());
    }

    #[test]
    fn test_unknown_step_key_is_rejected() {
        let toml = r#"
[[step]]
id = "a"
kind = "run-command"

[[step]]
id = "b"
kind = "run-command"
require = ["zzz-missing"]
"#;
        let err = PlanFile::parse(toml, PlanFormat::Toml).unwrap_err();
        assert!(format!("{err:#}").contains("require"), "{err:#}");

        let json = r#"{ "step": [ { "id": "b", "kind": "set-env", "param": {} } ] }"#;
        assert!(PlanFile::parse(json, PlanFormat::Json).is_err());
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(PlanFormat::from_path(Path::new("plan.JSON")), PlanFormat::Json);
        assert_eq!(PlanFormat::from_path(Path::new("provision.toml")), PlanFormat::Toml);
        assert_eq!(PlanFormat::from_path(Path::new("plan")), PlanFormat::Toml);
    }

    #[test]
    fn test_display_name_falls_back_to_file_name() {
        let plan = PlanFile::default();
        assert_eq!(plan.display_name(Path::new("/srv/provision.toml")), "provision.toml");
    }
}
