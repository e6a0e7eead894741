//! Step descriptors - the immutable unit of a provisioning plan

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Unique name of a step within a plan
pub type StepId = String;

/// What a step does when it runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    /// Install one or more packages with a system or language package manager
    InstallPackage,
    /// Download a file (optionally unpacking it)
    FetchFile,
    /// Set an environment variable for later steps
    SetEnv,
    /// Run an arbitrary shell command
    RunCommand,
}

impl StepKind {
    /// All kinds, in declaration order
    pub fn all() -> &'static [StepKind] {
        &[
            Self::InstallPackage,
            Self::FetchFile,
            Self::SetEnv,
            Self::RunCommand,
        ]
    }

    /// Name used in plan files
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InstallPackage => "install-package",
            Self::FetchFile => "fetch-file",
            Self::SetEnv => "set-env",
            Self::RunCommand => "run-command",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One provisioning action plus the steps that must run before it
///
/// Descriptors are immutable once built: fields are only reachable through
/// accessors, and the builder methods consume `self`. Unknown keys such
/// as a misspelled `requires` are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepDescriptor {
    id: StepId,
    kind: StepKind,
    #[serde(default)]
    params: BTreeMap<String, String>,
    #[serde(default)]
    requires: Vec<StepId>,
}

impl StepDescriptor {
    /// Create a descriptor with no parameters and no prerequisites
    pub fn new(id: impl Into<StepId>, kind: StepKind) -> Self {
        Self {
            id: id.into(),
            kind,
            params: BTreeMap::new(),
            requires: Vec::new(),
        }
    }

    /// Add a parameter
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Add prerequisites
    pub fn requires<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<StepId>,
    {
        self.requires.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> StepKind {
        self.kind
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    /// Look up a single parameter
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Look up a parameter that the step cannot run without
    pub fn require_param(&self, key: &str) -> anyhow::Result<&str> {
        self.param(key).ok_or_else(|| {
            anyhow::anyhow!(
                "step '{}' ({}) is missing required parameter '{}'",
                self.id,
                self.kind,
                key
            )
        })
    }

    pub fn prerequisites(&self) -> &[StepId] {
        &self.requires
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_match_plan_file_spelling() {
        #[derive(Deserialize)]
        struct Wrapper {
            kind: StepKind,
        }

        for kind in StepKind::all() {
            let parsed: Wrapper = toml::from_str(&format!("kind = \"{kind}\"")).unwrap();
            assert_eq!(&parsed.kind, kind);
        }
    }

    #[test]
    fn test_builder() {
        let step = StepDescriptor::new("node", StepKind::InstallPackage)
            .with_param("manager", "apt")
            .with_param("packages", "nodejs")
            .requires(["apt-update"]);

        assert_eq!(step.id(), "node");
        assert_eq!(step.param("manager"), Some("apt"));
        assert_eq!(step.prerequisites(), ["apt-update".to_string()]);
    }

    #[test]
    fn test_require_param_names_step_and_key() {
        let step = StepDescriptor::new("rustup", StepKind::FetchFile);
        let err = step.require_param("url").unwrap_err().to_string();
        assert!(err.contains("rustup"));
        assert!(err.contains("url"));
    }

    #[test]
    fn test_misspelled_requires_is_rejected() {
        let err = toml::from_str::<StepDescriptor>(
            "id = \"b\"\nkind = \"run-command\"\nrequire = [\"a\"]\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("require"), "{err}");
    }
}
