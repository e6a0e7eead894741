//! set-env handler

use anyhow::{Context, Result};
use plankit::{ActionHandler, StepDescriptor};

use crate::envfile::{self, EnvFile};
use crate::paths;

/// Sets an environment variable for later steps and future runs
///
/// Parameters: `name`, `value` (`~` and `$VAR` are expanded).
pub struct SetEnvHandler {
    env_file: EnvFile,
}

impl SetEnvHandler {
    pub fn new(env_file: EnvFile) -> Self {
        Self { env_file }
    }
}

impl ActionHandler for SetEnvHandler {
    fn perform(&self, step: &StepDescriptor) -> Result<()> {
        let name = step.require_param("name")?;
        anyhow::ensure!(
            !name.is_empty() && !name.contains(['=', '\0']),
            "invalid environment variable name '{name}'"
        );
        let value = paths::expand_str(step.require_param("value")?);

        log::info!("Setting {name}={value}");
        envfile::set_process_var(name, &value);
        self.env_file
            .store(name, &value)
            .with_context(|| format!("failed to persist {name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plankit::StepKind;

    #[test]
    fn test_sets_and_persists() {
        let _env = crate::envfile::lock_env();
        let dir = tempfile::TempDir::new().unwrap();
        let env_file = EnvFile::new(dir.path().join("env.toml"));
        let handler = SetEnvHandler::new(env_file.clone());

        let step = StepDescriptor::new("toolchain-home", StepKind::SetEnv)
            .with_param("name", "PROVISIONER_TEST_SET_ENV")
            .with_param("value", "/opt/toolchain");
        handler.perform(&step).unwrap();

        assert_eq!(
            std::env::var("PROVISIONER_TEST_SET_ENV").unwrap(),
            "/opt/toolchain"
        );
        assert_eq!(env_file.read()["PROVISIONER_TEST_SET_ENV"], "/opt/toolchain");
    }

    #[test]
    fn test_rejects_bad_name() {
        let dir = tempfile::TempDir::new().unwrap();
        let handler = SetEnvHandler::new(EnvFile::new(dir.path().join("env.toml")));
        let step = StepDescriptor::new("bad", StepKind::SetEnv)
            .with_param("name", "A=B")
            .with_param("value", "x");
        assert!(handler.perform(&step).is_err());
    }
}
