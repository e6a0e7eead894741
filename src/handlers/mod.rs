//! Built-in action handlers, one per step kind

mod fetch_file;
mod install_package;
mod run_command;
mod set_env;

pub use fetch_file::FetchFileHandler;
pub use install_package::{InstallPackageHandler, needs_privilege};
pub use run_command::RunCommandHandler;
pub use set_env::SetEnvHandler;

use plankit::{HandlerRegistry, StepKind};

use crate::envfile::EnvFile;

/// Registry with a handler for every step kind
pub fn registry(env_file: EnvFile) -> HandlerRegistry {
    HandlerRegistry::new()
        .with(StepKind::InstallPackage, InstallPackageHandler::new())
        .with(StepKind::FetchFile, FetchFileHandler::new())
        .with(StepKind::SetEnv, SetEnvHandler::new(env_file))
        .with(StepKind::RunCommand, RunCommandHandler)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_has_a_handler() {
        let registry = registry(EnvFile::new("/nonexistent/env.toml"));
        for kind in StepKind::all() {
            assert!(registry.get(*kind).is_some(), "no handler for {kind}");
        }
    }
}
