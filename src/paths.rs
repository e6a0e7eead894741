//! Centralized path resolution for provisioner
//!
//! # Environment Variables
//!
//! - `PROVISIONER_PLAN` - Plan file to load (default `./provision.toml`)
//! - `PROVISIONER_STATE_DIR` - Override state directory
//!
//! # State Directory Priority
//!
//! 1. `--state` flag / `PROVISIONER_STATE_DIR`
//! 2. `XDG_STATE_HOME/provisioner` (if set)
//! 3. Platform default:
//!    - Windows: `%LOCALAPPDATA%\provisioner`
//!    - macOS/Linux: `~/.local/state/provisioner`

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable for the plan file
pub const ENV_PLAN: &str = "PROVISIONER_PLAN";

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "PROVISIONER_STATE_DIR";

/// Plan file used when none is given
pub const DEFAULT_PLAN_FILE: &str = "provision.toml";

/// File holding step records inside the state directory
pub const STATE_FILE: &str = "state.toml";

/// File holding persisted environment variables inside the state directory
pub const ENV_FILE: &str = "env.toml";

/// Resolve the state directory
///
/// `explicit` is the `--state` flag, which clap already fills from
/// `PROVISIONER_STATE_DIR`.
pub fn state_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        let path = expand(&dir.to_string_lossy());
        log::debug!("Using state dir from flag/{}: {}", ENV_STATE_DIR, path.display());
        return Ok(path);
    }

    if let Ok(xdg_state) = std::env::var("XDG_STATE_HOME")
        && !xdg_state.is_empty()
    {
        let path = PathBuf::from(xdg_state).join("provisioner");
        log::debug!("Using XDG_STATE_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(local_app_data) = dirs::data_local_dir() {
            let path = local_app_data.join("provisioner");
            log::debug!("Using Windows state dir: {}", path.display());
            return Ok(path);
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".local").join("state").join("provisioner");
    log::debug!("Using default state dir: {}", path.display());
    Ok(path)
}

/// Expand ~ and environment variables in a path string
///
/// Unknown variables are left as written rather than failing.
pub fn expand(path: &str) -> PathBuf {
    PathBuf::from(expand_str(path))
}

/// Expand ~ and environment variables in any string
pub fn expand_str(value: &str) -> String {
    shellexpand::full(value)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| shellexpand::tilde(value).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_state_dir_wins() {
        let dir = state_dir(Some(Path::new("/custom/state"))).unwrap();
        assert_eq!(dir, PathBuf::from("/custom/state"));
    }

    #[test]
    fn test_explicit_state_dir_expands_tilde() {
        let home = dirs::home_dir().unwrap();
        let dir = state_dir(Some(Path::new("~/provisioner-state-test"))).unwrap();
        assert_eq!(dir, home.join("provisioner-state-test"));
    }

    #[test]
    fn test_expand_unknown_variable_keeps_text() {
        let expanded = expand_str("$PROVISIONER_SURELY_UNSET_VAR/bin");
        assert_eq!(expanded, "$PROVISIONER_SURELY_UNSET_VAR/bin");
    }

    #[test]
    fn test_expand_plain_string_is_unchanged() {
        assert_eq!(expand("/usr/local/bin"), PathBuf::from("/usr/local/bin"));
    }
}
