//! Built-in verification hooks, one per step kind
//!
//! Hooks re-observe the host after a run. A step only gets a check when it
//! declares something observable: `install-package` steps need a `binary`,
//! `run-command` steps need a `verify` command.

use plankit::{CheckOutcome, StepDescriptor, StepKind, VerificationHook, Verifier};
use regex::Regex;
use std::cmp::Ordering;
use std::sync::LazyLock;

use crate::envfile::EnvFile;
use crate::{paths, runner};

static VERSION_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)+|\d+"));

/// Verifier with every built-in hook registered
pub fn verifier(env_file: EnvFile) -> Verifier {
    Verifier::new()
        .with_hook(StepKind::InstallPackage, ToolVersionHook)
        .with_hook(StepKind::FetchFile, FilePresentHook)
        .with_hook(StepKind::SetEnv, EnvValueHook::new(env_file))
        .with_hook(StepKind::RunCommand, VerifyCommandHook)
}

/// The installed binary is on PATH and, optionally, new enough
///
/// Parameters: `binary`, optional `min_version`, `version_arg` (default
/// `--version`).
pub struct ToolVersionHook;

impl VerificationHook for ToolVersionHook {
    fn name(&self) -> &'static str {
        "tool-version"
    }

    fn check(&self, step: &StepDescriptor) -> Option<CheckOutcome> {
        let binary = step.param("binary")?;
        let Ok(path) = which::which(binary) else {
            return Some(CheckOutcome::fail(format!("{binary} not found on PATH")));
        };

        let Some(min_version) = step.param("min_version") else {
            return Some(CheckOutcome::pass(format!("{binary} at {}", path.display())));
        };

        let version_arg = step.param("version_arg").unwrap_or("--version");
        let output = match runner::run_capture_all(&path, &[version_arg]) {
            Ok(output) => output,
            Err(e) => return Some(CheckOutcome::fail(format!("{e:#}"))),
        };
        let Some(found) = extract_version(&output) else {
            return Some(CheckOutcome::fail(format!(
                "no version number in `{binary} {version_arg}` output"
            )));
        };

        Some(if compare_versions(found, min_version) == Ordering::Less {
            CheckOutcome::fail(format!("{binary} {found} is older than {min_version}"))
        } else {
            CheckOutcome::pass(format!("{binary} {found} (>= {min_version})"))
        })
    }
}

/// The fetched file (or unpack directory) exists with the expected digest
pub struct FilePresentHook;

impl VerificationHook for FilePresentHook {
    fn name(&self) -> &'static str {
        "file-present"
    }

    fn check(&self, step: &StepDescriptor) -> Option<CheckOutcome> {
        let dest = paths::expand(step.param("dest")?);
        if !dest.exists() {
            return Some(CheckOutcome::fail(format!("{} is missing", dest.display())));
        }

        // Digests describe the download, not the unpacked tree
        if let Some(expected) = step.param("blake3")
            && step.param("extract").is_none()
        {
            let bytes = match std::fs::read(&dest) {
                Ok(bytes) => bytes,
                Err(e) => {
                    return Some(CheckOutcome::fail(format!(
                        "cannot read {}: {e}",
                        dest.display()
                    )));
                }
            };
            let actual = blake3::hash(&bytes).to_hex();
            if !actual.as_str().eq_ignore_ascii_case(expected.trim()) {
                return Some(CheckOutcome::fail(format!(
                    "{} has blake3 {actual}, expected {expected}",
                    dest.display()
                )));
            }
        }
        Some(CheckOutcome::pass(dest.display().to_string()))
    }
}

/// The variable holds the value the step set
///
/// Values like `$CARGO_HOME/bin:$PATH` expand differently once set, so the
/// value persisted when the step ran wins over a fresh expansion.
pub struct EnvValueHook {
    env_file: EnvFile,
}

impl EnvValueHook {
    pub fn new(env_file: EnvFile) -> Self {
        Self { env_file }
    }
}

impl VerificationHook for EnvValueHook {
    fn name(&self) -> &'static str {
        "env-value"
    }

    fn check(&self, step: &StepDescriptor) -> Option<CheckOutcome> {
        let name = step.param("name")?;
        let value = step.param("value")?;
        let expected = self
            .env_file
            .read()
            .remove(name)
            .unwrap_or_else(|| paths::expand_str(value));
        Some(match std::env::var(name) {
            Ok(actual) if actual == expected => CheckOutcome::pass(format!("{name}={actual}")),
            Ok(actual) => CheckOutcome::fail(format!("{name}={actual}, expected {expected}")),
            Err(_) => CheckOutcome::fail(format!("{name} is not set")),
        })
    }
}

/// A user-supplied `verify` command exits zero
pub struct VerifyCommandHook;

impl VerificationHook for VerifyCommandHook {
    fn name(&self) -> &'static str {
        "verify-command"
    }

    fn check(&self, step: &StepDescriptor) -> Option<CheckOutcome> {
        let command = step.param("verify")?;
        Some(if runner::run_shell_quiet(command) {
            CheckOutcome::pass(command)
        } else {
            CheckOutcome::fail(format!("`{command}` failed"))
        })
    }
}

/// First dotted version number in a tool's output
pub fn extract_version(output: &str) -> Option<&str> {
    let re = VERSION_RE.as_ref().ok()?;
    re.find(output).map(|m| m.as_str())
}

/// Compare dotted numeric versions; missing components count as zero
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let parts = |v: &str| -> Vec<u64> {
        v.trim_start_matches('v')
            .split('.')
            .map(|p| {
                p.chars()
                    .take_while(char::is_ascii_digit)
                    .collect::<String>()
                    .parse()
                    .unwrap_or(0)
            })
            .collect()
    };
    let (a, b) = (parts(a), parts(b));
    let len = a.len().max(b.len());
    (0..len)
        .map(|i| {
            let x = a.get(i).copied().unwrap_or(0);
            let y = b.get(i).copied().unwrap_or(0);
            x.cmp(&y)
        })
        .find(|o| o.is_ne())
        .unwrap_or(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_version() {
        assert_eq!(extract_version("rustc 1.90.0 (abc 2025-09-14)"), Some("1.90.0"));
        assert_eq!(extract_version("v20.11.1"), Some("20.11.1"));
        assert_eq!(extract_version("go version go1.22 linux/amd64"), Some("1.22"));
        assert_eq!(extract_version("no digits"), None);
    }

    #[test]
    fn test_compare_versions() {
        assert_eq!(compare_versions("1.90.0", "1.9"), Ordering::Greater);
        assert_eq!(compare_versions("2.0", "2.0.0"), Ordering::Equal);
        assert_eq!(compare_versions("v18.2", "20"), Ordering::Less);
    }

    #[test]
    fn test_tool_version_skips_without_binary() {
        let step = StepDescriptor::new("pkgs", StepKind::InstallPackage);
        assert!(ToolVersionHook.check(&step).is_none());
    }

    #[test]
    fn test_tool_version_missing_binary_fails() {
        let step = StepDescriptor::new("pkgs", StepKind::InstallPackage)
            .with_param("binary", "definitely-not-installed-xyz");
        let outcome = ToolVersionHook.check(&step).unwrap();
        assert!(!outcome.passed);
    }

    #[test]
    fn test_tool_version_binary_on_path_passes() {
        let step = StepDescriptor::new("sh", StepKind::InstallPackage).with_param("binary", "sh");
        assert!(ToolVersionHook.check(&step).unwrap().passed);
    }

    #[test]
    fn test_file_present_with_digest() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tool");
        std::fs::write(&path, b"payload").unwrap();
        let good = blake3::hash(b"payload").to_hex().to_string();

        let step = StepDescriptor::new("fetch", StepKind::FetchFile)
            .with_param("dest", path.to_string_lossy())
            .with_param("blake3", good);
        assert!(FilePresentHook.check(&step).unwrap().passed);

        let tampered = step.clone().with_param("blake3", "00");
        assert!(!FilePresentHook.check(&tampered).unwrap().passed);

        let missing = StepDescriptor::new("fetch", StepKind::FetchFile)
            .with_param("dest", dir.path().join("gone").to_string_lossy());
        assert!(!FilePresentHook.check(&missing).unwrap().passed);
    }

    #[test]
    fn test_env_value() {
        let _env = crate::envfile::lock_env();
        let dir = tempfile::TempDir::new().unwrap();
        let hook = EnvValueHook::new(EnvFile::new(dir.path().join("env.toml")));
        crate::envfile::set_process_var("PROVISIONER_TEST_ENV_HOOK", "on");
        let step = StepDescriptor::new("flag", StepKind::SetEnv)
            .with_param("name", "PROVISIONER_TEST_ENV_HOOK")
            .with_param("value", "on");
        assert!(hook.check(&step).unwrap().passed);

        let other = step.clone().with_param("value", "off");
        assert!(!hook.check(&other).unwrap().passed);
    }

    #[test]
    fn test_env_value_prefers_persisted_value() {
        let _env = crate::envfile::lock_env();
        let dir = tempfile::TempDir::new().unwrap();
        let env_file = EnvFile::new(dir.path().join("env.toml"));
        env_file
            .store("PROVISIONER_TEST_ENV_SELF", "/opt/bin:/usr/bin")
            .unwrap();
        crate::envfile::set_process_var("PROVISIONER_TEST_ENV_SELF", "/opt/bin:/usr/bin");

        // Re-expanding would prepend /opt/bin a second time
        let step = StepDescriptor::new("path", StepKind::SetEnv)
            .with_param("name", "PROVISIONER_TEST_ENV_SELF")
            .with_param("value", "/opt/bin:$PROVISIONER_TEST_ENV_SELF");
        assert!(EnvValueHook::new(env_file).check(&step).unwrap().passed);
    }

    #[test]
    fn test_verify_command_is_optional() {
        let step = StepDescriptor::new("prep", StepKind::RunCommand).with_param("command", "true");
        assert!(VerifyCommandHook.check(&step).is_none());

        let checked = step.clone().with_param("verify", "false");
        assert!(!VerifyCommandHook.check(&checked).unwrap().passed);
    }
}
