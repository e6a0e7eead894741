use anyhow::{Context, Result, bail};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};

use crate::signal;

/// Run a step command, streaming its output to the terminal
///
/// The child gets its own process group and no stdin, so a terminal Ctrl-C
/// only reaches the provisioner, which stops before the next step.
pub fn run(cmd: &str, args: &[&str]) -> Result<()> {
    let what = format!("{} {}", cmd, args.join(" "));
    log::debug!("Running: {what}");
    let mut command = Command::new(cmd);
    command.args(args);
    run_step_child(command, &what)
}

/// Run a command line through `sh -c`, optionally in another directory
pub fn run_shell(command: &str, cwd: Option<&Path>) -> Result<()> {
    log::debug!("Running shell command: {command}");
    let mut child = Command::new("sh");
    child.args(["-c", command]);
    if let Some(dir) = cwd {
        child.current_dir(dir);
    }
    run_step_child(child, command)
}

fn run_step_child(mut command: Command, what: &str) -> Result<()> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    own_process_group(&mut command);

    let mut child = command
        .spawn()
        .with_context(|| format!("Failed to execute: {what}"))?;
    signal::track_child(Some(child.id()));
    let status = child.wait();
    signal::track_child(None);

    let status = status.with_context(|| format!("Failed to wait for: {what}"))?;
    check_status(status, what)
}

#[cfg(unix)]
fn own_process_group(command: &mut Command) {
    use std::os::unix::process::CommandExt;

    command.process_group(0);
}

#[cfg(not(unix))]
fn own_process_group(_command: &mut Command) {}

/// Run a command line through `sh -c` silently, returning success/failure
pub fn run_shell_quiet(command: &str) -> bool {
    let mut child = Command::new("sh");
    child
        .args(["-c", command])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    own_process_group(&mut child);
    child
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Run a command and capture stdout and stderr together
///
/// Many tools print their version on stderr, so both streams are kept.
pub fn run_capture_all(cmd: &Path, args: &[&str]) -> Result<String> {
    let mut command = Command::new(cmd);
    command.args(args).stdin(Stdio::null());
    own_process_group(&mut command);
    let output = command
        .output()
        .with_context(|| format!("Failed to execute: {} {}", cmd.display(), args.join(" ")))?;

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));

    if output.status.success() {
        Ok(text.trim().to_string())
    } else {
        bail!("{} exited with {}: {}", cmd.display(), output.status, text.trim())
    }
}

/// Check if a command exists on PATH
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Whether the current process runs as root
#[cfg(unix)]
pub fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
pub fn is_root() -> bool {
    false
}

/// Whether system-level commands will be prefixed with sudo
pub fn uses_sudo() -> bool {
    !is_root() && command_exists("sudo")
}

/// Validate sudo credentials up front, prompting in the foreground
///
/// Step commands run without a terminal to read from, so they call
/// `sudo -n` and rely on the timestamp cached here.
pub fn acquire_sudo(reason: &str) -> Result<()> {
    if !uses_sudo() {
        return Ok(());
    }
    eprintln!();
    eprintln!("  Sudo required: {reason}");
    eprintln!();

    let status = Command::new("sudo")
        .arg("-v")
        .status()
        .context("Failed to execute sudo")?;
    if !status.success() {
        bail!("Failed to acquire sudo privileges");
    }
    Ok(())
}

/// Prefix a system-level command with non-interactive sudo when not root
///
/// Returns the program and arguments to run. If sudo is not installed the
/// command is returned unchanged and left to fail on its own.
pub fn privileged<'a>(cmd: &'a str, args: &[&'a str]) -> (&'a str, Vec<&'a str>) {
    if !uses_sudo() {
        return (cmd, args.to_vec());
    }
    let mut full = Vec::with_capacity(args.len() + 2);
    full.push("-n");
    full.push(cmd);
    full.extend_from_slice(args);
    ("sudo", full)
}

fn check_status(status: ExitStatus, what: &str) -> Result<()> {
    if status.success() {
        return Ok(());
    }
    match status.code() {
        Some(code) => bail!("`{what}` exited with status {code}"),
        None => bail!("`{what}` was terminated by a signal"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_shell_reports_exit_code() {
        run_shell("true", None).unwrap();
        let err = run_shell("exit 7", None).unwrap_err().to_string();
        assert!(err.contains("status 7"), "{err}");
    }

    #[test]
    fn test_run_shell_in_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        run_shell("touch marker", Some(dir.path())).unwrap();
        assert!(dir.path().join("marker").exists());
    }

    #[test]
    fn test_run_shell_quiet() {
        assert!(run_shell_quiet("true"));
        assert!(!run_shell_quiet("false"));
    }

    #[test]
    fn test_capture_includes_stderr() {
        let sh = which::which("sh").unwrap();
        let out = run_capture_all(&sh, &["-c", "echo out; echo err 1>&2"]).unwrap();
        assert!(out.contains("out"));
        assert!(out.contains("err"));
    }

    #[test]
    fn test_privileged_keeps_arguments() {
        let (program, args) = privileged("apt-get", &["install", "-y", "curl"]);
        assert!(args.ends_with(&["install", "-y", "curl"]));
        if program == "sudo" {
            assert_eq!(args[..2], ["-n", "apt-get"]);
        } else {
            assert_eq!(program, "apt-get");
        }
    }
}
