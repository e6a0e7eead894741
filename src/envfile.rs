//! Persisted environment variables
//!
//! `set-env` steps change the provisioning process's environment, which is
//! lost when the process exits. Values are also written here so that a
//! re-run, which skips already-succeeded `set-env` steps, still starts with
//! the environment later steps expect.

use anyhow::{Context, Result};
use plankit::{FileLock, lock_path_for, replace_file};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Default, Serialize, Deserialize)]
struct EnvTable {
    #[serde(default)]
    vars: BTreeMap<String, String>,
}

/// Environment variables persisted next to the state file
#[derive(Debug, Clone)]
pub struct EnvFile {
    path: PathBuf,
}

impl EnvFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read all persisted variables; an unreadable file counts as empty
    pub fn read(&self) -> BTreeMap<String, String> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
            Err(e) => {
                log::warn!("Could not read {}: {}", self.path.display(), e);
                return BTreeMap::new();
            }
        };
        match toml::from_str::<EnvTable>(&content) {
            Ok(table) => table.vars,
            Err(e) => {
                log::warn!("Ignoring corrupt env file {}: {}", self.path.display(), e);
                BTreeMap::new()
            }
        }
    }

    /// Persist one variable
    ///
    /// Holds `env.toml.lock` across the read and the write, so concurrent
    /// writers never drop each other's variables.
    pub fn store(&self, name: &str, value: &str) -> Result<()> {
        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }
        let _lock = FileLock::acquire(&lock_path_for(&self.path))?;

        let mut vars = self.read();
        vars.insert(name.to_string(), value.to_string());

        let content = toml::to_string_pretty(&EnvTable { vars })
            .context("Failed to serialize environment")?;
        replace_file(&self.path, &content)
            .with_context(|| format!("Failed to write env file: {}", self.path.display()))?;
        log::debug!("Persisted {name} to {}", self.path.display());
        Ok(())
    }

    /// Remove every persisted variable
    pub fn clear(&self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let _lock = FileLock::acquire(&lock_path_for(&self.path))?;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to remove env file: {}", self.path.display())),
        }
    }

    /// Apply persisted variables to this process
    ///
    /// Must be called before any other thread is spawned.
    pub fn apply_to_process(&self) -> usize {
        let vars = self.read();
        for (name, value) in &vars {
            log::debug!("Restoring {name} from {}", self.path.display());
            set_process_var(name, value);
        }
        vars.len()
    }
}

/// Serializes tests that change the process environment
#[cfg(test)]
pub static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Set an environment variable for this process and its children
///
/// Provisioning runs steps on a single thread, so nothing reads the
/// environment concurrently. Tests that call this hold [`ENV_LOCK`].
pub fn set_process_var(name: &str, value: &str) {
    // SAFETY: steps run on one thread, and environment-changing tests are
    // serialized by ENV_LOCK
    unsafe { std::env::set_var(name, value) };
}

/// Hold [`ENV_LOCK`], even if a previous holder panicked
#[cfg(test)]
pub fn lock_env() -> std::sync::MutexGuard<'static, ()> {
    ENV_LOCK
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_and_read() {
        let dir = tempfile::TempDir::new().unwrap();
        let env = EnvFile::new(dir.path().join("nested").join("env.toml"));

        assert!(env.read().is_empty());
        env.store("CARGO_HOME", "/opt/cargo").unwrap();
        env.store("RUSTUP_HOME", "/opt/rustup").unwrap();
        env.store("CARGO_HOME", "/usr/local/cargo").unwrap();

        let vars = env.read();
        assert_eq!(vars.len(), 2);
        assert_eq!(vars["CARGO_HOME"], "/usr/local/cargo");
    }

    #[test]
    fn test_corrupt_file_reads_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("env.toml");
        fs::write(&path, "[[[").unwrap();
        assert!(EnvFile::new(&path).read().is_empty());
    }

    #[test]
    fn test_clear_missing_file_is_ok() {
        let dir = tempfile::TempDir::new().unwrap();
        let env = EnvFile::new(dir.path().join("env.toml"));
        env.clear().unwrap();
        env.store("A", "1").unwrap();
        env.clear().unwrap();
        assert!(env.read().is_empty());
    }

    #[test]
    fn test_concurrent_writers_lose_nothing() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("env.toml");

        let writers: Vec<_> = (0..4)
            .map(|w| {
                let env = EnvFile::new(&path);
                std::thread::spawn(move || {
                    for i in 0..5 {
                        env.store(&format!("VAR_{w}_{i}"), &format!("{w}.{i}"))
                            .unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let vars = EnvFile::new(&path).read();
        assert_eq!(vars.len(), 20);
        assert_eq!(vars["VAR_3_4"], "3.4");
        assert!(!dir.path().join("env.toml.tmp").exists());
    }
}
