//! fetch-file handler
//!
//! Downloads a URL to a path, optionally unpacking an archive into a
//! directory. Transport errors, HTTP 429 and 5xx responses are retried with
//! exponential backoff; anything else fails the step immediately.

use anyhow::{Context, Result, bail};
use plankit::{ActionHandler, LogCallback, RetryConfig, Retryable, StepDescriptor, with_retry};
use std::fs;
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

use crate::paths;

/// Maximum download size (installers and toolchain archives fit in this)
const MAX_DOWNLOAD_SIZE: u64 = 512 * 1024 * 1024;

/// Default number of attempts for one download
const DEFAULT_ATTEMPTS: u32 = 4;

/// Why a download attempt failed
#[derive(Debug, Error)]
pub enum FetchError {
    /// Could not reach the server or the connection broke
    #[error("network error fetching {url}: {message}")]
    Network { url: String, message: String },

    /// Server answered with a non-success status
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

impl FetchError {
    fn from_ureq(url: &str, err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(status) => Self::Status {
                url: url.to_string(),
                status,
            },
            other => Self::Network {
                url: url.to_string(),
                message: other.to_string(),
            },
        }
    }
}

impl Retryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
        }
    }
}

/// Archive formats `extract` accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarGz,
    Zip,
}

impl ArchiveFormat {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "tar.gz" | "tgz" => Ok(Self::TarGz),
            "zip" => Ok(Self::Zip),
            other => bail!("unsupported archive format '{other}' (expected tar.gz or zip)"),
        }
    }
}

/// Downloads files over HTTP(S)
///
/// Parameters: `url`, `dest`, optional `mode` (octal), `blake3` (hex
/// digest of the download), `extract` (`tar.gz` or `zip`, unpacks into
/// `dest`), `attempts`.
pub struct FetchFileHandler {
    agent: ureq::Agent,
    retry: RetryConfig,
}

impl FetchFileHandler {
    pub fn new() -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
            retry: RetryConfig::with_attempts(DEFAULT_ATTEMPTS),
        }
    }

    #[cfg(test)]
    fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn download_once(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let mut response = self
            .agent
            .get(url)
            .header("User-Agent", concat!("provisioner/", env!("CARGO_PKG_VERSION")))
            .call()
            .map_err(|e| FetchError::from_ureq(url, e))?;

        response
            .body_mut()
            .with_config()
            .limit(MAX_DOWNLOAD_SIZE)
            .read_to_vec()
            .map_err(|e| FetchError::from_ureq(url, e))
    }

    fn download(&self, url: &str, attempts: u32) -> Result<Vec<u8>, FetchError> {
        let config = RetryConfig {
            max_attempts: attempts,
            ..self.retry.clone()
        };
        with_retry(&config, Some(&LogCallback), || self.download_once(url))
    }
}

impl Default for FetchFileHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionHandler for FetchFileHandler {
    fn perform(&self, step: &StepDescriptor) -> Result<()> {
        let url = step.require_param("url")?;
        let dest = paths::expand(step.require_param("dest")?);
        let attempts = match step.param("attempts") {
            Some(n) => n
                .parse::<u32>()
                .with_context(|| format!("invalid attempts '{n}'"))?,
            None => self.retry.max_attempts,
        };
        let extract = step.param("extract").map(ArchiveFormat::parse).transpose()?;

        log::info!("Fetching {url} -> {}", dest.display());
        let bytes = self.download(url, attempts)?;

        if let Some(expected) = step.param("blake3") {
            check_digest(&bytes, expected)?;
        }

        match extract {
            Some(format) => unpack(&bytes, format, &dest)?,
            None => write_file(&bytes, &dest)?,
        }

        if let Some(mode) = step.param("mode") {
            set_mode(&dest, mode)?;
        }
        Ok(())
    }
}

/// Compare the BLAKE3 digest of `bytes` with a hex string
pub fn check_digest(bytes: &[u8], expected: &str) -> Result<()> {
    let actual = blake3::hash(bytes).to_hex();
    if !actual.as_str().eq_ignore_ascii_case(expected.trim()) {
        bail!("checksum mismatch: expected blake3 {expected}, got {actual}");
    }
    Ok(())
}

fn write_file(bytes: &[u8], dest: &Path) -> Result<()> {
    if let Some(dir) = dest.parent()
        && !dir.as_os_str().is_empty()
    {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    }
    fs::write(dest, bytes).with_context(|| format!("Failed to write {}", dest.display()))
}

/// Unpack an archive into `dest`, creating it if needed
pub fn unpack(bytes: &[u8], format: ArchiveFormat, dest: &Path) -> Result<()> {
    fs::create_dir_all(dest)
        .with_context(|| format!("Failed to create directory: {}", dest.display()))?;

    match format {
        ArchiveFormat::TarGz => {
            let decoder = flate2::read::GzDecoder::new(bytes);
            tar::Archive::new(decoder)
                .unpack(dest)
                .with_context(|| format!("Failed to unpack tar.gz into {}", dest.display()))?;
        }
        ArchiveFormat::Zip => {
            zip::ZipArchive::new(Cursor::new(bytes))
                .context("Invalid zip archive")?
                .extract(dest)
                .with_context(|| format!("Failed to unpack zip into {}", dest.display()))?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: &str) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let bits = u32::from_str_radix(mode.trim_start_matches("0o"), 8)
        .with_context(|| format!("invalid octal mode '{mode}'"))?;
    fs::set_permissions(path, fs::Permissions::from_mode(bits))
        .with_context(|| format!("Failed to set mode {mode} on {}", path.display()))
}

#[cfg(not(unix))]
fn set_mode(path: &Path, mode: &str) -> Result<()> {
    log::debug!("Ignoring mode {mode} for {} on this platform", path.display());
    Ok(())
}
