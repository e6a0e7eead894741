//! install-package handler

use anyhow::{Context, Result, bail};
use plankit::{ActionHandler, StepDescriptor, StepKind};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::runner;

/// Package managers the handler knows how to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Apt,
    Apk,
    Dnf,
    Brew,
    Cargo,
    Npm,
    Pip,
}

impl FromStr for PackageManager {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "apt" | "apt-get" => Self::Apt,
            "apk" => Self::Apk,
            "dnf" | "yum" => Self::Dnf,
            "brew" => Self::Brew,
            "cargo" => Self::Cargo,
            "npm" => Self::Npm,
            "pip" | "pip3" => Self::Pip,
            other => bail!(
                "unknown package manager '{other}' (expected apt, apk, dnf, brew, cargo, npm or pip)"
            ),
        })
    }
}

impl PackageManager {
    /// System managers write outside the user's home and need root
    pub fn is_system(&self) -> bool {
        matches!(self, Self::Apt | Self::Apk | Self::Dnf)
    }

    /// Program and arguments that install `packages`
    pub fn install_args<'a>(&self, packages: &[&'a str]) -> (&'static str, Vec<&'a str>) {
        let (program, mut args): (&'static str, Vec<&'a str>) = match self {
            Self::Apt => (
                "env",
                vec![
                    "DEBIAN_FRONTEND=noninteractive",
                    "apt-get",
                    "install",
                    "-y",
                    "--no-install-recommends",
                ],
            ),
            Self::Apk => ("apk", vec!["add", "--no-cache"]),
            Self::Dnf => ("dnf", vec!["install", "-y"]),
            Self::Brew => ("brew", vec!["install"]),
            Self::Cargo => ("cargo", vec!["install", "--locked"]),
            Self::Npm => ("npm", vec!["install", "--global"]),
            Self::Pip => ("python3", vec!["-m", "pip", "install"]),
        };
        args.extend_from_slice(packages);
        (program, args)
    }
}

/// Whether the step installs with a system package manager
///
/// Such steps run under `sudo -n`, so credentials must be cached first.
pub fn needs_privilege(step: &StepDescriptor) -> bool {
    step.kind() == StepKind::InstallPackage
        && step
            .param("manager")
            .and_then(|m| m.parse::<PackageManager>().ok())
            .is_some_and(|m| m.is_system())
}

/// Installs packages with the step's `manager`
///
/// Parameters: `manager`, `packages` (whitespace separated).
#[derive(Debug, Default)]
pub struct InstallPackageHandler {
    apt_index_fresh: AtomicBool,
}

impl InstallPackageHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// `apt-get install` on a fresh image fails without a package index
    fn refresh_apt_index(&self) -> Result<()> {
        if self.apt_index_fresh.load(Ordering::SeqCst) {
            return Ok(());
        }
        let (program, args) = runner::privileged(
            "env",
            &["DEBIAN_FRONTEND=noninteractive", "apt-get", "update"],
        );
        runner::run(program, &args).context("apt-get update failed")?;
        self.apt_index_fresh.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl ActionHandler for InstallPackageHandler {
    fn perform(&self, step: &StepDescriptor) -> Result<()> {
        let manager: PackageManager = step.require_param("manager")?.parse()?;
        let packages: Vec<&str> = step.require_param("packages")?.split_whitespace().collect();
        if packages.is_empty() {
            bail!("step '{}' lists no packages", step.id());
        }

        if manager == PackageManager::Apt {
            self.refresh_apt_index()?;
        }

        let (program, args) = manager.install_args(&packages);
        let (program, args) = if manager.is_system() {
            runner::privileged(program, &args)
        } else {
            (program, args)
        };

        log::info!("Installing {} with {:?}", packages.join(" "), manager);
        runner::run(program, &args)
            .with_context(|| format!("failed to install {}", packages.join(" ")))
    }
}
