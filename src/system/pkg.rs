// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! OS package installation.
//!
//! Thin wrapper over whatever package manager the host has. Packages that
//! are already installed are left alone, and everything missing is installed
//! in one go.

use crate::{
    syscall::{Shell, Syscall},
    system::privilege::{Privilege, PrivilegeError},
};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};
use tracing::{info, instrument};

/// Supported package managers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Apt,
    Brew,
    Dnf,
    Zypper,
}

impl PackageManager {
    /// Detect package manager of current host.
    ///
    /// Homebrew is preferred on macOS. Elsewhere apt, dnf, then zypper are
    /// tried in that order.
    ///
    /// # Errors
    ///
    /// - Return [`PkgError::NoPackageManager`] if none can be found.
    pub fn detect(shell: &impl Shell) -> Result<Self> {
        let candidates: &[Self] = if cfg!(target_os = "macos") {
            &[Self::Brew]
        } else {
            &[Self::Apt, Self::Dnf, Self::Zypper, Self::Brew]
        };

        candidates
            .iter()
            .copied()
            .find(|manager| shell.has_program(manager.program()))
            .ok_or(PkgError::NoPackageManager)
    }

    /// Name of the binary that drives this package manager.
    pub fn program(&self) -> &'static str {
        match self {
            Self::Apt => "apt-get",
            Self::Brew => "brew",
            Self::Dnf => "dnf",
            Self::Zypper => "zypper",
        }
    }

    /// Whether installation requires root.
    pub fn needs_root(&self) -> bool {
        !matches!(self, Self::Brew)
    }

    /// Check if a package is installed.
    pub fn is_installed(&self, shell: &impl Shell, package: &str) -> bool {
        match self {
            Self::Apt => shell
                .run(&Syscall::new("dpkg-query").args(["-W", "-f=${Status}", package]))
                .map(|status| status.contains("install ok installed"))
                .unwrap_or(false),
            Self::Brew => shell
                .run(&Syscall::new("brew").args(["list", "--versions", package]))
                .map(|versions| !versions.trim().is_empty())
                .unwrap_or(false),
            Self::Dnf | Self::Zypper => shell.run(&Syscall::new("rpm").args(["-q", package])).is_ok(),
        }
    }

    /// Call that refreshes the package index.
    pub fn refresh_call(&self) -> Syscall {
        match self {
            Self::Apt => Syscall::new("apt-get").arg("update"),
            Self::Brew => Syscall::new("brew").arg("update"),
            Self::Dnf => Syscall::new("dnf").arg("makecache"),
            Self::Zypper => Syscall::new("zypper").args(["--non-interactive", "refresh"]),
        }
    }

    /// Call that installs listing of packages.
    pub fn install_call(&self, packages: &[String]) -> Syscall {
        let call = match self {
            Self::Apt => Syscall::new("apt-get").args(["install", "-y"]),
            Self::Brew => Syscall::new("brew").arg("install"),
            Self::Dnf => Syscall::new("dnf").args(["install", "-y"]),
            Self::Zypper => Syscall::new("zypper").args(["--non-interactive", "install"]),
        };
        call.args(packages.iter().cloned())
    }
}

impl Display for PackageManager {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(match self {
            Self::Apt => "apt",
            Self::Brew => "brew",
            Self::Dnf => "dnf",
            Self::Zypper => "zypper",
        })
    }
}

impl FromStr for PackageManager {
    type Err = PkgError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "apt" | "apt-get" => Ok(Self::Apt),
            "brew" | "homebrew" => Ok(Self::Brew),
            "dnf" => Ok(Self::Dnf),
            "zypper" => Ok(Self::Zypper),
            other => Err(PkgError::UnknownManager(other.into())),
        }
    }
}

/// What an installation run did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Packages that had to be installed.
    pub installed: Vec<String>,

    /// Packages that were already present.
    pub present: Vec<String>,
}

/// Package installer bound to a shell and package manager.
#[derive(Debug)]
pub struct Installer<'s, S: Shell> {
    shell: &'s S,
    manager: PackageManager,
    privilege: Privilege,
    dry_run: bool,
}

impl<'s, S: Shell> Installer<'s, S> {
    /// Construct new installer.
    pub fn new(shell: &'s S, manager: PackageManager, privilege: Privilege) -> Self {
        Self {
            shell,
            manager,
            privilege,
            dry_run: false,
        }
    }

    /// Only report what would be installed.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Install packages that are not yet installed.
    ///
    /// Privileges are checked before anything runs.
    ///
    /// # Errors
    ///
    /// - Return [`PkgError::Privilege`] if privileges are insufficient, or
    ///   Homebrew would run as root.
    /// - Return [`PkgError::Syscall`] if the package manager fails.
    #[instrument(skip(self, packages), level = "debug")]
    pub fn install(
        &self,
        packages: impl IntoIterator<Item = impl Into<String>>,
        refresh: bool,
    ) -> Result<InstallReport> {
        let action = format!("installing packages with {}", self.manager);
        let prepare = |call: Syscall| -> Result<Syscall> {
            if self.manager.needs_root() {
                Ok(self.privilege.elevate(call, &action)?)
            } else {
                self.privilege.forbid_root(&action)?;
                Ok(call)
            }
        };

        let mut report = InstallReport::default();
        for package in packages.into_iter().map(Into::into) {
            if self.manager.is_installed(self.shell, &package) {
                info!("{package} already installed");
                report.present.push(package);
            } else {
                report.installed.push(package);
            }
        }

        if report.installed.is_empty() {
            info!("nothing to install");
            return Ok(report);
        }

        let install = prepare(self.manager.install_call(&report.installed))?;
        let refresh = refresh
            .then(|| prepare(self.manager.refresh_call()))
            .transpose()?;

        if self.dry_run {
            info!("would run: {install}");
            return Ok(report);
        }

        if let Some(refresh) = refresh {
            info!("refresh package index");
            self.shell.run_interactive(&refresh)?;
        }

        info!("install {}", report.installed.join(", "));
        self.shell.run_interactive(&install)?;

        Ok(report)
    }
}

/// Package installation error types.
#[derive(Debug, thiserror::Error)]
pub enum PkgError {
    #[error("no supported package manager found (apt, brew, dnf, zypper)")]
    NoPackageManager,

    #[error("unknown package manager {0:?}")]
    UnknownManager(String),

    #[error(transparent)]
    Privilege(#[from] PrivilegeError),

    #[error("failed to run package manager")]
    Syscall(#[from] crate::syscall::Error),
}

/// Friendly result alias :3
pub type Result<T, E = PkgError> = std::result::Result<T, E>;
