//! OS family and architecture detection.
//!
//! Detection runs exactly once; every later stage selects its code path from
//! the resulting profile and never re-probes the OS.

use crate::error::Result;
use crate::host::{HostState, ToolRunner};

/// Supported OS families, keyed by their package-manager strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    DebianLike,
    RhelLike,
    Unsupported,
}

/// CPU architecture. Binary artifacts are published for x86-64 only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    X86_64,
    Other,
}

/// Platform profile derived once by detection and read-only afterwards.
#[derive(Debug, Clone, Copy)]
pub struct PlatformProfile {
    pub os_family: OsFamily,
    pub arch: Arch,
}

/// Detect the platform profile. No side effects.
pub fn detect(host: &HostState, runner: &dyn ToolRunner) -> Result<PlatformProfile> {
    let os_family = detect_os_family(host)?;
    let uname = runner.run_checked("uname", &["-m"])?;
    let arch = parse_machine_arch(uname.stdout.trim());

    tracing::info!("[Platform] Detected {:?} / {:?}", os_family, arch);
    Ok(PlatformProfile { os_family, arch })
}

fn detect_os_family(host: &HostState) -> Result<OsFamily> {
    let os_release = host.os_release_path();
    if os_release.exists() {
        let content = std::fs::read_to_string(&os_release)?;
        return Ok(parse_os_release(&content));
    }

    // Secondary marker files for minimal images without an os-release
    if host.debian_marker_path().exists() {
        return Ok(OsFamily::DebianLike);
    }
    if host.redhat_marker_path().exists() {
        return Ok(OsFamily::RhelLike);
    }
    Ok(OsFamily::Unsupported)
}

/// Classify an os-release document by its `ID` and `ID_LIKE` fields.
pub fn parse_os_release(content: &str) -> OsFamily {
    let mut ids: Vec<String> = Vec::new();
    for line in content.lines() {
        let value = match line.split_once('=') {
            Some(("ID", v)) | Some(("ID_LIKE", v)) => v,
            _ => continue,
        };
        let value = value.trim().trim_matches('"');
        ids.extend(value.split_whitespace().map(|s| s.to_ascii_lowercase()));
    }

    const DEBIAN_IDS: &[&str] = &["debian", "ubuntu", "raspbian"];
    const RHEL_IDS: &[&str] = &["rhel", "centos", "fedora", "rocky", "almalinux", "ol"];

    if ids.iter().any(|id| DEBIAN_IDS.contains(&id.as_str())) {
        OsFamily::DebianLike
    } else if ids.iter().any(|id| RHEL_IDS.contains(&id.as_str())) {
        OsFamily::RhelLike
    } else {
        OsFamily::Unsupported
    }
}

/// Classify a `uname -m` machine string.
pub fn parse_machine_arch(machine: &str) -> Arch {
    match machine {
        "x86_64" | "amd64" => Arch::X86_64,
        _ => Arch::Other,
    }
}

/// Package installation capability, one implementation per supported family.
pub trait PackageManager: Send + Sync {
    fn name(&self) -> &'static str;

    /// Refresh package metadata.
    fn refresh(&self, runner: &dyn ToolRunner) -> Result<()>;

    /// Install packages.
    fn install(&self, runner: &dyn ToolRunner, packages: &[&str]) -> Result<()>;

    /// Pin packages at their installed version.
    fn hold(&self, runner: &dyn ToolRunner, packages: &[&str]) -> Result<()>;
}

pub struct Apt;

impl PackageManager for Apt {
    fn name(&self) -> &'static str {
        "apt"
    }

    fn refresh(&self, runner: &dyn ToolRunner) -> Result<()> {
        runner.run_checked("apt-get", &["update"])?;
        Ok(())
    }

    fn install(&self, runner: &dyn ToolRunner, packages: &[&str]) -> Result<()> {
        let mut args = vec!["install", "-y"];
        args.extend_from_slice(packages);
        runner.run_checked("apt-get", &args)?;
        Ok(())
    }

    fn hold(&self, runner: &dyn ToolRunner, packages: &[&str]) -> Result<()> {
        let mut args = vec!["hold"];
        args.extend_from_slice(packages);
        runner.run_checked("apt-mark", &args)?;
        Ok(())
    }
}

pub struct Dnf;

impl PackageManager for Dnf {
    fn name(&self) -> &'static str {
        "dnf"
    }

    fn refresh(&self, runner: &dyn ToolRunner) -> Result<()> {
        runner.run_checked("dnf", &["-y", "makecache"])?;
        Ok(())
    }

    fn install(&self, runner: &dyn ToolRunner, packages: &[&str]) -> Result<()> {
        let mut args = vec!["-y", "install", "--disableexcludes=kubernetes"];
        args.extend_from_slice(packages);
        runner.run_checked("dnf", &args)?;
        Ok(())
    }

    fn hold(&self, _runner: &dyn ToolRunner, _packages: &[&str]) -> Result<()> {
        // Version pinning comes from the repo file's exclude list; installs
        // opt in explicitly with --disableexcludes.
        Ok(())
    }
}
