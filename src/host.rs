//! Host state queries and the external-tool boundary.
//!
//! The only state this pipeline persists is the live filesystem and
//! service-manager state of the machine. `HostState` gives the pipeline an
//! explicit query surface over that state so idempotence checks are real
//! contracts instead of incidental shell-command behavior. The filesystem
//! roots are injectable so the queries can be exercised against fixtures.

use crate::error::{ProvisionError, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Captured output of an external tool invocation.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Boundary around external process invocation.
///
/// Every package-manager and cluster-tooling call goes through this trait so
/// failure handling is uniform and the boundary can be faked in tests.
pub trait ToolRunner: Send + Sync {
    /// Run a program and capture its output. A non-zero exit is not an error
    /// at this level; use [`ToolRunner::run_checked`] for that.
    fn run(&self, program: &str, args: &[&str]) -> Result<ToolOutput>;

    /// Run a program, mapping a non-zero exit to [`ProvisionError::ExternalTool`].
    fn run_checked(&self, program: &str, args: &[&str]) -> Result<ToolOutput> {
        let output = self.run(program, args)?;
        if !output.success() {
            let last_line = output.stderr.lines().last().unwrap_or("no output");
            return Err(ProvisionError::ExternalTool(format!(
                "`{} {}` failed (exit {}): {}",
                program,
                args.join(" "),
                output.exit_code,
                last_line
            )));
        }
        Ok(output)
    }
}

/// Runs tools directly on the host.
pub struct SystemRunner;

impl ToolRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<ToolOutput> {
        tracing::debug!("[SystemRunner] {} {}", program, args.join(" "));
        let output = Command::new(program).args(args).output().map_err(|e| {
            ProvisionError::ExternalTool(format!("failed to spawn `{}`: {}", program, e))
        })?;
        Ok(ToolOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Query surface over the host's filesystem-resident state.
pub struct HostState {
    proc_root: PathBuf,
    etc_root: PathBuf,
}

impl HostState {
    pub fn new() -> Self {
        Self::with_roots("/proc", "/etc")
    }

    /// Build a `HostState` over alternate filesystem roots.
    pub fn with_roots(proc_root: impl Into<PathBuf>, etc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
            etc_root: etc_root.into(),
        }
    }

    pub fn effective_uid(&self) -> u32 {
        unsafe { nix::libc::geteuid() }
    }

    pub fn is_root(&self) -> bool {
        self.effective_uid() == 0
    }

    pub fn cpu_count(&self) -> Result<usize> {
        let content = std::fs::read_to_string(self.proc_root.join("cpuinfo"))?;
        Ok(parse_cpu_count(&content))
    }

    pub fn memory_kib(&self) -> Result<u64> {
        let content = std::fs::read_to_string(self.proc_root.join("meminfo"))?;
        parse_mem_total_kib(&content).ok_or_else(|| {
            ProvisionError::Configuration("cannot determine memory size from meminfo".to_string())
        })
    }

    /// Whether any swap device or file is currently active.
    pub fn swap_active(&self) -> Result<bool> {
        let content = std::fs::read_to_string(self.proc_root.join("swaps"))?;
        // First line is the column header
        Ok(content.lines().skip(1).any(|l| !l.trim().is_empty()))
    }

    /// Runtime value of the IPv4 forwarding kernel parameter.
    pub fn ip_forward_enabled(&self) -> Result<bool> {
        let path = self.proc_root.join("sys/net/ipv4/ip_forward");
        let content = std::fs::read_to_string(path)?;
        Ok(content.trim() == "1")
    }

    pub fn fstab_path(&self) -> PathBuf {
        self.etc_root.join("fstab")
    }

    pub fn sysctl_dropin_path(&self) -> PathBuf {
        self.etc_root.join("sysctl.d/99-nodeprep.conf")
    }

    pub fn os_release_path(&self) -> PathBuf {
        self.etc_root.join("os-release")
    }

    pub fn debian_marker_path(&self) -> PathBuf {
        self.etc_root.join("debian_version")
    }

    pub fn redhat_marker_path(&self) -> PathBuf {
        self.etc_root.join("redhat-release")
    }

    pub fn selinux_config_path(&self) -> PathBuf {
        self.etc_root.join("selinux/config")
    }

    pub fn apt_keyring_path(&self) -> PathBuf {
        self.etc_root.join("apt/keyrings/kubernetes-apt-keyring.gpg")
    }

    pub fn apt_source_path(&self) -> PathBuf {
        self.etc_root.join("apt/sources.list.d/kubernetes.list")
    }

    pub fn yum_repo_path(&self) -> PathBuf {
        self.etc_root.join("yum.repos.d/kubernetes.repo")
    }

    pub fn systemd_unit_path(&self, unit: &str) -> PathBuf {
        self.etc_root.join("systemd/system").join(unit)
    }

    pub fn containerd_config_path(&self) -> PathBuf {
        self.etc_root.join("containerd/config.toml")
    }

    /// Whether `name` resolves to an existing file on the execution path.
    ///
    /// `/usr/local/bin` and `/usr/local/sbin` are always searched: freshly
    /// extracted binaries land there and the provisioning environment's PATH
    /// (e.g. under sudo) does not always include them.
    pub fn binary_on_path(&self, name: &str) -> bool {
        let mut dirs: Vec<PathBuf> = std::env::var_os("PATH")
            .map(|p| std::env::split_paths(&p).collect())
            .unwrap_or_default();
        dirs.push(PathBuf::from("/usr/local/bin"));
        dirs.push(PathBuf::from("/usr/local/sbin"));
        find_binary_in(&dirs, name).is_some()
    }
}

impl Default for HostState {
    fn default() -> Self {
        Self::new()
    }
}

/// Count `processor` entries in cpuinfo content.
pub fn parse_cpu_count(cpuinfo: &str) -> usize {
    cpuinfo
        .lines()
        .filter(|l| l.starts_with("processor"))
        .count()
}

/// Extract the `MemTotal` value (in KiB) from meminfo content.
pub fn parse_mem_total_kib(meminfo: &str) -> Option<u64> {
    meminfo
        .lines()
        .find(|l| l.starts_with("MemTotal:"))
        .and_then(|l| l.split_whitespace().nth(1))
        .and_then(|v| v.parse().ok())
}

/// Find the first existing file named `name` in `dirs`.
pub fn find_binary_in(dirs: &[PathBuf], name: &str) -> Option<PathBuf> {
    dirs.iter()
        .map(|d| d.join(name))
        .find(|candidate| candidate.is_file())
}

/// Convenience for passing paths to external tools.
pub fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
