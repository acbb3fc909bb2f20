//! Host prerequisite validation and kernel/network preparation.

use crate::config::NodeConfig;
use crate::error::{ProvisionError, Result};
use crate::host::{HostState, ToolRunner};

const MIN_CPU_CORES: usize = 2;
const MIN_MEMORY_KIB: u64 = 2 * 1024 * 1024; // 2 GiB

/// Validate the execution context and apply host-level prerequisites.
///
/// The privilege check runs before any mutation; the resource check runs
/// before any install step so unsuitable hardware never receives a partial
/// install.
pub fn run(config: &NodeConfig, host: &HostState, runner: &dyn ToolRunner) -> Result<()> {
    ensure_privileged(host)?;
    apply(config, host, runner)
}

/// The mutating preflight stages, past the privilege gate.
pub fn apply(config: &NodeConfig, host: &HostState, runner: &dyn ToolRunner) -> Result<()> {
    apply_hostname(config, runner)?;
    ensure_resources(host)?;
    disable_swap(host, runner)?;
    enable_ip_forwarding(host, runner)?;
    Ok(())
}

pub fn ensure_privileged(host: &HostState) -> Result<()> {
    if !host.is_root() {
        return Err(ProvisionError::Permission(
            "provisioning must run with root privileges".to_string(),
        ));
    }
    Ok(())
}

/// Set the system hostname. Re-applying the same name is a no-op at the
/// tool level.
pub fn apply_hostname(config: &NodeConfig, runner: &dyn ToolRunner) -> Result<()> {
    tracing::info!("[Preflight] Setting hostname to {}", config.hostname);
    runner.run_checked("hostnamectl", &["set-hostname", &config.hostname])?;
    Ok(())
}

pub fn ensure_resources(host: &HostState) -> Result<()> {
    let cpus = host.cpu_count()?;
    if cpus < MIN_CPU_CORES {
        return Err(ProvisionError::Resource(format!(
            "{} CPU core(s) available, {} required",
            cpus, MIN_CPU_CORES
        )));
    }

    let memory_kib = host.memory_kib()?;
    if memory_kib < MIN_MEMORY_KIB {
        return Err(ProvisionError::Resource(format!(
            "{} KiB memory available, {} KiB required",
            memory_kib, MIN_MEMORY_KIB
        )));
    }

    tracing::info!(
        "[Preflight] Resources OK: {} CPU cores, {} KiB memory",
        cpus,
        memory_kib
    );
    Ok(())
}

/// Disable active swap and keep it disabled across reboots.
///
/// The orchestration agent refuses to run with swap enabled, so this is a
/// hard precondition rather than a warning.
pub fn disable_swap(host: &HostState, runner: &dyn ToolRunner) -> Result<()> {
    if host.swap_active()? {
        tracing::info!("[Preflight] Disabling active swap");
        runner.run_checked("swapoff", &["-a"])?;
    } else {
        tracing::debug!("[Preflight] No active swap");
    }

    let fstab_path = host.fstab_path();
    if fstab_path.exists() {
        let content = std::fs::read_to_string(&fstab_path)?;
        let updated = comment_swap_entries(&content);
        if updated != content {
            tracing::info!("[Preflight] Commenting swap entries in {:?}", fstab_path);
            std::fs::write(&fstab_path, updated)?;
        }
    }
    Ok(())
}

/// Comment out uncommented swap entries in fstab content.
pub fn comment_swap_entries(fstab: &str) -> String {
    let mut out = String::with_capacity(fstab.len());
    for line in fstab.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let is_swap_entry =
            !line.trim_start().starts_with('#') && fields.len() >= 3 && fields[2] == "swap";
        if is_swap_entry {
            out.push('#');
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Enable IPv4 forwarding via a persisted kernel-parameter drop-in and
/// verify the runtime value actually took effect.
///
/// The reload can succeed while silently not applying the write (conflicting
/// drop-in files), so the verification read is mandatory.
pub fn enable_ip_forwarding(host: &HostState, runner: &dyn ToolRunner) -> Result<()> {
    let dropin = host.sysctl_dropin_path();
    if let Some(parent) = dropin.parent() {
        std::fs::create_dir_all(parent)?;
    }
    // Overwrite rather than append: the drop-in always holds exactly one entry
    std::fs::write(&dropin, "net.ipv4.ip_forward = 1\n")?;

    runner.run_checked("sysctl", &["--system"])?;

    if !host.ip_forward_enabled()? {
        return Err(ProvisionError::Configuration(
            "net.ipv4.ip_forward is not enabled after kernel parameter reload".to_string(),
        ));
    }
    tracing::info!("[Preflight] IPv4 forwarding enabled");
    Ok(())
}
