//! Container runtime stack installation.
//!
//! Downloads, places, and activates the container runtime, the low-level
//! runtime, and the network plugin set for the resolved versions. Downloads
//! are staged in a temporary directory; placements go to the fixed system
//! locations the service definitions expect.

use crate::config::RuntimeConfig;
use crate::error::{ProvisionError, Result};
use crate::fetch::Fetcher;
use crate::host::{path_arg, HostState, ToolRunner};
use crate::platform::{Arch, PlatformProfile};
use crate::versions::ResolvedVersions;
use std::path::Path;

const INSTALL_PREFIX: &str = "/usr/local";
const RUNC_INSTALL_PATH: &str = "/usr/local/sbin/runc";
const CNI_BIN_DIR: &str = "/opt/cni/bin";
const CONTAINERD_SERVICE_URL: &str =
    "https://raw.githubusercontent.com/containerd/containerd/main/containerd.service";

pub fn containerd_archive_url(version: &str) -> String {
    format!(
        "https://github.com/containerd/containerd/releases/download/v{version}/containerd-{version}-linux-amd64.tar.gz"
    )
}

pub fn runc_download_url(tag: &str) -> String {
    format!("https://github.com/opencontainers/runc/releases/download/{tag}/runc.amd64")
}

pub fn cni_archive_url(tag: &str) -> String {
    format!(
        "https://github.com/containernetworking/plugins/releases/download/{tag}/cni-plugins-linux-amd64-{tag}.tgz"
    )
}

/// Fetch, place, and activate the runtime stack.
///
/// Unsupported architecture is fatal here: the archives above are the only
/// published form of these components and there is no generic fallback.
pub async fn install_runtime_stack(
    profile: &PlatformProfile,
    versions: &ResolvedVersions,
    runtime_config: &RuntimeConfig,
    host: &HostState,
    fetcher: &Fetcher,
    runner: &dyn ToolRunner,
) -> Result<()> {
    if profile.arch != Arch::X86_64 {
        return Err(ProvisionError::UnsupportedPlatform(
            "runtime binary archives are published for x86-64 only".to_string(),
        ));
    }

    let staging = tempfile::tempdir()?;

    install_containerd(versions, staging.path(), host, fetcher).await?;
    install_service_unit(host, fetcher, runner).await?;
    install_runc(versions, staging.path(), fetcher).await?;
    install_cni_plugins(versions, staging.path(), fetcher).await?;
    configure_runtime(runtime_config, host, runner)?;

    Ok(())
}

async fn install_containerd(
    versions: &ResolvedVersions,
    staging: &Path,
    host: &HostState,
    fetcher: &Fetcher,
) -> Result<()> {
    let url = containerd_archive_url(&versions.container_runtime);
    tracing::info!("[Installer] Downloading container runtime from {}", url);

    let archive = staging.join("containerd.tar.gz");
    fetcher.download(&url, &archive).await?;

    tracing::info!("[Installer] Extracting container runtime to {}", INSTALL_PREFIX);
    extract_tar_gz(&archive, Path::new(INSTALL_PREFIX))?;

    // Transient network or archive corruption shows up here; re-running the
    // pipeline is the recovery path, not an in-step retry of the extraction.
    if !host.binary_on_path("containerd") {
        return Err(ProvisionError::Installation(
            "containerd binary is not resolvable on the execution path after extraction"
                .to_string(),
        ));
    }
    Ok(())
}

/// Install and start the runtime's service unit. This must happen before
/// configuration generation, which invokes the runtime binary itself.
async fn install_service_unit(
    host: &HostState,
    fetcher: &Fetcher,
    runner: &dyn ToolRunner,
) -> Result<()> {
    let unit = fetcher.get_text(CONTAINERD_SERVICE_URL).await?;
    let unit_path = host.systemd_unit_path("containerd.service");
    if let Some(parent) = unit_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&unit_path, unit)?;

    runner.run_checked("systemctl", &["daemon-reload"])?;
    runner.run_checked("systemctl", &["enable", "--now", "containerd"])?;
    tracing::info!("[Installer] Container runtime service enabled and started");
    Ok(())
}

async fn install_runc(
    versions: &ResolvedVersions,
    staging: &Path,
    fetcher: &Fetcher,
) -> Result<()> {
    let url = runc_download_url(&versions.low_level_runtime);
    tracing::info!("[Installer] Downloading low-level runtime from {}", url);

    let download = staging.join("runc.amd64");
    fetcher.download(&url, &download).await?;

    let dest = Path::new(RUNC_INSTALL_PATH);
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(&download, dest)?;

    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(dest, std::fs::Permissions::from_mode(0o755))?;
    tracing::info!("[Installer] Low-level runtime installed at {}", RUNC_INSTALL_PATH);
    Ok(())
}

async fn install_cni_plugins(
    versions: &ResolvedVersions,
    staging: &Path,
    fetcher: &Fetcher,
) -> Result<()> {
    let url = cni_archive_url(&versions.network_plugins);
    tracing::info!("[Installer] Downloading network plugins from {}", url);

    let archive = staging.join("cni-plugins.tgz");
    fetcher.download(&url, &archive).await?;

    std::fs::create_dir_all(CNI_BIN_DIR)?;
    extract_tar_gz(&archive, Path::new(CNI_BIN_DIR))?;
    tracing::info!("[Installer] Network plugins extracted to {}", CNI_BIN_DIR);
    Ok(())
}

/// Generate the default runtime configuration, patch it, and restart the
/// service so the patched configuration takes effect.
pub fn configure_runtime(
    runtime_config: &RuntimeConfig,
    host: &HostState,
    runner: &dyn ToolRunner,
) -> Result<()> {
    let config_path = host.containerd_config_path();
    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let default_config = runner.run_checked("containerd", &["config", "default"])?.stdout;
    let patched = patch_runtime_config(&default_config, &runtime_config.sandbox_image);
    std::fs::write(&config_path, patched)?;

    runner.run_checked("systemctl", &["restart", "containerd"])?;
    tracing::info!(
        "[Installer] Runtime configuration written to {} and service restarted",
        path_arg(&config_path)
    );
    Ok(())
}

/// Apply the three required patches to a default runtime configuration:
/// re-enable the CRI plugin (shipped disabled), switch the cgroup driver to
/// systemd mode (the agent and the runtime must agree on cgroup management),
/// and pin the sandbox image. Applying the patches to an already-patched
/// configuration changes nothing.
pub fn patch_runtime_config(config: &str, sandbox_image: &str) -> String {
    let mut out = String::with_capacity(config.len());
    for line in config.lines() {
        let trimmed = line.trim_start();
        let indent = &line[..line.len() - trimmed.len()];

        if trimmed.starts_with("disabled_plugins") && trimmed.contains('[') {
            out.push_str(indent);
            out.push_str(&enable_cri_plugin(trimmed));
        } else if trimmed == "SystemdCgroup = false" {
            out.push_str(indent);
            out.push_str("SystemdCgroup = true");
        } else if trimmed.starts_with("sandbox_image =") {
            out.push_str(indent);
            out.push_str(&format!("sandbox_image = \"{}\"", sandbox_image));
        } else {
            out.push_str(line);
        }
        out.push('\n');
    }
    out
}

/// Drop the CRI plugin from a `disabled_plugins = [...]` line.
fn enable_cri_plugin(line: &str) -> String {
    let open = match line.find('[') {
        Some(i) => i,
        None => return line.to_string(),
    };
    let close = match line.rfind(']') {
        Some(i) if i > open => i,
        _ => return line.to_string(),
    };

    let kept: Vec<&str> = line[open + 1..close]
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter(|entry| {
            let name = entry.trim_matches(|c| c == '"' || c == '\'');
            name != "cri" && name != "io.containerd.grpc.v1.cri"
        })
        .collect();

    format!("{}[{}]{}", &line[..open], kept.join(", "), &line[close + 1..])
}

/// Extract a gzip-compressed tar archive into `dest`.
pub fn extract_tar_gz(archive: &Path, dest: &Path) -> Result<()> {
    let file = std::fs::File::open(archive)?;
    let tar = flate2::read::GzDecoder::new(file);
    let mut archive = tar::Archive::new(tar);
    archive.unpack(dest)?;
    Ok(())
}
