//! Orchestration agent toolchain installation.
//!
//! Adds the OS-appropriate, signed, track-specific package repository and
//! installs the agent (kubelet), the bootstrap CLI (kubeadm), and the
//! control CLI (kubectl), pinned against accidental upgrade. The agent must
//! stay in lockstep with the cluster's control-plane version; a silent
//! upgrade breaks compatibility.

use crate::error::{ProvisionError, Result};
use crate::fetch::Fetcher;
use crate::host::{path_arg, HostState, ToolRunner};
use crate::platform::{Apt, Dnf, OsFamily, PackageManager, PlatformProfile};

const AGENT_PACKAGES: &[&str] = &["kubelet", "kubeadm", "kubectl"];
const HELD_PACKAGES: &[&str] = &["kubelet", "kubeadm"];

/// Canonical keyring location referenced from the apt source definition.
const APT_KEYRING_PATH: &str = "/etc/apt/keyrings/kubernetes-apt-keyring.gpg";

pub fn deb_release_key_url(track: &str) -> String {
    format!("https://pkgs.k8s.io/core:/stable:/{track}/deb/Release.key")
}

pub fn apt_source_line(track: &str) -> String {
    format!(
        "deb [signed-by={APT_KEYRING_PATH}] https://pkgs.k8s.io/core:/stable:/{track}/deb/ /\n"
    )
}

pub fn yum_repo_definition(track: &str) -> String {
    format!(
        "[kubernetes]\n\
         name=Kubernetes\n\
         baseurl=https://pkgs.k8s.io/core:/stable:/{track}/rpm/\n\
         enabled=1\n\
         gpgcheck=1\n\
         gpgkey=https://pkgs.k8s.io/core:/stable:/{track}/rpm/repodata/repomd.xml.key\n\
         exclude=kubelet kubeadm kubectl cri-tools kubernetes-cni\n"
    )
}

/// Make the agent, bootstrap CLI, and control CLI available and running.
pub async fn install_agent(
    profile: &PlatformProfile,
    track: &str,
    host: &HostState,
    fetcher: &Fetcher,
    runner: &dyn ToolRunner,
) -> Result<()> {
    let pm: Box<dyn PackageManager> = match profile.os_family {
        OsFamily::DebianLike => {
            add_apt_repository(track, host, fetcher, runner).await?;
            Box::new(Apt)
        }
        OsFamily::RhelLike => {
            add_yum_repository(track, host)?;
            relax_selinux(host, runner)?;
            Box::new(Dnf)
        }
        OsFamily::Unsupported => {
            return Err(ProvisionError::UnsupportedPlatform(
                "cannot install the orchestration toolchain on an unrecognized OS family"
                    .to_string(),
            ))
        }
    };

    tracing::info!(
        "[Agent] Installing {} via {} (track {})",
        AGENT_PACKAGES.join(", "),
        pm.name(),
        track
    );
    pm.refresh(runner)?;
    pm.install(runner, AGENT_PACKAGES)?;
    pm.hold(runner, HELD_PACKAGES)?;

    // For workers the agent idles until join; for control-plane nodes the
    // init step brings it fully up.
    runner.run_checked("systemctl", &["enable", "--now", "kubelet"])?;
    tracing::info!("[Agent] Agent service enabled and started");
    Ok(())
}

async fn add_apt_repository(
    track: &str,
    host: &HostState,
    fetcher: &Fetcher,
    runner: &dyn ToolRunner,
) -> Result<()> {
    let keyring_path = host.apt_keyring_path();
    if let Some(parent) = keyring_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let staging = tempfile::tempdir()?;
    let key_file = staging.path().join("Release.key");
    fetcher.download(&deb_release_key_url(track), &key_file).await?;

    runner.run_checked(
        "gpg",
        &[
            "--dearmor",
            "--yes",
            "-o",
            &path_arg(&keyring_path),
            &path_arg(&key_file),
        ],
    )?;

    let source_path = host.apt_source_path();
    if let Some(parent) = source_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&source_path, apt_source_line(track))?;
    tracing::info!("[Agent] Added apt repository for track {}", track);
    Ok(())
}

fn add_yum_repository(track: &str, host: &HostState) -> Result<()> {
    let repo_path = host.yum_repo_path();
    if let Some(parent) = repo_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&repo_path, yum_repo_definition(track))?;
    tracing::info!("[Agent] Added rpm repository for track {}", track);
    Ok(())
}

/// Relax mandatory access control to permissive mode, persistently.
///
/// The agent cannot run under enforcing mode on RHEL-like hosts; this is a
/// host-security trade-off the operator accepts by provisioning the node.
pub fn relax_selinux(host: &HostState, runner: &dyn ToolRunner) -> Result<()> {
    let output = runner.run("setenforce", &["0"])?;
    if !output.success() {
        // Non-fatal: SELinux may already be permissive or disabled
        tracing::warn!(
            "[Agent] setenforce 0 returned non-zero: {}",
            output.stderr.trim()
        );
    }

    let config_path = host.selinux_config_path();
    if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)?;
        let updated = content.replace("SELINUX=enforcing", "SELINUX=permissive");
        if updated != content {
            std::fs::write(&config_path, updated)?;
            tracing::info!("[Agent] SELinux set to permissive in {:?}", config_path);
        }
    }
    Ok(())
}
