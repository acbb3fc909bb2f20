//! Role-specific cluster bootstrap.
//!
//! Control-plane nodes run cluster initialization, install the admin
//! credential for the invoking user, deploy the network overlay, and emit a
//! join command. Worker nodes perform no cluster mutation; the join itself
//! needs a token minted on the control plane and happens in a separate
//! invocation.

use crate::config::{NodeConfig, NodeRole};
use crate::error::{ProvisionError, Result};
use crate::host::{path_arg, ToolRunner};
use std::path::PathBuf;

const ADMIN_CONF_PATH: &str = "/etc/kubernetes/admin.conf";

/// Network overlay manifests. The custom resources depend on the operator's
/// controllers being registered, so the apply order is a hard requirement.
pub const OVERLAY_OPERATOR_URL: &str =
    "https://raw.githubusercontent.com/projectcalico/calico/v3.28.0/manifests/tigera-operator.yaml";
pub const OVERLAY_RESOURCES_URL: &str =
    "https://raw.githubusercontent.com/projectcalico/calico/v3.28.0/manifests/custom-resources.yaml";

/// Inputs for the bootstrap stage.
#[derive(Debug, Clone)]
pub struct BootstrapOptions {
    pub pod_network_cidr: String,
    /// Source of the admin credential written by cluster initialization.
    pub admin_conf: PathBuf,
    /// Home directory receiving the credential copy.
    pub credential_home: PathBuf,
    /// `uid:gid` to transfer credential ownership to, when the invoking
    /// user is recorded.
    pub credential_owner: Option<(u32, u32)>,
}

impl BootstrapOptions {
    /// Resolve the credential target from the environment: the original
    /// invoking user when running under sudo, the current user otherwise.
    pub fn from_env(pod_network_cidr: String) -> Self {
        let (credential_home, credential_owner) = invoking_user();
        Self {
            pod_network_cidr,
            admin_conf: PathBuf::from(ADMIN_CONF_PATH),
            credential_home,
            credential_owner,
        }
    }
}

/// Home directory and ownership ids of the invoking user.
fn invoking_user() -> (PathBuf, Option<(u32, u32)>) {
    let fallback = || dirs::home_dir().unwrap_or_else(|| PathBuf::from("/root"));

    let home = match std::env::var("SUDO_USER") {
        Ok(user) if user != "root" => {
            let candidate = PathBuf::from("/home").join(&user);
            if candidate.is_dir() {
                candidate
            } else {
                fallback()
            }
        }
        _ => fallback(),
    };

    let owner = match (std::env::var("SUDO_UID"), std::env::var("SUDO_GID")) {
        (Ok(uid), Ok(gid)) => match (uid.parse(), gid.parse()) {
            (Ok(uid), Ok(gid)) => Some((uid, gid)),
            _ => None,
        },
        _ => None,
    };

    (home, owner)
}

/// Branch on the node role. One-shot: a failed run has no resume state and
/// must be re-run from the start.
pub fn run(config: &NodeConfig, runner: &dyn ToolRunner, opts: &BootstrapOptions) -> Result<()> {
    match config.role {
        NodeRole::ControlPlane => init_control_plane(runner, opts),
        NodeRole::Worker => {
            tracing::info!("[Bootstrap] Worker node prepared; no cluster mutation performed");
            println!("This node is ready to join the cluster.");
            println!(
                "Run the `kubeadm join ...` command issued by the control-plane node to complete the join."
            );
            Ok(())
        }
    }
}

fn init_control_plane(runner: &dyn ToolRunner, opts: &BootstrapOptions) -> Result<()> {
    tracing::info!(
        "[Bootstrap] Initializing control plane (pod network {})",
        opts.pod_network_cidr
    );
    // Fatal on failure: init is not safely re-runnable without a reset step,
    // which this pipeline does not provide.
    runner.run_checked(
        "kubeadm",
        &["init", "--pod-network-cidr", &opts.pod_network_cidr],
    )?;

    install_admin_credential(runner, opts)?;
    deploy_network_overlay(runner, opts)?;

    let join_command = issue_join_command(runner)?;
    println!("To join worker nodes to this cluster, run on each of them:");
    println!("  {}", join_command);
    tracing::info!("[Bootstrap] Control plane initialized");
    Ok(())
}

fn install_admin_credential(runner: &dyn ToolRunner, opts: &BootstrapOptions) -> Result<()> {
    let kube_dir = opts.credential_home.join(".kube");
    std::fs::create_dir_all(&kube_dir)?;

    let dest = kube_dir.join("config");
    std::fs::copy(&opts.admin_conf, &dest)?;

    if let Some((uid, gid)) = opts.credential_owner {
        runner.run_checked(
            "chown",
            &["-R", &format!("{}:{}", uid, gid), &path_arg(&kube_dir)],
        )?;
    }

    tracing::info!("[Bootstrap] Admin credential installed at {}", path_arg(&dest));
    Ok(())
}

fn deploy_network_overlay(runner: &dyn ToolRunner, opts: &BootstrapOptions) -> Result<()> {
    tracing::info!("[Bootstrap] Deploying network overlay (operator, then custom resources)");
    let kubeconfig = path_arg(&opts.admin_conf);

    runner.run_checked(
        "kubectl",
        &["--kubeconfig", &kubeconfig, "create", "-f", OVERLAY_OPERATOR_URL],
    )?;
    runner.run_checked(
        "kubectl",
        &["--kubeconfig", &kubeconfig, "create", "-f", OVERLAY_RESOURCES_URL],
    )?;
    Ok(())
}

/// Request a fresh join command. Tokens are short-lived and re-derivable on
/// demand, so the command is printed rather than persisted.
fn issue_join_command(runner: &dyn ToolRunner) -> Result<String> {
    let output = runner.run_checked("kubeadm", &["token", "create", "--print-join-command"])?;
    let join_command = output.stdout.trim().to_string();
    if join_command.is_empty() {
        return Err(ProvisionError::ExternalTool(
            "`kubeadm token create` produced an empty join command".to_string(),
        ));
    }
    Ok(join_command)
}
