//! Tests for role-specific cluster bootstrap.

mod common;

use common::FakeRunner;
use nodeprep::bootstrap::{self, BootstrapOptions, OVERLAY_OPERATOR_URL, OVERLAY_RESOURCES_URL};
use nodeprep::config::{NodeConfig, NodeRole};
use nodeprep::ProvisionError;
use std::path::Path;

fn options(admin_conf: &Path, home: &Path) -> BootstrapOptions {
    BootstrapOptions {
        pod_network_cidr: "192.168.0.0/16".to_string(),
        admin_conf: admin_conf.to_path_buf(),
        credential_home: home.to_path_buf(),
        credential_owner: None,
    }
}

#[test]
fn worker_role_performs_no_cluster_mutation() {
    let home = tempfile::tempdir().unwrap();
    let node = NodeConfig {
        hostname: "node-a".to_string(),
        role: NodeRole::Worker,
    };
    let runner = FakeRunner::new();
    let opts = options(Path::new("/nonexistent/admin.conf"), home.path());

    bootstrap::run(&node, &runner, &opts).unwrap();

    assert!(runner.recorded().is_empty());
    assert!(!home.path().join(".kube/config").exists());
}

#[test]
fn control_plane_initialization_failure_stops_before_any_cluster_artifact() {
    let home = tempfile::tempdir().unwrap();
    let state = tempfile::tempdir().unwrap();
    let admin_conf = state.path().join("admin.conf");
    std::fs::write(&admin_conf, "apiVersion: v1\nkind: Config\n").unwrap();

    let node = NodeConfig {
        hostname: "node-a".to_string(),
        role: NodeRole::ControlPlane,
    };
    let runner = FakeRunner::failing_on("kubeadm init");
    let opts = options(&admin_conf, home.path());

    let err = bootstrap::run(&node, &runner, &opts).unwrap_err();
    assert!(matches!(err, ProvisionError::ExternalTool(_)));

    // Nothing past initialization may run: no credential copy, no overlay.
    assert_eq!(runner.recorded().len(), 1);
    assert!(!home.path().join(".kube/config").exists());
}

#[test]
fn control_plane_bootstrap_applies_overlay_manifests_in_order() {
    let home = tempfile::tempdir().unwrap();
    let state = tempfile::tempdir().unwrap();
    let admin_conf = state.path().join("admin.conf");
    std::fs::write(&admin_conf, "apiVersion: v1\nkind: Config\n").unwrap();

    let node = NodeConfig {
        hostname: "node-a".to_string(),
        role: NodeRole::ControlPlane,
    };
    let runner = FakeRunner::new();
    let mut opts = options(&admin_conf, home.path());
    opts.credential_owner = Some((1000, 1000));

    bootstrap::run(&node, &runner, &opts).unwrap();

    let recorded = runner.recorded();
    assert!(recorded[0].starts_with("kubeadm init --pod-network-cidr 192.168.0.0/16"));

    let operator_index = recorded
        .iter()
        .position(|l| l.contains(OVERLAY_OPERATOR_URL))
        .expect("operator manifest applied");
    let resources_index = recorded
        .iter()
        .position(|l| l.contains(OVERLAY_RESOURCES_URL))
        .expect("custom resources manifest applied");
    assert!(
        operator_index < resources_index,
        "operator must be applied before custom resources"
    );

    // Credential installed and ownership transferred to the invoking user
    let credential = home.path().join(".kube/config");
    assert!(credential.exists());
    assert!(recorded.iter().any(|l| l.starts_with("chown -R 1000:1000")));

    // Join command requested last
    assert!(recorded.last().unwrap().starts_with("kubeadm token create"));
}
