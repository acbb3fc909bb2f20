//! Tests for runtime configuration patching and artifact URL construction.

mod common;

use common::{host_with_fixture, FakeRunner, SAMPLE_RUNTIME_CONFIG};
use nodeprep::config::RuntimeConfig;
use nodeprep::installer;

const PAUSE_IMAGE: &str = "registry.k8s.io/pause:3.9";

#[test]
fn patching_enables_cri_and_systemd_cgroups_and_pins_sandbox_image() {
    let patched = installer::patch_runtime_config(SAMPLE_RUNTIME_CONFIG, PAUSE_IMAGE);

    assert!(patched.contains("disabled_plugins = []"));
    assert!(!patched.contains("\"cri\""));
    assert!(patched.contains("SystemdCgroup = true"));
    assert!(!patched.contains("SystemdCgroup = false"));
    assert!(patched.contains("sandbox_image = \"registry.k8s.io/pause:3.9\""));
    assert!(!patched.contains("pause:3.8"));
}

#[test]
fn patching_preserves_indentation_of_replaced_lines() {
    let patched = installer::patch_runtime_config(SAMPLE_RUNTIME_CONFIG, PAUSE_IMAGE);
    assert!(patched.contains("            SystemdCgroup = true"));
    assert!(patched.contains("    sandbox_image = "));
}

#[test]
fn patching_an_already_patched_config_changes_nothing() {
    let once = installer::patch_runtime_config(SAMPLE_RUNTIME_CONFIG, PAUSE_IMAGE);
    let twice = installer::patch_runtime_config(&once, PAUSE_IMAGE);
    assert_eq!(once, twice);
}

#[test]
fn only_the_cri_entry_is_dropped_from_disabled_plugins() {
    let config = "disabled_plugins = [\"aufs\", \"cri\", \"zfs\"]\n";
    let patched = installer::patch_runtime_config(config, PAUSE_IMAGE);
    assert_eq!(patched, "disabled_plugins = [\"aufs\", \"zfs\"]\n");
}

#[test]
fn artifact_urls_embed_normalized_versions() {
    assert_eq!(
        installer::containerd_archive_url("1.7.22"),
        "https://github.com/containerd/containerd/releases/download/v1.7.22/containerd-1.7.22-linux-amd64.tar.gz"
    );
    assert_eq!(
        installer::runc_download_url("v1.1.12"),
        "https://github.com/opencontainers/runc/releases/download/v1.1.12/runc.amd64"
    );
    assert_eq!(
        installer::cni_archive_url("v1.5.1"),
        "https://github.com/containernetworking/plugins/releases/download/v1.5.1/cni-plugins-linux-amd64-v1.5.1.tgz"
    );
}

#[test]
fn configure_runtime_writes_patched_config_and_restarts_the_service() {
    let proc_dir = tempfile::tempdir().unwrap();
    let etc_dir = tempfile::tempdir().unwrap();
    let host = host_with_fixture(&proc_dir, &etc_dir);
    let runner = FakeRunner::new();
    let runtime_config = RuntimeConfig {
        sandbox_image: PAUSE_IMAGE.to_string(),
    };

    installer::configure_runtime(&runtime_config, &host, &runner).unwrap();

    let written = std::fs::read_to_string(host.containerd_config_path()).unwrap();
    assert!(written.contains("SystemdCgroup = true"));
    assert!(written.contains("disabled_plugins = []"));

    let recorded = runner.recorded();
    assert_eq!(
        recorded,
        vec!["containerd config default", "systemctl restart containerd"]
    );
}
