//! Node and pipeline configuration.
//!
//! The node identity comes from the command line and is immutable for the
//! whole run. Optional pipeline settings (version pins, pod network CIDR,
//! sandbox image) are loaded from `nodeprep.toml`.

use crate::error::{ProvisionError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Role this node takes in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    ControlPlane,
    Worker,
}

/// Resolved invocation input, owned by the pipeline for its whole run.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub hostname: String,
    pub role: NodeRole,
}

/// Pipeline settings loaded from `nodeprep.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvisionConfig {
    #[serde(default)]
    pub versions: VersionPins,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub runtime: RuntimeConfig,
}

impl ProvisionConfig {
    /// Load configuration, falling back to defaults when no file is present.
    pub fn load() -> Result<Self> {
        let config_paths = [
            PathBuf::from("nodeprep.toml"),
            PathBuf::from("/etc/nodeprep.toml"),
        ];

        for path in config_paths {
            if path.exists() {
                let content = std::fs::read_to_string(&path)?;
                let config: ProvisionConfig = toml::from_str(&content).map_err(|e| {
                    ProvisionError::Configuration(format!(
                        "failed to parse config file {:?}: {}",
                        path, e
                    ))
                })?;
                tracing::info!("Loaded provisioning config from {:?}", path);
                return Ok(config);
            }
        }

        tracing::debug!("No nodeprep.toml found, using defaults");
        Ok(Self::default())
    }
}

/// Optional per-component version pins.
///
/// A pinned component skips its upstream "latest" query entirely, making the
/// run reproducible for that component. Unpinned components re-resolve on
/// every invocation.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VersionPins {
    pub container_runtime: Option<String>,
    pub low_level_runtime: Option<String>,
    pub network_plugins: Option<String>,
    pub orchestration_track: Option<String>,
}

/// Cluster network settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_pod_network_cidr")]
    pub pod_network_cidr: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            pod_network_cidr: default_pod_network_cidr(),
        }
    }
}

fn default_pod_network_cidr() -> String {
    "192.168.0.0/16".to_string()
}

/// Container runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Sandbox (pause) image pinned into the runtime configuration. The
    /// agent and the runtime must agree on this reference.
    #[serde(default = "default_sandbox_image")]
    pub sandbox_image: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            sandbox_image: default_sandbox_image(),
        }
    }
}

fn default_sandbox_image() -> String {
    "registry.k8s.io/pause:3.9".to_string()
}
