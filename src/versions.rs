//! Resolution of symbolic "latest stable" references to concrete versions.
//!
//! All four sources must resolve to a well-formed tag before any download
//! starts; partial resolution aborts the pipeline naming the failed source.

use crate::config::VersionPins;
use crate::error::{ProvisionError, Result};
use crate::fetch::Fetcher;

const CONTAINERD_RELEASES_URL: &str =
    "https://api.github.com/repos/containerd/containerd/releases/latest";
const RUNC_RELEASES_URL: &str =
    "https://api.github.com/repos/opencontainers/runc/releases/latest";
const CNI_PLUGINS_RELEASES_URL: &str =
    "https://api.github.com/repos/containernetworking/plugins/releases/latest";
const K8S_STABLE_URL: &str = "https://dl.k8s.io/release/stable.txt";

/// Concrete version identifiers, immutable inputs to installation.
#[derive(Debug, Clone)]
pub struct ResolvedVersions {
    /// Container runtime semver, without the leading `v` (archive URLs embed
    /// the bare version).
    pub container_runtime: String,
    /// Low-level runtime release tag, `v` prefix kept.
    pub low_level_runtime: String,
    /// Network plugin set release tag, `v` prefix kept.
    pub network_plugins: String,
    /// Orchestration release track, reduced to `v<major>.<minor>`.
    pub orchestration_track: String,
}

/// Resolve all component versions. Pinned components skip their upstream
/// query; unpinned components resolve to the latest release on every run.
pub async fn resolve(fetcher: &Fetcher, pins: &VersionPins) -> Result<ResolvedVersions> {
    let containerd_tag = match &pins.container_runtime {
        Some(pin) => pinned("containerd", pin),
        None => latest_release_tag(fetcher, "containerd", CONTAINERD_RELEASES_URL).await?,
    };
    let runc_tag = match &pins.low_level_runtime {
        Some(pin) => pinned("runc", pin),
        None => latest_release_tag(fetcher, "runc", RUNC_RELEASES_URL).await?,
    };
    let cni_tag = match &pins.network_plugins {
        Some(pin) => pinned("cni-plugins", pin),
        None => latest_release_tag(fetcher, "cni-plugins", CNI_PLUGINS_RELEASES_URL).await?,
    };
    let k8s_version = match &pins.orchestration_track {
        Some(pin) => pinned("kubernetes", pin),
        None => stable_orchestration_version(fetcher).await?,
    };

    let resolved = ResolvedVersions {
        container_runtime: strip_v_prefix(&validate_tag("containerd", &containerd_tag)?),
        low_level_runtime: validate_tag("runc", &runc_tag)?,
        network_plugins: validate_tag("cni-plugins", &cni_tag)?,
        orchestration_track: release_track(&validate_tag("kubernetes", &k8s_version)?)?,
    };

    tracing::info!(
        "[Versions] containerd {}, runc {}, cni-plugins {}, orchestration track {}",
        resolved.container_runtime,
        resolved.low_level_runtime,
        resolved.network_plugins,
        resolved.orchestration_track
    );
    Ok(resolved)
}

fn pinned(source: &str, pin: &str) -> String {
    tracing::info!("[Versions] {} pinned to {}", source, pin);
    pin.to_string()
}

async fn latest_release_tag(fetcher: &Fetcher, source: &str, url: &str) -> Result<String> {
    let release = fetcher
        .get_json(url)
        .await
        .map_err(|e| ProvisionError::VersionResolution(format!("{}: {}", source, e)))?;
    extract_tag_name(&release).ok_or_else(|| {
        ProvisionError::VersionResolution(format!(
            "{}: release metadata carries no usable tag",
            source
        ))
    })
}

async fn stable_orchestration_version(fetcher: &Fetcher) -> Result<String> {
    fetcher
        .get_text(K8S_STABLE_URL)
        .await
        .map(|body| body.trim().to_string())
        .map_err(|e| ProvisionError::VersionResolution(format!("kubernetes: {}", e)))
}

/// Pull the `tag_name` out of release metadata. Empty tags are not usable.
pub fn extract_tag_name(release: &serde_json::Value) -> Option<String> {
    release
        .get("tag_name")
        .and_then(|t| t.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Reject empty or malformed tags so no download URL is ever built from a
/// bad version component.
pub fn validate_tag(source: &str, tag: &str) -> Result<String> {
    let tag = tag.trim();
    let body = tag.strip_prefix('v').unwrap_or(tag);
    let well_formed = body.starts_with(|c: char| c.is_ascii_digit())
        && body
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+' | '_'));

    if !well_formed {
        return Err(ProvisionError::VersionResolution(format!(
            "{}: malformed tag {:?}",
            source, tag
        )));
    }
    Ok(tag.to_string())
}

pub fn strip_v_prefix(tag: &str) -> String {
    tag.strip_prefix('v').unwrap_or(tag).to_string()
}

/// Reduce a full version to its `v<major>.<minor>` release track.
pub fn release_track(version: &str) -> Result<String> {
    let body = version.strip_prefix('v').unwrap_or(version);
    let mut parts = body.split('.');
    match (parts.next(), parts.next()) {
        (Some(major), Some(minor)) if !major.is_empty() && !minor.is_empty() => {
            Ok(format!("v{}.{}", major, minor))
        }
        _ => Err(ProvisionError::VersionResolution(format!(
            "kubernetes: cannot derive release track from {:?}",
            version
        ))),
    }
}
