//! The provisioning pipeline.
//!
//! Strictly linear with early exit on failure: preflight, platform
//! detection, version resolution, runtime stack installation, agent
//! installation, role bootstrap. Steps tolerate partial prior execution
//! where the underlying tools permit it; there is no resume state and no
//! rollback.

use crate::bootstrap::{self, BootstrapOptions};
use crate::config::{NodeConfig, ProvisionConfig};
use crate::error::Result;
use crate::fetch::Fetcher;
use crate::host::{HostState, ToolRunner};
use crate::progress::ProgressReporter;
use crate::{agent, installer, platform, preflight, versions};

/// Run the whole pipeline for one node.
pub async fn run(
    node: &NodeConfig,
    settings: &ProvisionConfig,
    host: &HostState,
    runner: &dyn ToolRunner,
    fetcher: &Fetcher,
    reporter: &dyn ProgressReporter,
) -> Result<()> {
    reporter.emit(0, "Validating host prerequisites");
    preflight::run(node, host, runner)?;

    reporter.emit(15, "Detecting platform");
    let profile = platform::detect(host, runner)?;

    reporter.emit(25, "Resolving component versions");
    let resolved = versions::resolve(fetcher, &settings.versions).await?;

    reporter.emit(40, "Installing container runtime stack");
    installer::install_runtime_stack(&profile, &resolved, &settings.runtime, host, fetcher, runner)
        .await?;

    reporter.emit(70, "Installing orchestration agent");
    agent::install_agent(&profile, &resolved.orchestration_track, host, fetcher, runner).await?;

    reporter.emit(85, "Bootstrapping node role");
    let opts = BootstrapOptions::from_env(settings.network.pod_network_cidr.clone());
    bootstrap::run(node, runner, &opts)?;

    reporter.emit(100, "Provisioning complete");
    Ok(())
}
