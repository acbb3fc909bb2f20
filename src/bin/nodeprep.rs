//! nodeprep binary: provisions this host as a cluster node.

use clap::Parser;
use nodeprep::fetch::Fetcher;
use nodeprep::host::{HostState, SystemRunner};
use nodeprep::progress::LogProgressReporter;
use nodeprep::{pipeline, NodeConfig, NodeRole, ProvisionConfig, ProvisionError};

#[derive(Parser, Debug)]
#[command(
    name = "nodeprep",
    version,
    about = "Prepare this Linux host to participate in a container-orchestration cluster"
)]
struct Args {
    /// Hostname to assign to this node
    #[arg(long)]
    hostname: String,

    /// Whether this node hosts the control plane ("yes" or "no")
    #[arg(long = "control-plane", value_parser = parse_role)]
    control_plane: NodeRole,
}

fn parse_role(value: &str) -> Result<NodeRole, String> {
    match value.to_ascii_lowercase().as_str() {
        "yes" => Ok(NodeRole::ControlPlane),
        "no" => Ok(NodeRole::Worker),
        other => Err(format!("expected \"yes\" or \"no\", got {:?}", other)),
    }
}

fn main() {
    // Default to info level if RUST_LOG not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let node = NodeConfig {
        hostname: args.hostname,
        role: args.control_plane,
    };

    tracing::info!(
        "Provisioning {} as {}",
        node.hostname,
        match node.role {
            NodeRole::ControlPlane => "a control-plane node",
            NodeRole::Worker => "a worker node",
        }
    );

    let rt = tokio::runtime::Runtime::new().expect("tokio runtime");
    if let Err(e) = rt.block_on(provision(node)) {
        tracing::error!("[{}] {}", e.classification(), e);
        std::process::exit(1);
    }
}

async fn provision(node: NodeConfig) -> Result<(), ProvisionError> {
    let settings = ProvisionConfig::load()?;
    let host = HostState::new();
    let runner = SystemRunner;
    let fetcher = Fetcher::new()?;
    let reporter = LogProgressReporter;

    pipeline::run(&node, &settings, &host, &runner, &fetcher, &reporter).await
}
