mod addresses;
mod chain;
mod config;
mod encoder;
mod ens;
mod errors;
mod installer;
#[cfg(test)]
mod mock;
mod permissions;
mod pipeline;
mod repo;
mod session;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{
    addresses::ActiveContracts,
    chain::Chain,
    config::{Bump, Config, ProcessEnv},
    pipeline::{select_steps, Bindings, Pipeline, STEPS},
    session::DeploymentSession,
};

/// Reconcile framework permissions, publish plugin versions and install the management DAO
/// multisig on one network.
///
/// Addresses of already deployed contracts come from `active_contracts.json` in the workspace;
/// anything the run creates is written back there.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Network name, used as the registry key and the env variable prefix (eg `sepolia`).
    #[arg(long, env = "NETWORK", default_value = "hardhat")]
    network: String,

    /// JSON-RPC endpoint of the network.
    #[arg(long, env = "RPC_URL", default_value = "http://127.0.0.1:8545")]
    rpc_url: String,

    /// Comma-separated step tags; dependencies of selected steps always run.
    #[arg(long, value_delimiter = ',', default_value = "New")]
    tags: Vec<String>,

    /// Queue permission changes as management DAO actions instead of sending them.
    #[arg(long)]
    propose: bool,

    /// Overrides `GITHUB_WORKSPACE`.
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// Default tracing filter when `RUST_LOG` is unset.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Version part a publication increments.
    #[arg(long, value_enum, default_value_t = Bump::Build)]
    bump: Bump,

    /// Build metadata URI stored with the published version.
    #[arg(long, env = "BUILD_METADATA_URI", default_value = "")]
    build_metadata: String,

    /// Release metadata URI, required when a new release is created.
    #[arg(long, env = "RELEASE_METADATA_URI", default_value = "")]
    release_metadata: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .context("invalid log level")?;
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = Config::from_env(&ProcessEnv, &cli.network)
        .with_context(|| format!("invalid configuration for `{}`", cli.network))?;
    if let Some(workspace) = cli.workspace {
        config.workspace = workspace;
    }
    config.publish.bump = cli.bump;
    config.publish.build_metadata = cli.build_metadata;
    config.publish.release_metadata = cli.release_metadata;
    if std::env::var("PUB_PINATA_JWT").is_ok() {
        warn!("PUB_PINATA_JWT is set but metadata uploads are not performed; pass URIs instead");
    }

    let registry = ActiveContracts::load(config.active_contracts_path())
        .context("failed loading the address registry")?;
    let chain = Chain::connect(&cli.rpc_url, &config.deployer_key)
        .await
        .with_context(|| format!("failed connecting to {}", cli.rpc_url))?;
    let session = DeploymentSession::new(&config.network, chain.deployer(), cli.propose);
    info!(
        network = %config.network,
        deployer = %session.deployer,
        propose = cli.propose,
        "starting"
    );

    let steps = select_steps(&STEPS, &cli.tags);
    if steps.is_empty() {
        warn!(tags = ?cli.tags, "no step matches the requested tags");
        return Ok(());
    }

    let mut pipeline = Pipeline::new(&config, &chain, session, registry);
    pipeline
        .run(&steps)
        .await
        .with_context(|| format!("deployment on `{}` failed", config.network))?;

    let (session, _) = pipeline.into_parts();
    for (name, address) in session.deployments() {
        println!("{name}: {address}");
    }
    if !session.actions().is_empty() {
        let path = config.actions_path();
        session
            .write_actions(&path)
            .with_context(|| format!("failed writing {}", path.display()))?;
        println!(
            "Queued {} management DAO action(s) in {}",
            session.actions().len(),
            path.display()
        );
    }
    println!(
        "Done on `{}`: {} transaction(s) sent",
        config.network,
        session.transactions().len()
    );
    Ok(())
}
