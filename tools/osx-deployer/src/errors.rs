use std::path::PathBuf;

use alloy_primitives::Address;
use osx_permission_types::{ChainError, VersionTag};

/// Missing or invalid configuration, raised before any chain call.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable `{0}`")]
    Missing(String),
    #[error("invalid value for `{var}` ({value:?}): {reason}")]
    Invalid {
        var: String,
        value: String,
        reason: String,
    },
}

/// State found on chain that makes the requested change unsafe or impossible.
#[derive(Debug, thiserror::Error)]
pub enum PreconditionError {
    #[error("ENS name `{name}` is already owned by {owner}")]
    SubdomainTaken { name: String, owner: Address },
    #[error("ENS name `{name}` is owned by {owner}, expected its registrar {registrar}")]
    DomainNotDelegated {
        name: String,
        owner: Address,
        registrar: Address,
    },
    #[error("{who} does not hold ROOT_PERMISSION on DAO {dao}")]
    MissingRoot { dao: Address, who: Address },
    #[error("no plugin holds EXECUTE_PERMISSION on DAO {dao}; refusing to drop the deployer's root")]
    NoExecutor { dao: Address },
    #[error("plugin repo {repo} has no version left after {latest}")]
    VersionOverflow { repo: Address, latest: VersionTag },
    #[error("plugin repo {repo}: a new release needs release metadata")]
    EmptyReleaseMetadata { repo: Address },
    #[error("plugin repo {repo} is empty; nothing to install")]
    EmptyRepo { repo: Address },
    #[error("invalid install data: {0}")]
    InvalidInstallData(String),
}

/// A mutating call went through but the chain does not show the expected result.
#[derive(Debug, thiserror::Error)]
pub enum PostconditionError {
    #[error(
        "{permission} of {who} on {target}: expected {}, found {}",
        granted_label(.expected),
        granted_label(.actual)
    )]
    Permission {
        permission: String,
        target: Address,
        who: Address,
        expected: bool,
        actual: bool,
    },
    #[error("plugin repo {repo}: expected latest version {expected}, found {}", .actual.as_ref().map(|t| t.to_string()).unwrap_or_else(|| "none".to_string()))]
    LatestVersion {
        repo: Address,
        expected: VersionTag,
        actual: Option<VersionTag>,
    },
    #[error("plugin repo {repo}: version {tag} points to {actual}, expected {expected}")]
    VersionSetup {
        repo: Address,
        tag: VersionTag,
        expected: Address,
        actual: Address,
    },
}

fn granted_label(granted: &bool) -> &'static str {
    if *granted {
        "granted"
    } else {
        "not granted"
    }
}

/// The address registry could not answer.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("contract `{name}` is not deployed on `{network}`")]
    NotDeployed { name: String, network: String },
    #[error("`{network}.{name}` in the address registry is not an address: {value:?}")]
    BadAddress {
        network: String,
        name: String,
        value: String,
    },
    #[error("failed reading {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed parsing JSON in {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed writing {}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed serialising JSON for {}", .path.display())]
    Serialise {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Everything a pipeline step can fail with.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Precondition(#[from] PreconditionError),
    #[error(transparent)]
    Postcondition(#[from] PostconditionError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}
