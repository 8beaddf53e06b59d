//! Environment-driven configuration.
//!
//! Live networks must set every variable; local development networks fall back to defaults so a
//! fresh node can be wired without a `.env` file.

use std::{collections::HashMap, path::PathBuf};

use alloy_primitives::Address;
use clap::ValueEnum;

use crate::{ens, errors::ConfigError};

/// Networks that accept defaults for missing variables.
pub const LOCAL_NETWORKS: [&str; 3] = ["hardhat", "localhost", "local"];

/// First default account of a local development node (publicly known key).
const LOCAL_DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

/// Where configuration values come from.
pub trait EnvSource {
    fn get(&self, key: &str) -> Option<String>;
}

/// The process environment (after `.env` has been loaded).
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

/// Which part of the version tag a publication increments.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Bump {
    Release,
    #[default]
    Build,
}

/// Management DAO multisig settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultisigConfig {
    /// Empty means "the deployer only", resolved once the deployer key is known.
    pub approvers: Vec<Address>,
    pub min_approvals: u16,
    pub listed_only: bool,
}

/// Parameters of the plugin version publication step.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PublishSettings {
    pub bump: Bump,
    /// eg `ipfs://<cid>`; stored on chain as UTF-8 bytes.
    pub build_metadata: String,
    pub release_metadata: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub network: String,
    pub dao_ens_domain: String,
    pub plugin_ens_domain: String,
    pub management_dao_subdomain: String,
    pub multisig: MultisigConfig,
    pub deployer_key: String,
    /// Directory holding `active_contracts.json`.
    pub workspace: PathBuf,
    pub publish: PublishSettings,
}

impl Config {
    pub fn is_local(network: &str) -> bool {
        LOCAL_NETWORKS.contains(&network)
    }

    pub fn from_env<E: EnvSource>(env: &E, network: &str) -> Result<Self, ConfigError> {
        let local = Self::is_local(network);
        let prefix = network.to_uppercase().replace('-', "_");

        let read = |key: &str, default: &str| -> Result<String, ConfigError> {
            match env.get(key).filter(|v| !v.trim().is_empty()) {
                Some(v) => Ok(v.trim().to_string()),
                None if local => Ok(default.to_string()),
                None => Err(ConfigError::Missing(key.to_string())),
            }
        };

        let dao_ens_domain = read(&format!("{prefix}_DAO_ENS_DOMAIN"), "dao.eth")?;
        let plugin_ens_domain = read(&format!("{prefix}_PLUGIN_ENS_DOMAIN"), "plugin.dao.eth")?;
        let management_dao_subdomain = read("MANAGEMENT_DAO_SUBDOMAIN", "management")?;
        validate_label("MANAGEMENT_DAO_SUBDOMAIN", &management_dao_subdomain)?;

        let approvers = parse_approvers(&read("MANAGEMENT_DAO_MULTISIG_APPROVERS", "")?)?;
        let min_raw = read("MANAGEMENT_DAO_MULTISIG_MINAPPROVALS", "1")?;
        let min_approvals = min_raw.parse::<u16>().map_err(|e| ConfigError::Invalid {
            var: "MANAGEMENT_DAO_MULTISIG_MINAPPROVALS".to_string(),
            value: min_raw.clone(),
            reason: e.to_string(),
        })?;
        // no approvers means the deployer alone
        let signers = approvers.len().max(1);
        if min_approvals == 0 || usize::from(min_approvals) > signers {
            return Err(ConfigError::Invalid {
                var: "MANAGEMENT_DAO_MULTISIG_MINAPPROVALS".to_string(),
                value: min_raw,
                reason: format!("expected between 1 and {signers}"),
            });
        }
        let listed_raw = read("MANAGEMENT_DAO_MULTISIG_LISTEDONLY", "true")?;
        let listed_only = match listed_raw.as_str() {
            "true" => true,
            "false" => false,
            _ => {
                return Err(ConfigError::Invalid {
                    var: "MANAGEMENT_DAO_MULTISIG_LISTEDONLY".to_string(),
                    value: listed_raw,
                    reason: "expected `true` or `false`".to_string(),
                })
            }
        };

        let deployer_key = read("ETH_KEY", LOCAL_DEV_KEY)?;
        let workspace = PathBuf::from(read("GITHUB_WORKSPACE", ".")?);

        Ok(Self {
            network: network.to_string(),
            dao_ens_domain,
            plugin_ens_domain,
            management_dao_subdomain,
            multisig: MultisigConfig {
                approvers,
                min_approvals,
                listed_only,
            },
            deployer_key,
            workspace,
            publish: PublishSettings::default(),
        })
    }

    /// Full ENS name of the management DAO.
    pub fn management_dao_ens_name(&self) -> String {
        format!("{}.{}", self.management_dao_subdomain, self.dao_ens_domain)
    }

    pub fn active_contracts_path(&self) -> PathBuf {
        self.workspace.join("active_contracts.json")
    }

    pub fn actions_path(&self) -> PathBuf {
        self.workspace.join("managing_dao_actions.json")
    }
}

fn parse_approvers(raw: &str) -> Result<Vec<Address>, ConfigError> {
    let mut approvers = Vec::new();
    for s in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let address = s.parse::<Address>().map_err(|e| ConfigError::Invalid {
            var: "MANAGEMENT_DAO_MULTISIG_APPROVERS".to_string(),
            value: s.to_string(),
            reason: e.to_string(),
        })?;
        if approvers.contains(&address) {
            return Err(ConfigError::Invalid {
                var: "MANAGEMENT_DAO_MULTISIG_APPROVERS".to_string(),
                value: s.to_string(),
                reason: "duplicate approver".to_string(),
            });
        }
        approvers.push(address);
    }
    Ok(approvers)
}

fn validate_label(var: &str, label: &str) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        var: var.to_string(),
        value: label.to_string(),
        reason,
    };
    if ens::is_valid_label(label).map_err(|e| invalid(e.to_string()))? {
        Ok(())
    } else {
        Err(invalid(
            "expected lowercase letters, digits and dashes".to_string(),
        ))
    }
}
