//! Contract address resolution: the current session first, then `active_contracts.json`.
//!
//! The registry file is `{ "<network>": { "<contract>": "0x…" } }`. It is read-modify-written and
//! entries are never removed, so it accumulates across runs and networks.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use alloy_primitives::Address;
use serde::Serialize;

use crate::{errors::ResolveError, session::DeploymentSession};

/// Registry names of the framework contracts the pipeline touches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Contract {
    ManagementDao,
    DaoRegistry,
    DaoFactory,
    PluginRepoRegistry,
    PluginRepoFactory,
    DaoEnsSubdomainRegistrar,
    PluginEnsSubdomainRegistrar,
    PluginSetupProcessor,
    EnsRegistry,
    MultisigRepo,
    MultisigSetup,
    ManagementDaoMultisig,
}

impl Contract {
    pub fn name(self) -> &'static str {
        match self {
            Contract::ManagementDao => "ManagementDAOProxy",
            Contract::DaoRegistry => "DAORegistryProxy",
            Contract::DaoFactory => "DAOFactory",
            Contract::PluginRepoRegistry => "PluginRepoRegistryProxy",
            Contract::PluginRepoFactory => "PluginRepoFactory",
            Contract::DaoEnsSubdomainRegistrar => "DAOENSSubdomainRegistrarProxy",
            Contract::PluginEnsSubdomainRegistrar => "PluginENSSubdomainRegistrarProxy",
            Contract::PluginSetupProcessor => "PluginSetupProcessor",
            Contract::EnsRegistry => "ENSRegistry",
            Contract::MultisigRepo => "MultisigRepoProxy",
            Contract::MultisigSetup => "MultisigSetup",
            Contract::ManagementDaoMultisig => "ManagementDAOMultisig",
        }
    }
}

/// The persisted address registry.
#[derive(Debug)]
pub struct ActiveContracts {
    path: PathBuf,
    networks: BTreeMap<String, BTreeMap<String, String>>,
}

impl ActiveContracts {
    /// Load the registry; a missing or blank file is an empty registry.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ResolveError> {
        let path = path.into();
        let existing = if path.exists() {
            fs::read_to_string(&path).map_err(|source| ResolveError::Read {
                path: path.clone(),
                source,
            })?
        } else {
            String::new()
        };

        let networks = if existing.trim().is_empty() {
            BTreeMap::new()
        } else {
            serde_json::from_str(&existing).map_err(|source| ResolveError::Parse {
                path: path.clone(),
                source,
            })?
        };
        Ok(Self { path, networks })
    }

    /// An empty string entry means "not deployed yet".
    pub fn get(&self, network: &str, name: &str) -> Result<Option<Address>, ResolveError> {
        let Some(value) = self.networks.get(network).and_then(|n| n.get(name)) else {
            return Ok(None);
        };
        if value.trim().is_empty() {
            return Ok(None);
        }
        value
            .trim()
            .parse::<Address>()
            .map(Some)
            .map_err(|_| ResolveError::BadAddress {
                network: network.to_string(),
                name: name.to_string(),
                value: value.clone(),
            })
    }

    pub fn record(&mut self, network: &str, name: &str, address: Address) {
        self.networks
            .entry(network.to_string())
            .or_default()
            .insert(name.to_string(), address.to_string());
    }

    pub fn save(&self) -> Result<(), ResolveError> {
        write_json_atomic(&self.path, &self.networks)
    }
}

/// Resolve `name` for the session's network.
pub fn get_contract_address(
    name: &str,
    session: &DeploymentSession,
    registry: &ActiveContracts,
) -> Result<Address, ResolveError> {
    if let Some(address) = session.get(name) {
        return Ok(address);
    }
    registry
        .get(&session.network, name)?
        .ok_or_else(|| ResolveError::NotDeployed {
            name: name.to_string(),
            network: session.network.clone(),
        })
}

pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), ResolveError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    if !parent.exists() {
        fs::create_dir_all(parent).map_err(|source| ResolveError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let serialised =
        serde_json::to_string_pretty(value).map_err(|source| ResolveError::Serialise {
            path: path.to_path_buf(),
            source,
        })?;
    let tmp_path = tmp_path_for(path);
    fs::write(&tmp_path, serialised.as_bytes()).map_err(|source| ResolveError::Write {
        path: tmp_path.clone(),
        source,
    })?;
    fs::rename(&tmp_path, path).map_err(|source| ResolveError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}
