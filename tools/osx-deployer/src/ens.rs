//! ENS ownership checks performed before wiring registrars or installing into a named DAO.

use std::sync::OnceLock;

use alloy_primitives::{Address, B256};
use osx_permission_types::EnsRegistry;
use regex::Regex;
use tracing::debug;

use crate::errors::{DeployError, PreconditionError};

const LABEL_PATTERN: &str = r"^[a-z0-9-]+$";

/// EIP-137 namehash.
pub fn namehash(name: &str) -> B256 {
    B256::from(ethers::providers::ens::namehash(name).0)
}

fn label_regex() -> Result<&'static Regex, regex::Error> {
    static LABEL: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    LABEL
        .get_or_init(|| Regex::new(LABEL_PATTERN))
        .as_ref()
        .map_err(Clone::clone)
}

pub fn is_valid_label(label: &str) -> Result<bool, regex::Error> {
    Ok(label_regex()?.is_match(label))
}

/// A subdomain may be (re)used if nobody owns it yet, or if `expected_owner` already does.
pub async fn ensure_subdomain_available<E: EnsRegistry>(
    ens: &E,
    name: &str,
    expected_owner: Address,
) -> Result<(), DeployError> {
    let owner = ens.owner(namehash(name)).await?;
    debug!(%name, %owner, "ENS owner");
    if owner == Address::ZERO || owner == expected_owner {
        Ok(())
    } else {
        Err(PreconditionError::SubdomainTaken {
            name: name.to_string(),
            owner,
        }
        .into())
    }
}

/// The root domain a registrar hands out subdomains of must belong to that registrar.
pub async fn ensure_domain_delegated<E: EnsRegistry>(
    ens: &E,
    name: &str,
    registrar: Address,
) -> Result<(), DeployError> {
    let owner = ens.owner(namehash(name)).await?;
    if owner == registrar {
        Ok(())
    } else {
        Err(PreconditionError::DomainNotDelegated {
            name: name.to_string(),
            owner,
            registrar,
        }
        .into())
    }
}
