//! Install-data payloads handed to plugin setups' `prepareInstallation`.

use std::collections::HashSet;

use alloy_primitives::{Address, Bytes};
use alloy_sol_types::SolValue;
use osx_permission_types::abi::MultisigSettings;

use crate::errors::PreconditionError;

/// Encode `abi.encode(address[] members, (bool onlyListed, uint16 minApprovals))`.
pub fn encode_multisig_install_data(
    members: &[Address],
    only_listed: bool,
    min_approvals: u16,
) -> Result<Bytes, PreconditionError> {
    if members.is_empty() {
        return Err(PreconditionError::InvalidInstallData(
            "multisig needs at least one member".to_string(),
        ));
    }
    if min_approvals == 0 || usize::from(min_approvals) > members.len() {
        return Err(PreconditionError::InvalidInstallData(format!(
            "min approvals {min_approvals} outside 1..={}",
            members.len()
        )));
    }
    let mut seen = HashSet::with_capacity(members.len());
    if let Some(dup) = members.iter().find(|m| !seen.insert(**m)) {
        return Err(PreconditionError::InvalidInstallData(format!(
            "duplicate member {dup}"
        )));
    }

    let settings = MultisigSettings {
        onlyListed: only_listed,
        minApprovals: min_approvals,
    };
    let encoded = (members.to_vec(), settings).abi_encode_params();
    Ok(Bytes::from(encoded))
}

/// Encode `abi.encode(address admin)` for the admin plugin setup.
pub fn encode_admin_install_data(admin: Address) -> Result<Bytes, PreconditionError> {
    if admin.is_zero() {
        return Err(PreconditionError::InvalidInstallData(
            "admin must not be the zero address".to_string(),
        ));
    }
    Ok(Bytes::from(admin.abi_encode()))
}
