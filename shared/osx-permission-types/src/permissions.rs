//! Symbolic permission names and their on-chain identifiers.
//!
//! On chain a permission id is `keccak256(name)`. Names are closed here so a typo is a compile
//! error rather than a silently different hash.

use std::{fmt, str::FromStr, sync::OnceLock};

use alloy_primitives::{keccak256, B256};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Permission {
    Root,
    Execute,
    UpgradeDao,
    SetMetadata,
    SetTrustedForwarder,
    RegisterStandardCallback,
    RegisterDao,
    RegisterPluginRepo,
    RegisterEnsSubdomain,
    UpgradeRegistry,
    UpgradeRegistrar,
    Maintainer,
    UpgradeRepo,
    UpgradePlugin,
    ApplyInstallation,
    ApplyUpdate,
    ApplyUninstallation,
    UpdateMultisigSettings,
}

impl Permission {
    pub const ALL: [Permission; 18] = [
        Permission::Root,
        Permission::Execute,
        Permission::UpgradeDao,
        Permission::SetMetadata,
        Permission::SetTrustedForwarder,
        Permission::RegisterStandardCallback,
        Permission::RegisterDao,
        Permission::RegisterPluginRepo,
        Permission::RegisterEnsSubdomain,
        Permission::UpgradeRegistry,
        Permission::UpgradeRegistrar,
        Permission::Maintainer,
        Permission::UpgradeRepo,
        Permission::UpgradePlugin,
        Permission::ApplyInstallation,
        Permission::ApplyUpdate,
        Permission::ApplyUninstallation,
        Permission::UpdateMultisigSettings,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Permission::Root => "ROOT_PERMISSION",
            Permission::Execute => "EXECUTE_PERMISSION",
            Permission::UpgradeDao => "UPGRADE_DAO_PERMISSION",
            Permission::SetMetadata => "SET_METADATA_PERMISSION",
            Permission::SetTrustedForwarder => "SET_TRUSTED_FORWARDER_PERMISSION",
            Permission::RegisterStandardCallback => "REGISTER_STANDARD_CALLBACK_PERMISSION",
            Permission::RegisterDao => "REGISTER_DAO_PERMISSION",
            Permission::RegisterPluginRepo => "REGISTER_PLUGIN_REPO_PERMISSION",
            Permission::RegisterEnsSubdomain => "REGISTER_ENS_SUBDOMAIN_PERMISSION",
            Permission::UpgradeRegistry => "UPGRADE_REGISTRY_PERMISSION",
            Permission::UpgradeRegistrar => "UPGRADE_REGISTRAR_PERMISSION",
            Permission::Maintainer => "MAINTAINER_PERMISSION",
            Permission::UpgradeRepo => "UPGRADE_REPO_PERMISSION",
            Permission::UpgradePlugin => "UPGRADE_PLUGIN_PERMISSION",
            Permission::ApplyInstallation => "APPLY_INSTALLATION_PERMISSION",
            Permission::ApplyUpdate => "APPLY_UPDATE_PERMISSION",
            Permission::ApplyUninstallation => "APPLY_UNINSTALLATION_PERMISSION",
            Permission::UpdateMultisigSettings => "UPDATE_MULTISIG_SETTINGS_PERMISSION",
        }
    }

    /// `keccak256(name)`, hashed once per process.
    pub fn id(self) -> B256 {
        id_table()[self as usize]
    }

    /// Reverse lookup, used to label ids returned by plugin setups.
    pub fn from_id(id: B256) -> Option<Permission> {
        Self::ALL.into_iter().find(|p| p.id() == id)
    }
}

fn id_table() -> &'static [B256; 18] {
    static IDS: OnceLock<[B256; 18]> = OnceLock::new();
    IDS.get_or_init(|| Permission::ALL.map(|p| keccak256(p.name().as_bytes())))
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown permission name `{0}`")]
pub struct UnknownPermission(pub String);

impl FromStr for Permission {
    type Err = UnknownPermission;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| UnknownPermission(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_in_declaration_order() {
        for (i, p) in Permission::ALL.iter().enumerate() {
            assert_eq!(*p as usize, i, "{p} is out of place");
        }
    }

    #[test]
    fn ids_are_keccak_of_names() {
        assert_eq!(
            Permission::Root.id(),
            keccak256("ROOT_PERMISSION".as_bytes())
        );
        assert_eq!(
            Permission::RegisterDao.id(),
            keccak256("REGISTER_DAO_PERMISSION".as_bytes())
        );
    }

    #[test]
    fn names_parse_and_ids_reverse() {
        for p in Permission::ALL {
            assert_eq!(p.name().parse::<Permission>(), Ok(p));
            assert_eq!(Permission::from_id(p.id()), Some(p));
        }
        assert!("ROOT_PERMISION".parse::<Permission>().is_err());
        assert_eq!(Permission::from_id(B256::ZERO), None);
    }
}
