use alloy_primitives::{Address, B256};

use crate::{
    operations::PermissionOperation,
    setup::{ApplyInstallation, PluginSetupRef, PreparedPlugin, Version, VersionTag},
};

/// Errors while reading chain facts or submitting transactions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    /// The RPC provider could not be reached or rejected the request.
    #[error("transport error: {0}")]
    Transport(String),
    /// The call or transaction reverted.
    #[error("reverted{}: {reason}", .tx.as_ref().map(|h| format!(" in tx {h}")).unwrap_or_default())]
    Reverted { tx: Option<B256>, reason: String },
    /// Return data or logs were malformed or could not be decoded.
    #[error("malformed return data: {0}")]
    MalformedReturn(String),
}

/// A permission manager (every DAO is one), implemented differently on-chain vs off-chain.
///
/// `data` is forwarded to condition contracts; pass an empty slice when there is none.
#[allow(async_fn_in_trait)]
pub trait PermissionManager {
    fn address(&self) -> Address;

    async fn is_granted(
        &self,
        target: Address,
        who: Address,
        permission_id: B256,
        data: &[u8],
    ) -> Result<bool, ChainError>;

    /// Submit all operations as one transaction and wait for its receipt.
    async fn apply_multi_target_permissions(
        &self,
        operations: &[PermissionOperation],
    ) -> Result<B256, ChainError>;
}

/// The plugin setup processor driving two-phase installations.
#[allow(async_fn_in_trait)]
pub trait PluginSetupProcessor {
    fn address(&self) -> Address;

    /// Returns the prepared plugin address, the setup data it needs and the preparing transaction.
    async fn prepare_installation(
        &self,
        dao: Address,
        setup_ref: &PluginSetupRef,
        data: &[u8],
    ) -> Result<PreparedPlugin, ChainError>;

    async fn apply_installation(
        &self,
        dao: Address,
        params: &ApplyInstallation,
    ) -> Result<B256, ChainError>;
}

/// A plugin repository holding versioned plugin setups.
#[allow(async_fn_in_trait)]
pub trait PluginRepo {
    fn address(&self) -> Address;

    /// Latest version of the latest release, `None` while the repo is empty.
    async fn latest_version(&self) -> Result<Option<Version>, ChainError>;

    async fn get_version(&self, tag: VersionTag) -> Result<Version, ChainError>;

    async fn create_version(
        &self,
        release: u8,
        plugin_setup: Address,
        build_metadata: &[u8],
        release_metadata: &[u8],
    ) -> Result<B256, ChainError>;
}

/// Read-only view of the ENS registry.
#[allow(async_fn_in_trait)]
pub trait EnsRegistry {
    async fn owner(&self, node: B256) -> Result<Address, ChainError>;
}
