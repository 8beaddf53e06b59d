//! `ethers` bindings for the framework contracts.
//!
//! Calldata and return values are encoded with the shared `sol!` definitions; `ethers` only signs,
//! sends and waits for receipts.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256};
use alloy_sol_types::{SolCall, SolEvent};
use ethers::{
    middleware::SignerMiddleware,
    providers::{Http, Middleware, MiddlewareError, Provider},
    signers::{LocalWallet, Signer},
    types::{
        transaction::eip2718::TypedTransaction, TransactionReceipt, TransactionRequest, H160, U64,
    },
};
use osx_permission_types::{
    abi::{
        ApplyInstallationParams, IENS, IPermissionManager, IPluginRepo, IPluginSetupProcessor,
        MultiTargetPermission, PrepareInstallationParams, SetupRef,
    },
    ApplyInstallation, ChainError, EnsRegistry, PermissionManager, PermissionOperation, PluginRepo,
    PluginSetupProcessor, PluginSetupRef, PreparedPlugin, PreparedSetupData, Version, VersionTag,
};
use tracing::debug;

use crate::{
    errors::{ConfigError, DeployError},
    pipeline::Bindings,
};

pub type Client = SignerMiddleware<Provider<Http>, LocalWallet>;

fn to_h160(address: Address) -> H160 {
    H160::from_slice(address.as_slice())
}

fn from_h160(address: H160) -> Address {
    Address::from_slice(address.as_bytes())
}

fn malformed(e: alloy_sol_types::Error) -> ChainError {
    ChainError::MalformedReturn(e.to_string())
}

/// JSON-RPC error responses are the node rejecting the call (usually a revert during `eth_call`
/// or gas estimation); anything else is the transport.
fn classify<E: MiddlewareError>(e: E) -> ChainError {
    match e.as_error_response() {
        Some(response) => {
            let reason = match response.as_revert_data() {
                Some(data) => format!("{} (0x{})", response.message, hex::encode(data)),
                None => response.message.clone(),
            };
            ChainError::Reverted { tx: None, reason }
        }
        None => ChainError::Transport(e.to_string()),
    }
}

/// A signing connection to one network.
#[derive(Clone)]
pub struct Chain {
    client: Arc<Client>,
}

impl Chain {
    pub async fn connect(rpc_url: &str, key: &str) -> Result<Self, DeployError> {
        let provider = Provider::<Http>::try_from(rpc_url).map_err(|e| ConfigError::Invalid {
            var: "RPC_URL".to_string(),
            value: rpc_url.to_string(),
            reason: e.to_string(),
        })?;
        let wallet = key
            .trim_start_matches("0x")
            .parse::<LocalWallet>()
            .map_err(|e| ConfigError::Invalid {
                var: "ETH_KEY".to_string(),
                value: "<redacted>".to_string(),
                reason: e.to_string(),
            })?;
        let chain_id = provider.get_chainid().await.map_err(classify)?;
        let wallet = wallet.with_chain_id(chain_id.as_u64());
        debug!(chain_id = chain_id.as_u64(), deployer = %from_h160(wallet.address()), "connected");

        Ok(Self {
            client: Arc::new(SignerMiddleware::new(provider, wallet)),
        })
    }

    async fn call(&self, to: Address, data: Vec<u8>) -> Result<Vec<u8>, ChainError> {
        let tx: TypedTransaction = TransactionRequest::new()
            .to(to_h160(to))
            .data(data)
            .into();
        let out = self.client.call(&tx, None).await.map_err(classify)?;
        Ok(out.to_vec())
    }

    /// Send and wait for a successful receipt.
    async fn send(&self, to: Address, data: Vec<u8>) -> Result<TransactionReceipt, ChainError> {
        let request = TransactionRequest::new().to(to_h160(to)).data(data);
        let pending = self
            .client
            .send_transaction(request, None)
            .await
            .map_err(classify)?;
        let hash = B256::from(pending.tx_hash().0);
        debug!(%to, tx = %hash, "transaction sent");

        let receipt = pending
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?
            .ok_or_else(|| ChainError::Transport(format!("transaction {hash} dropped")))?;
        if receipt.status != Some(U64::from(1)) {
            return Err(ChainError::Reverted {
                tx: Some(hash),
                reason: "transaction status 0".to_string(),
            });
        }
        Ok(receipt)
    }
}

impl Bindings for Chain {
    type Manager = OnchainManager;
    type Processor = OnchainProcessor;
    type Repo = OnchainRepo;
    type Ens = OnchainEns;

    fn deployer(&self) -> Address {
        from_h160(self.client.address())
    }

    fn permission_manager(&self, address: Address) -> OnchainManager {
        OnchainManager {
            chain: self.clone(),
            address,
        }
    }

    fn setup_processor(&self, address: Address) -> OnchainProcessor {
        OnchainProcessor {
            chain: self.clone(),
            address,
        }
    }

    fn plugin_repo(&self, address: Address) -> OnchainRepo {
        OnchainRepo {
            chain: self.clone(),
            address,
        }
    }

    fn ens(&self, address: Address) -> OnchainEns {
        OnchainEns {
            chain: self.clone(),
            address,
        }
    }
}

pub struct OnchainManager {
    chain: Chain,
    address: Address,
}

impl PermissionManager for OnchainManager {
    fn address(&self) -> Address {
        self.address
    }

    async fn is_granted(
        &self,
        target: Address,
        who: Address,
        permission_id: B256,
        data: &[u8],
    ) -> Result<bool, ChainError> {
        let call = IPermissionManager::isGrantedCall {
            _where: target,
            _who: who,
            _permissionId: permission_id,
            _data: Bytes::copy_from_slice(data),
        };
        let out = self.chain.call(self.address, call.abi_encode()).await?;
        let granted = IPermissionManager::isGrantedCall::abi_decode_returns(&out, true)
            .map_err(malformed)?
            ._0;
        Ok(granted)
    }

    async fn apply_multi_target_permissions(
        &self,
        operations: &[PermissionOperation],
    ) -> Result<B256, ChainError> {
        let call = IPermissionManager::applyMultiTargetPermissionsCall {
            _items: operations.iter().map(MultiTargetPermission::from).collect(),
        };
        let receipt = self.chain.send(self.address, call.abi_encode()).await?;
        Ok(B256::from(receipt.transaction_hash.0))
    }
}

pub struct OnchainProcessor {
    chain: Chain,
    address: Address,
}

impl PluginSetupProcessor for OnchainProcessor {
    fn address(&self) -> Address {
        self.address
    }

    /// Sent as a transaction; the results are read back from `InstallationPrepared`.
    async fn prepare_installation(
        &self,
        dao: Address,
        setup_ref: &PluginSetupRef,
        data: &[u8],
    ) -> Result<PreparedPlugin, ChainError> {
        let call = IPluginSetupProcessor::prepareInstallationCall {
            _dao: dao,
            _params: PrepareInstallationParams {
                pluginSetupRef: SetupRef::from(setup_ref),
                data: Bytes::copy_from_slice(data),
            },
        };
        let receipt = self.chain.send(self.address, call.abi_encode()).await?;
        let tx = B256::from(receipt.transaction_hash.0);

        let log = receipt
            .logs
            .iter()
            .find(|log| {
                from_h160(log.address) == self.address
                    && log.topics.first().map(|t| B256::from(t.0))
                        == Some(IPluginSetupProcessor::InstallationPrepared::SIGNATURE_HASH)
            })
            .ok_or_else(|| {
                ChainError::MalformedReturn(format!("no InstallationPrepared event in tx {tx}"))
            })?;
        let event = IPluginSetupProcessor::InstallationPrepared::decode_raw_log(
            log.topics.iter().map(|t| B256::from(t.0)),
            &log.data,
            true,
        )
        .map_err(malformed)?;
        if event.dao != dao {
            return Err(ChainError::MalformedReturn(format!(
                "InstallationPrepared for DAO {}, expected {dao}",
                event.dao
            )));
        }

        let setup_data = PreparedSetupData::try_from(event.preparedSetupData).map_err(|op| {
            ChainError::MalformedReturn(format!("unknown permission operation {op}"))
        })?;
        Ok(PreparedPlugin {
            plugin: event.plugin,
            setup_data,
            tx,
        })
    }

    async fn apply_installation(
        &self,
        dao: Address,
        params: &ApplyInstallation,
    ) -> Result<B256, ChainError> {
        let call = IPluginSetupProcessor::applyInstallationCall {
            _dao: dao,
            _params: ApplyInstallationParams {
                pluginSetupRef: SetupRef::from(&params.setup_ref),
                plugin: params.plugin,
                permissions: params.permission_items(),
                helpersHash: params.helpers_hash,
            },
        };
        let receipt = self.chain.send(self.address, call.abi_encode()).await?;
        Ok(B256::from(receipt.transaction_hash.0))
    }
}

pub struct OnchainRepo {
    chain: Chain,
    address: Address,
}

impl PluginRepo for OnchainRepo {
    fn address(&self) -> Address {
        self.address
    }

    async fn latest_version(&self) -> Result<Option<Version>, ChainError> {
        let out = self
            .chain
            .call(self.address, IPluginRepo::latestReleaseCall {}.abi_encode())
            .await?;
        let release = IPluginRepo::latestReleaseCall::abi_decode_returns(&out, true)
            .map_err(malformed)?
            ._0;
        if release == 0 {
            return Ok(None);
        }

        let call = IPluginRepo::getLatestVersionCall { _release: release };
        let out = self.chain.call(self.address, call.abi_encode()).await?;
        let version = IPluginRepo::getLatestVersionCall::abi_decode_returns(&out, true)
            .map_err(malformed)?
            ._0;
        Ok(Some(version.into()))
    }

    async fn get_version(&self, tag: VersionTag) -> Result<Version, ChainError> {
        let call = IPluginRepo::getVersionCall { _tag: tag.into() };
        let out = self.chain.call(self.address, call.abi_encode()).await?;
        let version = IPluginRepo::getVersionCall::abi_decode_returns(&out, true)
            .map_err(malformed)?
            ._0;
        Ok(version.into())
    }

    async fn create_version(
        &self,
        release: u8,
        plugin_setup: Address,
        build_metadata: &[u8],
        release_metadata: &[u8],
    ) -> Result<B256, ChainError> {
        let call = IPluginRepo::createVersionCall {
            _release: release,
            _pluginSetup: plugin_setup,
            _buildMetadata: Bytes::copy_from_slice(build_metadata),
            _releaseMetadata: Bytes::copy_from_slice(release_metadata),
        };
        let receipt = self.chain.send(self.address, call.abi_encode()).await?;
        Ok(B256::from(receipt.transaction_hash.0))
    }
}

pub struct OnchainEns {
    chain: Chain,
    address: Address,
}

impl EnsRegistry for OnchainEns {
    async fn owner(&self, node: B256) -> Result<Address, ChainError> {
        let out = self
            .chain
            .call(self.address, IENS::ownerCall { node }.abi_encode())
            .await?;
        let owner = IENS::ownerCall::abi_decode_returns(&out, true)
            .map_err(malformed)?
            ._0;
        Ok(owner)
    }
}
