//! Two-phase plugin installation: prepare, then apply under a short root window.
//!
//! `applyInstallation` is only reachable from a [`PreparedInstallation`], and the helpers hash it
//! sends is the one computed from that preparation's helpers. The processor recomputes the hash
//! from its own record and reverts on mismatch, so a different helper set cannot be swapped in
//! between the two phases.

use alloy_primitives::{Address, Bytes, B256};
use osx_permission_types::{
    ApplyInstallation, ChainError, NamedAddress, Permission, PermissionManager,
    PermissionOperation, PluginSetupProcessor, PluginSetupRef, PreparedPlugin, PreparedSetupData,
};
use tracing::info;

use crate::{
    errors::{DeployError, PreconditionError},
    permissions::{ensure_granted, manage_permissions, ManageOutcome},
};

/// What to install where.
#[derive(Clone, Debug)]
pub struct InstallationRequest {
    pub dao: Address,
    pub setup_ref: PluginSetupRef,
    /// ABI-encoded arguments for the plugin setup.
    pub data: Bytes,
}

impl InstallationRequest {
    pub async fn prepare<P: PluginSetupProcessor>(
        self,
        processor: &P,
    ) -> Result<PreparedInstallation, ChainError> {
        let PreparedPlugin {
            plugin,
            setup_data,
            tx,
        } = processor
            .prepare_installation(self.dao, &self.setup_ref, &self.data)
            .await?;
        let helpers_hash = setup_data.helpers_hash();
        info!(
            dao = %self.dao,
            %plugin,
            helpers = setup_data.helpers.len(),
            permissions = setup_data.permissions.len(),
            %tx,
            "installation prepared"
        );
        Ok(PreparedInstallation {
            dao: self.dao,
            setup_ref: self.setup_ref,
            plugin,
            setup_data,
            helpers_hash,
            prepare_tx: tx,
        })
    }
}

#[derive(Clone, Debug)]
pub struct PreparedInstallation {
    dao: Address,
    setup_ref: PluginSetupRef,
    plugin: Address,
    setup_data: PreparedSetupData,
    helpers_hash: B256,
    prepare_tx: B256,
}

impl PreparedInstallation {
    pub fn plugin(&self) -> Address {
        self.plugin
    }

    pub fn setup_data(&self) -> &PreparedSetupData {
        &self.setup_data
    }

    pub fn helpers_hash(&self) -> B256 {
        self.helpers_hash
    }

    pub async fn apply<P: PluginSetupProcessor>(
        self,
        processor: &P,
    ) -> Result<AppliedInstallation, ChainError> {
        let params = ApplyInstallation {
            setup_ref: self.setup_ref,
            plugin: self.plugin,
            permissions: self.setup_data.permissions.clone(),
            helpers_hash: self.helpers_hash,
        };
        let tx = processor.apply_installation(self.dao, &params).await?;
        info!(dao = %self.dao, plugin = %self.plugin, %tx, "installation applied");
        Ok(AppliedInstallation {
            dao: self.dao,
            plugin: self.plugin,
            helpers: self.setup_data.helpers,
            transactions: vec![self.prepare_tx, tx],
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppliedInstallation {
    pub dao: Address,
    pub plugin: Address,
    pub helpers: Vec<Address>,
    /// Every transaction the installation sent, in order.
    pub transactions: Vec<B256>,
}

/// Permissions the processor and the deployer need while an installation is applied.
fn root_window(dao: Address, processor: Address, deployer: Address) -> [PermissionOperation; 2] {
    [
        PermissionOperation::grant(dao, processor, Permission::Root),
        PermissionOperation::grant(processor, deployer, Permission::ApplyInstallation),
    ]
}

/// Revokes [`root_window`] grants; a no-op through the differ once they are gone.
pub fn close_root_window(dao: Address, processor: Address, deployer: Address) -> [PermissionOperation; 2] {
    [
        PermissionOperation::revoke(dao, processor, Permission::Root),
        PermissionOperation::revoke(processor, deployer, Permission::ApplyInstallation),
    ]
}

/// Prepare and apply an installation, leaving the root window open.
///
/// `dao_manager` must be the DAO's own permission manager and `deployer` must hold root on it.
async fn apply_in_root_window<M, P>(
    dao_manager: &M,
    processor: &P,
    deployer: Address,
    request: InstallationRequest,
) -> Result<AppliedInstallation, DeployError>
where
    M: PermissionManager,
    P: PluginSetupProcessor,
{
    let dao = request.dao;
    let psp = NamedAddress::new("PluginSetupProcessor", processor.address());

    if !dao_manager
        .is_granted(dao, deployer, Permission::Root.id(), &[])
        .await?
    {
        return Err(PreconditionError::MissingRoot { dao, who: deployer }.into());
    }

    let prepared = request.prepare(processor).await?;

    info!(%dao, processor = %psp, "opening root window");
    let opened = manage_permissions(dao_manager, &root_window(dao, psp.address, deployer)).await?;
    let mut applied = prepared.apply(processor).await?;
    if let ManageOutcome::Applied { tx, .. } = opened {
        // prepare, open, apply
        applied.transactions.insert(1, tx);
    }
    Ok(applied)
}

/// Install a plugin into `dao` and check it ends up holding `expected` on the DAO.
///
/// `on_applied` runs after apply and before the window is closed, so the caller can persist the
/// plugin while the close can still fail. A failure at any point aborts; nothing is rolled back.
pub async fn install_plugin<M, P, F>(
    dao_manager: &M,
    processor: &P,
    deployer: Address,
    request: InstallationRequest,
    expected: Permission,
    on_applied: F,
) -> Result<AppliedInstallation, DeployError>
where
    M: PermissionManager,
    P: PluginSetupProcessor,
    F: FnOnce(&AppliedInstallation) -> Result<(), DeployError>,
{
    let dao = request.dao;
    let psp = processor.address();
    let mut applied = apply_in_root_window(dao_manager, processor, deployer, request).await?;
    on_applied(&applied)?;

    let closed = manage_permissions(dao_manager, &close_root_window(dao, psp, deployer)).await?;
    if let ManageOutcome::Applied { tx, .. } = closed {
        applied.transactions.push(tx);
    }
    info!(%dao, processor = %psp, "root window closed");

    ensure_granted(dao_manager, dao, applied.plugin, expected).await?;
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockChain, DEPLOYER};
    use alloy_primitives::address;
    use osx_permission_types::{hash_helpers, VersionTag};

    const DAO: Address = address!("0000000000000000000000000000000000000d00");
    const PSP: Address = address!("0000000000000000000000000000000000000555");
    const REPO: Address = address!("0000000000000000000000000000000000000e00");

    fn request() -> InstallationRequest {
        InstallationRequest {
            dao: DAO,
            setup_ref: PluginSetupRef {
                plugin_setup_repo: REPO,
                version_tag: VersionTag::new(1, 1),
            },
            data: Bytes::from(vec![0xde, 0xad]),
        }
    }

    fn helpers() -> Vec<Address> {
        vec![
            address!("0000000000000000000000000000000000000001"),
            address!("0000000000000000000000000000000000000002"),
        ]
    }

    #[tokio::test]
    async fn prepare_commits_to_returned_helpers() {
        let chain = MockChain::default();
        chain.set_prepared_helpers(helpers());
        let processor = chain.processor(PSP);

        let prepared = request().prepare(&processor).await.unwrap();
        assert_eq!(prepared.setup_data().helpers, helpers());
        assert_eq!(chain.tx_count(), 1);
        assert_ne!(prepared.prepare_tx, B256::ZERO);
        assert_eq!(prepared.helpers_hash(), hash_helpers(&helpers()));
        // prepare leaves DAO permissions untouched
        assert!(chain.batches().is_empty());
        assert!(!chain.is_granted_now(DAO, prepared.plugin(), Permission::Execute));
    }

    #[tokio::test]
    async fn tampered_helpers_hash_is_rejected() {
        let chain = MockChain::default();
        chain.set_prepared_helpers(helpers());
        chain.set_granted(DAO, PSP, Permission::Root, true);
        chain.set_granted(PSP, DEPLOYER, Permission::ApplyInstallation, true);
        let processor = chain.processor(PSP);

        let prepared = request().prepare(&processor).await.unwrap();
        let tampered = ApplyInstallation {
            setup_ref: request().setup_ref,
            plugin: prepared.plugin(),
            permissions: prepared.setup_data().permissions.clone(),
            helpers_hash: hash_helpers(&[
                address!("0000000000000000000000000000000000000001"),
                address!("0000000000000000000000000000000000000003"),
            ]),
        };

        let err = processor.apply_installation(DAO, &tampered).await.unwrap_err();
        assert!(matches!(err, ChainError::Reverted { ref reason, .. } if reason.contains("InvalidAppliedSetupId")));
        assert!(!chain.is_granted_now(DAO, prepared.plugin(), Permission::Execute));

        // the untampered preparation still applies
        let applied = prepared.apply(&processor).await.unwrap();
        assert!(chain.is_granted_now(DAO, applied.plugin, Permission::Execute));
    }

    #[tokio::test]
    async fn install_opens_and_closes_the_root_window() {
        let chain = MockChain::default();
        chain.set_prepared_helpers(helpers());
        chain.set_granted(DAO, DEPLOYER, Permission::Root, true);
        let manager = chain.manager(DAO);
        let processor = chain.processor(PSP);

        let applied = install_plugin(
            &manager,
            &processor,
            DEPLOYER,
            request(),
            Permission::Execute,
            |_| Ok(()),
        )
        .await
        .unwrap();

        assert_eq!(applied.dao, DAO);
        assert_eq!(applied.helpers, helpers());
        assert!(chain.is_granted_now(DAO, applied.plugin, Permission::Execute));
        assert!(!chain.is_granted_now(DAO, PSP, Permission::Root));
        assert!(!chain.is_granted_now(PSP, DEPLOYER, Permission::ApplyInstallation));
        // the deployer's own root is left for the conclude step
        assert!(chain.is_granted_now(DAO, DEPLOYER, Permission::Root));

        let batches = chain.batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0], root_window(DAO, PSP, DEPLOYER).to_vec());
        assert_eq!(batches[1], close_root_window(DAO, PSP, DEPLOYER).to_vec());

        // prepare, open, apply, close
        assert_eq!(applied.transactions.len(), 4);
        assert_eq!(chain.tx_count(), 4);
    }

    #[tokio::test]
    async fn applied_plugin_is_reported_before_the_window_closes() {
        let chain = MockChain::default();
        chain.set_granted(DAO, DEPLOYER, Permission::Root, true);
        let manager = chain.manager(DAO);
        let processor = chain.processor(PSP);
        let reported = std::cell::Cell::new(None);

        // the open batch goes through, the close is the one that fails
        let err = install_plugin(
            &manager,
            &processor,
            DEPLOYER,
            request(),
            Permission::Execute,
            |applied| {
                chain.fail_next_batch("out of gas");
                reported.set(Some(applied.plugin));
                Ok(())
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, DeployError::Chain(ChainError::Reverted { .. })));
        let plugin = reported.get().unwrap();
        assert!(chain.is_granted_now(DAO, plugin, Permission::Execute));
        assert!(chain.is_granted_now(DAO, PSP, Permission::Root));
    }

    #[tokio::test]
    async fn open_window_is_reused_and_left_open() {
        let chain = MockChain::default();
        chain.set_granted(DAO, DEPLOYER, Permission::Root, true);
        chain.set_granted(DAO, PSP, Permission::Root, true);
        chain.set_granted(PSP, DEPLOYER, Permission::ApplyInstallation, true);
        let manager = chain.manager(DAO);
        let processor = chain.processor(PSP);

        let applied = apply_in_root_window(&manager, &processor, DEPLOYER, request())
            .await
            .unwrap();

        // prepare, apply
        assert_eq!(applied.transactions.len(), 2);
        assert!(chain.batches().is_empty());
        assert!(chain.is_granted_now(DAO, PSP, Permission::Root));
        assert!(chain.is_granted_now(DAO, applied.plugin, Permission::Execute));
    }

    #[tokio::test]
    async fn install_requires_deployer_root() {
        let chain = MockChain::default();
        let manager = chain.manager(DAO);
        let processor = chain.processor(PSP);

        let err = install_plugin(
            &manager,
            &processor,
            DEPLOYER,
            request(),
            Permission::Execute,
            |_| Ok(()),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            DeployError::Precondition(PreconditionError::MissingRoot { dao, who }) if dao == DAO && who == DEPLOYER
        ));
        assert!(chain.batches().is_empty());
    }

    #[tokio::test]
    async fn missing_execute_after_apply_is_a_postcondition_failure() {
        let chain = MockChain::default();
        chain.set_prepared_helpers(helpers());
        chain.set_prepared_grants_execute(false);
        chain.set_granted(DAO, DEPLOYER, Permission::Root, true);
        let manager = chain.manager(DAO);
        let processor = chain.processor(PSP);

        let err = install_plugin(
            &manager,
            &processor,
            DEPLOYER,
            request(),
            Permission::Execute,
            |_| Ok(()),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DeployError::Postcondition(_)));
    }
}
