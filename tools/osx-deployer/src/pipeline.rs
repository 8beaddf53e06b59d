//! Tagged, dependency-ordered deployment steps.
//!
//! Each step reads what it needs through the address registry, reconciles chain state and records
//! anything new, so a rerun after a failure picks up where the last run stopped.

use std::collections::BTreeSet;

use alloy_primitives::Address;
use osx_permission_types::{
    EnsRegistry, NamedAddress, Permission, PermissionManager, PermissionOperation, PluginRepo,
    PluginSetupProcessor, PluginSetupRef,
};
use tracing::{info, warn};

use crate::{
    addresses::{get_contract_address, ActiveContracts, Contract},
    config::Config,
    encoder::encode_multisig_install_data,
    ens::{ensure_domain_delegated, ensure_subdomain_available},
    errors::{DeployError, PreconditionError, ResolveError},
    installer::{close_root_window, install_plugin, InstallationRequest},
    permissions::{
        ensure_granted, ensure_permission, manage_permissions, plan_permissions, ManageOutcome,
    },
    repo::{plan_version, publish_version, PublishOutcome},
    session::DeploymentSession,
};

/// Handles onto the contracts a run talks to.
pub trait Bindings {
    type Manager: PermissionManager;
    type Processor: PluginSetupProcessor;
    type Repo: PluginRepo;
    type Ens: EnsRegistry;

    /// Account that signs every transaction.
    fn deployer(&self) -> Address;
    fn permission_manager(&self, address: Address) -> Self::Manager;
    fn setup_processor(&self, address: Address) -> Self::Processor;
    fn plugin_repo(&self, address: Address) -> Self::Repo;
    fn ens(&self, address: Address) -> Self::Ens;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum StepId {
    FrameworkPermissions,
    PublishPluginVersion,
    ManagementDaoMultisig,
    Conclude,
}

impl StepId {
    pub fn name(self) -> &'static str {
        match self {
            StepId::FrameworkPermissions => "framework-permissions",
            StepId::PublishPluginVersion => "publish-plugin-version",
            StepId::ManagementDaoMultisig => "management-dao-multisig",
            StepId::Conclude => "conclude",
        }
    }
}

pub struct Step {
    pub id: StepId,
    pub tags: &'static [&'static str],
    pub dependencies: &'static [StepId],
}

/// Every step, dependencies first.
pub const STEPS: [Step; 4] = [
    Step {
        id: StepId::FrameworkPermissions,
        tags: &["New", "permissions"],
        dependencies: &[],
    },
    Step {
        id: StepId::PublishPluginVersion,
        tags: &["New", "plugin-repo"],
        dependencies: &[],
    },
    Step {
        id: StepId::ManagementDaoMultisig,
        tags: &["New", "management-dao"],
        dependencies: &[StepId::PublishPluginVersion],
    },
    Step {
        id: StepId::Conclude,
        tags: &["New", "conclude"],
        dependencies: &[StepId::ManagementDaoMultisig],
    },
];

/// Steps carrying any of `tags` plus everything they depend on, in declaration order.
/// No tags selects every step.
pub fn select_steps(steps: &[Step], tags: &[String]) -> Vec<StepId> {
    let mut selected: BTreeSet<StepId> = steps
        .iter()
        .filter(|step| {
            tags.is_empty()
                || step
                    .tags
                    .iter()
                    .any(|t| tags.iter().any(|wanted| t.eq_ignore_ascii_case(wanted)))
        })
        .map(|step| step.id)
        .collect();

    loop {
        let before = selected.len();
        let dependencies: Vec<StepId> = steps
            .iter()
            .filter(|step| selected.contains(&step.id))
            .flat_map(|step| step.dependencies.iter().copied())
            .collect();
        selected.extend(dependencies);
        if selected.len() == before {
            break;
        }
    }

    steps
        .iter()
        .map(|step| step.id)
        .filter(|id| selected.contains(id))
        .collect()
}

/// Framework permission edges, all managed by the management DAO.
pub struct FrameworkAddresses {
    pub management_dao: Address,
    pub dao_registry: Address,
    pub dao_factory: Address,
    pub plugin_repo_registry: Address,
    pub plugin_repo_factory: Address,
    pub dao_registrar: Address,
    pub plugin_registrar: Address,
}

pub fn framework_permission_operations(a: &FrameworkAddresses) -> Vec<PermissionOperation> {
    vec![
        PermissionOperation::grant(a.dao_registry, a.dao_factory, Permission::RegisterDao),
        PermissionOperation::grant(
            a.plugin_repo_registry,
            a.plugin_repo_factory,
            Permission::RegisterPluginRepo,
        ),
        PermissionOperation::grant(a.dao_registrar, a.dao_registry, Permission::RegisterEnsSubdomain),
        PermissionOperation::grant(
            a.plugin_registrar,
            a.plugin_repo_registry,
            Permission::RegisterEnsSubdomain,
        ),
        PermissionOperation::grant(a.dao_registry, a.management_dao, Permission::UpgradeRegistry),
        PermissionOperation::grant(
            a.plugin_repo_registry,
            a.management_dao,
            Permission::UpgradeRegistry,
        ),
        PermissionOperation::grant(a.dao_registrar, a.management_dao, Permission::UpgradeRegistrar),
        PermissionOperation::grant(
            a.plugin_registrar,
            a.management_dao,
            Permission::UpgradeRegistrar,
        ),
    ]
}

/// One run over the selected steps.
pub struct Pipeline<'a, B: Bindings> {
    config: &'a Config,
    bindings: &'a B,
    session: DeploymentSession,
    registry: ActiveContracts,
}

impl<'a, B: Bindings> Pipeline<'a, B> {
    pub fn new(
        config: &'a Config,
        bindings: &'a B,
        session: DeploymentSession,
        registry: ActiveContracts,
    ) -> Self {
        Self {
            config,
            bindings,
            session,
            registry,
        }
    }

    pub fn into_parts(self) -> (DeploymentSession, ActiveContracts) {
        (self.session, self.registry)
    }

    pub async fn run(&mut self, steps: &[StepId]) -> Result<(), DeployError> {
        for &step in steps {
            info!(step = step.name(), network = %self.session.network, "running step");
            match step {
                StepId::FrameworkPermissions => self.framework_permissions().await?,
                StepId::PublishPluginVersion => self.publish_plugin_version().await?,
                StepId::ManagementDaoMultisig => self.management_dao_multisig().await?,
                StepId::Conclude => self.conclude().await?,
            }
            self.registry.save()?;
        }
        info!(
            transactions = self.session.transactions().len(),
            queued = self.session.actions().len(),
            "pipeline finished"
        );
        Ok(())
    }

    fn resolve(&self, contract: Contract) -> Result<Address, ResolveError> {
        get_contract_address(contract.name(), &self.session, &self.registry)
    }

    /// Send the pending part of `operations`, or queue it when proposing.
    async fn reconcile(
        &mut self,
        manager: &B::Manager,
        operations: &[PermissionOperation],
    ) -> Result<(), DeployError> {
        if self.session.propose {
            if let Some(action) = plan_permissions(manager, operations).await? {
                self.session.queue_action(action);
            }
        } else if let ManageOutcome::Applied { tx, .. } =
            manage_permissions(manager, operations).await?
        {
            self.session.record_tx(tx);
        }
        Ok(())
    }

    async fn framework_permissions(&mut self) -> Result<(), DeployError> {
        let addresses = FrameworkAddresses {
            management_dao: self.resolve(Contract::ManagementDao)?,
            dao_registry: self.resolve(Contract::DaoRegistry)?,
            dao_factory: self.resolve(Contract::DaoFactory)?,
            plugin_repo_registry: self.resolve(Contract::PluginRepoRegistry)?,
            plugin_repo_factory: self.resolve(Contract::PluginRepoFactory)?,
            dao_registrar: self.resolve(Contract::DaoEnsSubdomainRegistrar)?,
            plugin_registrar: self.resolve(Contract::PluginEnsSubdomainRegistrar)?,
        };

        let ens = self.bindings.ens(self.resolve(Contract::EnsRegistry)?);
        ensure_domain_delegated(&ens, &self.config.dao_ens_domain, addresses.dao_registrar).await?;
        ensure_domain_delegated(
            &ens,
            &self.config.plugin_ens_domain,
            addresses.plugin_registrar,
        )
        .await?;

        let manager = self.bindings.permission_manager(addresses.management_dao);
        self.reconcile(&manager, &framework_permission_operations(&addresses))
            .await
    }

    async fn publish_plugin_version(&mut self) -> Result<(), DeployError> {
        let repo = self.bindings.plugin_repo(self.resolve(Contract::MultisigRepo)?);
        let setup = self.resolve(Contract::MultisigSetup)?;
        let settings = &self.config.publish;

        if self.session.propose {
            if let Some(action) = plan_version(&repo, setup, settings).await? {
                self.session.queue_action(action);
            }
        } else if let PublishOutcome::Published { tx, .. } =
            publish_version(&repo, setup, settings).await?
        {
            self.session.record_tx(tx);
        }
        Ok(())
    }

    async fn management_dao_multisig(&mut self) -> Result<(), DeployError> {
        let dao = NamedAddress::new(
            self.config.management_dao_ens_name(),
            self.resolve(Contract::ManagementDao)?,
        );
        let psp = self.resolve(Contract::PluginSetupProcessor)?;
        let deployer = self.session.deployer;
        let manager = self.bindings.permission_manager(dao.address);

        let recorded = match self.session.get(Contract::ManagementDaoMultisig.name()) {
            Some(plugin) => Some(plugin),
            None => self
                .registry
                .get(&self.session.network, Contract::ManagementDaoMultisig.name())?,
        };
        if let Some(existing) = recorded {
            info!(multisig = %existing, "management DAO multisig already installed");
            // an earlier run may have stopped before closing the window
            self.reconcile(&manager, &close_root_window(dao.address, psp, deployer))
                .await?;
            if !self.session.propose {
                ensure_granted(&manager, dao.address, existing, Permission::Execute).await?;
            }
            return Ok(());
        }
        if self.session.propose {
            warn!("plugin installation needs the deployer's root; skipped while proposing");
            return Ok(());
        }

        let ens = self.bindings.ens(self.resolve(Contract::EnsRegistry)?);
        ensure_subdomain_available(
            &ens,
            &dao.name,
            self.resolve(Contract::DaoEnsSubdomainRegistrar)?,
        )
        .await?;

        let multisig = &self.config.multisig;
        let members = if multisig.approvers.is_empty() {
            vec![deployer]
        } else {
            multisig.approvers.clone()
        };
        let data =
            encode_multisig_install_data(&members, multisig.listed_only, multisig.min_approvals)?;

        let repo_address = self.resolve(Contract::MultisigRepo)?;
        let latest = self
            .bindings
            .plugin_repo(repo_address)
            .latest_version()
            .await?
            .ok_or(PreconditionError::EmptyRepo { repo: repo_address })?;

        info!(%dao, members = members.len(), version = %latest.tag, "installing multisig");
        let request = InstallationRequest {
            dao: dao.address,
            setup_ref: PluginSetupRef {
                plugin_setup_repo: repo_address,
                version_tag: latest.tag,
            },
            data,
        };
        let processor = self.bindings.setup_processor(psp);
        let (session, registry) = (&mut self.session, &mut self.registry);
        let applied = install_plugin(
            &manager,
            &processor,
            deployer,
            request,
            Permission::Execute,
            |applied| {
                let name = Contract::ManagementDaoMultisig.name();
                session.record(name, applied.plugin);
                registry.record(&session.network, name, applied.plugin);
                registry.save()?;
                Ok(())
            },
        )
        .await?;

        for tx in applied.transactions {
            self.session.record_tx(tx);
        }
        Ok(())
    }

    async fn conclude(&mut self) -> Result<(), DeployError> {
        let dao = self.resolve(Contract::ManagementDao)?;
        let manager = self.bindings.permission_manager(dao);

        let executor = match self.resolve(Contract::ManagementDaoMultisig) {
            Ok(plugin) => Some(plugin),
            Err(ResolveError::NotDeployed { .. }) => None,
            Err(e) => return Err(e.into()),
        };
        let can_execute = match executor {
            Some(plugin) => {
                manager
                    .is_granted(dao, plugin, Permission::Execute.id(), &[])
                    .await?
            }
            None => false,
        };
        if !can_execute {
            return Err(PreconditionError::NoExecutor { dao }.into());
        }

        let deployer = self.session.deployer;
        self.reconcile(
            &manager,
            &[PermissionOperation::revoke(dao, deployer, Permission::Root)],
        )
        .await?;
        if !self.session.propose {
            ensure_permission(&manager, dao, deployer, Permission::Root, false).await?;
        }
        Ok(())
    }
}
