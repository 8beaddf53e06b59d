//! In-memory chain for off-chain tests.
//!
//! One shared world backs every handle, so a permission applied through a manager is visible to
//! the processor and vice versa, the way a single management DAO stores all framework grants.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
};

use alloy_primitives::{address, Address, B256};
use osx_permission_types::{
    ApplyInstallation, ChainError, EnsRegistry, Operation, Permission, PermissionManager,
    PermissionOperation, PluginRepo, PluginSetupProcessor, PluginSetupRef, PreparedPlugin,
    PreparedSetupData, Version, VersionTag,
};

use crate::{ens::namehash, pipeline::Bindings};

pub const DEPLOYER: Address = address!("0000000000000000000000000000000000000de9");

#[derive(Default)]
struct World {
    grants: HashSet<(Address, Address, B256)>,
    batches: Vec<Vec<PermissionOperation>>,
    fail_next_batch: Option<String>,
    prepared_helpers: Vec<Address>,
    omit_execute: bool,
    prepared: HashMap<Address, (Address, Vec<Address>, Vec<PermissionOperation>)>,
    plugin_count: u16,
    tx_count: u64,
    repos: HashMap<Address, Vec<Version>>,
}

impl World {
    fn next_tx(&mut self) -> B256 {
        self.tx_count += 1;
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&self.tx_count.to_be_bytes());
        B256::from(bytes)
    }

    fn apply(&mut self, operations: &[PermissionOperation]) {
        for op in operations {
            let key = (op.target, op.who, op.permission_id);
            match op.operation {
                Operation::Grant | Operation::GrantWithCondition => {
                    self.grants.insert(key);
                }
                Operation::Revoke => {
                    self.grants.remove(&key);
                }
            }
        }
    }
}

/// Handle on the shared world; cheap to clone.
#[derive(Clone, Default)]
pub struct MockChain {
    world: Arc<Mutex<World>>,
    ens: MockEns,
}

impl MockChain {
    fn world(&self) -> MutexGuard<'_, World> {
        self.world.lock().unwrap()
    }

    pub fn manager(&self, address: Address) -> MockManager {
        MockManager {
            world: self.world.clone(),
            address,
        }
    }

    pub fn processor(&self, address: Address) -> MockProcessor {
        MockProcessor {
            world: self.world.clone(),
            address,
        }
    }

    pub fn repo(&self, address: Address) -> MockRepo {
        MockRepo {
            world: self.world.clone(),
            address,
        }
    }

    pub fn ens_registry(&self) -> MockEns {
        self.ens.clone()
    }

    pub fn set_granted(&self, target: Address, who: Address, permission: Permission, granted: bool) {
        let key = (target, who, permission.id());
        let mut world = self.world();
        if granted {
            world.grants.insert(key);
        } else {
            world.grants.remove(&key);
        }
    }

    pub fn is_granted_now(&self, target: Address, who: Address, permission: Permission) -> bool {
        self.world().grants.contains(&(target, who, permission.id()))
    }

    /// Every batch sent through a manager, in order.
    pub fn batches(&self) -> Vec<Vec<PermissionOperation>> {
        self.world().batches.clone()
    }

    pub fn fail_next_batch(&self, reason: &str) {
        self.world().fail_next_batch = Some(reason.to_string());
    }

    pub fn set_prepared_helpers(&self, helpers: Vec<Address>) {
        self.world().prepared_helpers = helpers;
    }

    /// Whether prepared installations ask for `EXECUTE_PERMISSION` on the DAO.
    pub fn set_prepared_grants_execute(&self, grants: bool) {
        self.world().omit_execute = !grants;
    }

    pub fn add_version(&self, repo: Address, tag: VersionTag, plugin_setup: Address) {
        self.world().repos.entry(repo).or_default().push(Version {
            tag,
            plugin_setup,
            build_metadata: Default::default(),
        });
    }

    pub fn versions(&self, repo: Address) -> Vec<Version> {
        self.world().repos.get(&repo).cloned().unwrap_or_default()
    }

    /// Number of installations prepared so far, applied or not.
    pub fn plugins_prepared(&self) -> u16 {
        self.world().plugin_count
    }

    pub fn tx_count(&self) -> u64 {
        self.world().tx_count
    }
}

impl Bindings for MockChain {
    type Manager = MockManager;
    type Processor = MockProcessor;
    type Repo = MockRepo;
    type Ens = MockEns;

    fn deployer(&self) -> Address {
        DEPLOYER
    }

    fn permission_manager(&self, address: Address) -> MockManager {
        self.manager(address)
    }

    fn setup_processor(&self, address: Address) -> MockProcessor {
        self.processor(address)
    }

    fn plugin_repo(&self, address: Address) -> MockRepo {
        self.repo(address)
    }

    fn ens(&self, _address: Address) -> MockEns {
        self.ens_registry()
    }
}

pub struct MockManager {
    world: Arc<Mutex<World>>,
    address: Address,
}

impl PermissionManager for MockManager {
    fn address(&self) -> Address {
        self.address
    }

    async fn is_granted(
        &self,
        target: Address,
        who: Address,
        permission_id: B256,
        _data: &[u8],
    ) -> Result<bool, ChainError> {
        Ok(self.world.lock().unwrap().grants.contains(&(target, who, permission_id)))
    }

    async fn apply_multi_target_permissions(
        &self,
        operations: &[PermissionOperation],
    ) -> Result<B256, ChainError> {
        let mut world = self.world.lock().unwrap();
        if let Some(reason) = world.fail_next_batch.take() {
            return Err(ChainError::Reverted { tx: None, reason });
        }
        world.apply(operations);
        world.batches.push(operations.to_vec());
        Ok(world.next_tx())
    }
}

pub struct MockProcessor {
    world: Arc<Mutex<World>>,
    address: Address,
}

impl PluginSetupProcessor for MockProcessor {
    fn address(&self) -> Address {
        self.address
    }

    async fn prepare_installation(
        &self,
        dao: Address,
        _setup_ref: &PluginSetupRef,
        _data: &[u8],
    ) -> Result<PreparedPlugin, ChainError> {
        let mut world = self.world.lock().unwrap();
        world.plugin_count += 1;
        let mut bytes = [0u8; 20];
        bytes[0] = 0x91;
        bytes[18..].copy_from_slice(&world.plugin_count.to_be_bytes());
        let plugin = Address::from(bytes);

        let mut permissions = vec![
            PermissionOperation::grant(plugin, dao, Permission::UpdateMultisigSettings),
            PermissionOperation::grant(plugin, dao, Permission::UpgradePlugin),
        ];
        if !world.omit_execute {
            permissions.insert(0, PermissionOperation::grant(dao, plugin, Permission::Execute));
        }
        let helpers = world.prepared_helpers.clone();
        world
            .prepared
            .insert(plugin, (dao, helpers.clone(), permissions.clone()));
        Ok(PreparedPlugin {
            plugin,
            setup_data: PreparedSetupData {
                helpers,
                permissions,
            },
            tx: world.next_tx(),
        })
    }

    async fn apply_installation(
        &self,
        dao: Address,
        params: &ApplyInstallation,
    ) -> Result<B256, ChainError> {
        let mut world = self.world.lock().unwrap();
        let revert = |reason: &str| ChainError::Reverted {
            tx: None,
            reason: reason.to_string(),
        };

        let Some((prepared_dao, helpers, permissions)) = world.prepared.get(&params.plugin).cloned()
        else {
            return Err(revert("SetupNotPrepared"));
        };
        if prepared_dao != dao
            || permissions != params.permissions
            || osx_permission_types::hash_helpers(&helpers) != params.helpers_hash
        {
            return Err(revert("InvalidAppliedSetupId"));
        }
        if !world.grants.contains(&(dao, self.address, Permission::Root.id())) {
            return Err(revert("Unauthorized(ROOT_PERMISSION)"));
        }
        if !world
            .grants
            .iter()
            .any(|(target, _, id)| *target == self.address && *id == Permission::ApplyInstallation.id())
        {
            return Err(revert("SetupApplicationUnauthorized"));
        }

        world.apply(&permissions);
        world.prepared.remove(&params.plugin);
        Ok(world.next_tx())
    }
}

pub struct MockRepo {
    world: Arc<Mutex<World>>,
    address: Address,
}

impl PluginRepo for MockRepo {
    fn address(&self) -> Address {
        self.address
    }

    async fn latest_version(&self) -> Result<Option<Version>, ChainError> {
        let world = self.world.lock().unwrap();
        Ok(world
            .repos
            .get(&self.address)
            .and_then(|versions| versions.iter().max_by_key(|v| v.tag).cloned()))
    }

    async fn get_version(&self, tag: VersionTag) -> Result<Version, ChainError> {
        let world = self.world.lock().unwrap();
        world
            .repos
            .get(&self.address)
            .and_then(|versions| versions.iter().find(|v| v.tag == tag).cloned())
            .ok_or_else(|| ChainError::Reverted {
                tx: None,
                reason: format!("VersionHashDoesNotExist({tag})"),
            })
    }

    async fn create_version(
        &self,
        release: u8,
        plugin_setup: Address,
        build_metadata: &[u8],
        release_metadata: &[u8],
    ) -> Result<B256, ChainError> {
        let mut world = self.world.lock().unwrap();
        let latest = world
            .repos
            .get(&self.address)
            .and_then(|versions| versions.iter().map(|v| v.tag).max());
        let latest_release = latest.map(|t| t.release).unwrap_or(0);

        let tag = if release == latest_release && release != 0 {
            let build = latest.map(|t| t.build).unwrap_or(0) + 1;
            VersionTag::new(release, build)
        } else if release == latest_release + 1 {
            if release_metadata.is_empty() {
                return Err(ChainError::Reverted {
                    tx: None,
                    reason: "EmptyReleaseMetadata".to_string(),
                });
            }
            VersionTag::new(release, 1)
        } else {
            return Err(ChainError::Reverted {
                tx: None,
                reason: "InvalidPluginReleaseIncrement".to_string(),
            });
        };

        world.repos.entry(self.address).or_default().push(Version {
            tag,
            plugin_setup,
            build_metadata: build_metadata.to_vec().into(),
        });
        Ok(world.next_tx())
    }
}

#[derive(Clone, Default)]
pub struct MockEns {
    owners: Arc<Mutex<HashMap<B256, Address>>>,
}

impl MockEns {
    pub fn set_owner(&self, name: &str, owner: Address) {
        self.owners.lock().unwrap().insert(namehash(name), owner);
    }
}

impl EnsRegistry for MockEns {
    async fn owner(&self, node: B256) -> Result<Address, ChainError> {
        Ok(self
            .owners
            .lock()
            .unwrap()
            .get(&node)
            .copied()
            .unwrap_or(Address::ZERO))
    }
}
