use std::fmt;

use alloy_primitives::{keccak256, Address, Bytes, B256};
use alloy_sol_types::SolValue;

use crate::{
    abi::{MultiTargetPermission, PreparedSetup, RepoVersion, SetupRef, Tag},
    operations::PermissionOperation,
};

/// Identifies a plugin build inside a repo.
///
/// Ordering is by release first, then build.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VersionTag {
    pub release: u8,
    pub build: u16,
}

impl VersionTag {
    pub fn new(release: u8, build: u16) -> Self {
        Self { release, build }
    }
}

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}", self.release, self.build)
    }
}

impl From<VersionTag> for Tag {
    fn from(tag: VersionTag) -> Self {
        Tag {
            release: tag.release,
            build: tag.build,
        }
    }
}

impl From<Tag> for VersionTag {
    fn from(tag: Tag) -> Self {
        Self {
            release: tag.release,
            build: tag.build,
        }
    }
}

/// A version stored in a plugin repo.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Version {
    pub tag: VersionTag,
    pub plugin_setup: Address,
    pub build_metadata: Bytes,
}

impl From<RepoVersion> for Version {
    fn from(v: RepoVersion) -> Self {
        Self {
            tag: v.tag.into(),
            plugin_setup: v.pluginSetup,
            build_metadata: v.buildMetadata,
        }
    }
}

/// Which plugin setup (repo + version) an installation uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PluginSetupRef {
    pub plugin_setup_repo: Address,
    pub version_tag: VersionTag,
}

impl From<&PluginSetupRef> for SetupRef {
    fn from(r: &PluginSetupRef) -> Self {
        SetupRef {
            versionTag: r.version_tag.into(),
            pluginSetupRepo: r.plugin_setup_repo,
        }
    }
}

/// What a plugin setup's prepare step asks for: helper contracts and the permissions to apply.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PreparedSetupData {
    pub helpers: Vec<Address>,
    pub permissions: Vec<PermissionOperation>,
}

impl PreparedSetupData {
    /// The commitment the processor checks on apply.
    pub fn helpers_hash(&self) -> B256 {
        hash_helpers(&self.helpers)
    }
}

impl TryFrom<PreparedSetup> for PreparedSetupData {
    /// The unknown operation code.
    type Error = u8;

    fn try_from(data: PreparedSetup) -> Result<Self, Self::Error> {
        let permissions = data
            .permissions
            .into_iter()
            .map(PermissionOperation::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            helpers: data.helpers,
            permissions,
        })
    }
}

/// Result of `prepareInstallation`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreparedPlugin {
    pub plugin: Address,
    pub setup_data: PreparedSetupData,
    pub tx: B256,
}

/// Arguments of `applyInstallation` for one prepared plugin.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApplyInstallation {
    pub setup_ref: PluginSetupRef,
    pub plugin: Address,
    pub permissions: Vec<PermissionOperation>,
    pub helpers_hash: B256,
}

impl ApplyInstallation {
    pub fn permission_items(&self) -> Vec<MultiTargetPermission> {
        self.permissions.iter().map(MultiTargetPermission::from).collect()
    }
}

/// `keccak256(abi.encode(address[] helpers))`.
pub fn hash_helpers(helpers: &[Address]) -> B256 {
    keccak256((helpers.to_vec(),).abi_encode_params())
}
