//! Solidity ABI surface of the framework contracts this tooling talks to.
//!
//! Field names are local; only the types and their order matter for the encoding. `where` is a
//! Rust keyword, so `PermissionLib.MultiTargetPermission.where` is spelled `target` here.

use alloy_sol_types::sol;

sol! {
    /// `PermissionLib.MultiTargetPermission`.
    #[derive(Debug, PartialEq, Eq)]
    struct MultiTargetPermission {
        uint8 operation;
        address target;
        address who;
        address condition;
        bytes32 permissionId;
    }

    /// `PluginRepo.Tag`.
    #[derive(Debug, PartialEq, Eq)]
    struct Tag {
        uint8 release;
        uint16 build;
    }

    /// `PluginRepo.Version`.
    #[derive(Debug, PartialEq, Eq)]
    struct RepoVersion {
        Tag tag;
        address pluginSetup;
        bytes buildMetadata;
    }

    /// `PluginSetupRef` (note: the tag comes first).
    #[derive(Debug, PartialEq, Eq)]
    struct SetupRef {
        Tag versionTag;
        address pluginSetupRepo;
    }

    /// `IPluginSetup.PreparedSetupData`.
    #[derive(Debug, PartialEq, Eq)]
    struct PreparedSetup {
        address[] helpers;
        MultiTargetPermission[] permissions;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct PrepareInstallationParams {
        SetupRef pluginSetupRef;
        bytes data;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct ApplyInstallationParams {
        SetupRef pluginSetupRef;
        address plugin;
        MultiTargetPermission[] permissions;
        bytes32 helpersHash;
    }

    /// Multisig plugin settings as decoded by its setup's `prepareInstallation`.
    #[derive(Debug, PartialEq, Eq)]
    struct MultisigSettings {
        bool onlyListed;
        uint16 minApprovals;
    }

    interface IPermissionManager {
        function isGranted(address _where, address _who, bytes32 _permissionId, bytes _data)
            external
            view
            returns (bool);
        function applyMultiTargetPermissions(MultiTargetPermission[] _items) external;
    }

    interface IPluginSetupProcessor {
        event InstallationPrepared(
            address indexed sender,
            address indexed dao,
            bytes32 preparedSetupId,
            address indexed pluginSetupRepo,
            Tag versionTag,
            bytes data,
            address plugin,
            PreparedSetup preparedSetupData
        );

        function prepareInstallation(address _dao, PrepareInstallationParams _params)
            external
            returns (address plugin, PreparedSetup preparedSetupData);
        function applyInstallation(address _dao, ApplyInstallationParams _params) external;
    }

    interface IPluginRepo {
        function latestRelease() external view returns (uint8);
        function getLatestVersion(uint8 _release) external view returns (RepoVersion);
        function getVersion(Tag _tag) external view returns (RepoVersion);
        function createVersion(
            uint8 _release,
            address _pluginSetup,
            bytes _buildMetadata,
            bytes _releaseMetadata
        ) external;
    }

    interface IENS {
        function owner(bytes32 node) external view returns (address);
    }
}
