//! Shared types for permission reconciliation and plugin installation.
//!
//! Used by the deployer's on-chain bindings and by its off-chain mocks, so both sides agree on
//! the permission table, the operation encoding and the helpers-hash commitment.

pub mod abi;
pub mod facts;
pub mod named;
pub mod operations;
pub mod permissions;
pub mod setup;

pub use facts::{ChainError, EnsRegistry, PermissionManager, PluginRepo, PluginSetupProcessor};
pub use named::NamedAddress;
pub use operations::{Operation, PermissionOperation};
pub use permissions::Permission;
pub use setup::{
    hash_helpers, ApplyInstallation, PluginSetupRef, PreparedPlugin, PreparedSetupData, Version,
    VersionTag,
};
