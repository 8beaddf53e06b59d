use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;
use osx_permission_types::{
    abi::{IPermissionManager, MultiTargetPermission},
    ChainError, Permission, PermissionManager, PermissionOperation,
};
use tracing::{debug, info};

use crate::{
    errors::{DeployError, PostconditionError},
    session::Action,
};

/// Result of reconciling a desired permission set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ManageOutcome {
    /// Every operation already holds; nothing was sent.
    UpToDate,
    /// The listed operations went out in transaction `tx`.
    Applied {
        tx: B256,
        operations: Vec<PermissionOperation>,
    },
}

/// Whether the chain already reflects `op`.
///
/// `GrantWithCondition` counts as satisfied whenever the permission is granted; the attached
/// condition contract is not compared.
pub async fn is_permission_set_correctly<M: PermissionManager>(
    manager: &M,
    op: &PermissionOperation,
    data: &[u8],
) -> Result<bool, ChainError> {
    let granted = manager
        .is_granted(op.target, op.who, op.permission_id, data)
        .await?;
    Ok(granted == op.operation.wants_granted())
}

/// The subset of `operations` that still needs a transaction, in input order.
pub async fn pending_operations<M: PermissionManager>(
    manager: &M,
    operations: &[PermissionOperation],
) -> Result<Vec<PermissionOperation>, ChainError> {
    let mut pending = Vec::new();
    for op in operations {
        if is_permission_set_correctly(manager, op, &[]).await? {
            debug!(
                permission = %op.permission_label(),
                target = %op.target,
                who = %op.who,
                "already set"
            );
        } else {
            pending.push(op.clone());
        }
    }
    Ok(pending)
}

/// Bring the chain in line with `operations` using at most one transaction.
pub async fn manage_permissions<M: PermissionManager>(
    manager: &M,
    operations: &[PermissionOperation],
) -> Result<ManageOutcome, ChainError> {
    let pending = pending_operations(manager, operations).await?;
    if pending.is_empty() {
        info!(manager = %manager.address(), "permissions up to date");
        return Ok(ManageOutcome::UpToDate);
    }

    for op in &pending {
        info!(
            operation = ?op.operation,
            permission = %op.permission_label(),
            target = %op.target,
            who = %op.who,
            "permission change"
        );
    }
    let tx = manager.apply_multi_target_permissions(&pending).await?;
    info!(manager = %manager.address(), %tx, applied = pending.len(), "permissions applied");
    Ok(ManageOutcome::Applied {
        tx,
        operations: pending,
    })
}

/// Like [`manage_permissions`], but return the batch as an action for the management DAO to
/// execute instead of sending it.
pub async fn plan_permissions<M: PermissionManager>(
    manager: &M,
    operations: &[PermissionOperation],
) -> Result<Option<Action>, ChainError> {
    let pending = pending_operations(manager, operations).await?;
    if pending.is_empty() {
        return Ok(None);
    }
    info!(manager = %manager.address(), queued = pending.len(), "permission changes queued");
    Ok(Some(Action {
        to: manager.address(),
        value: U256::ZERO,
        data: Bytes::from(apply_multi_target_calldata(&pending)),
    }))
}

/// Calldata of `applyMultiTargetPermissions(items)`.
pub fn apply_multi_target_calldata(operations: &[PermissionOperation]) -> Vec<u8> {
    IPermissionManager::applyMultiTargetPermissionsCall {
        _items: operations.iter().map(MultiTargetPermission::from).collect(),
    }
    .abi_encode()
}

/// Assert that `who` holds (or does not hold) `permission` on `target`.
pub async fn ensure_permission<M: PermissionManager>(
    manager: &M,
    target: Address,
    who: Address,
    permission: Permission,
    expected: bool,
) -> Result<(), DeployError> {
    let actual = manager.is_granted(target, who, permission.id(), &[]).await?;
    if actual != expected {
        return Err(PostconditionError::Permission {
            permission: permission.name().to_string(),
            target,
            who,
            expected,
            actual,
        }
        .into());
    }
    Ok(())
}

/// Shorthand for [`ensure_permission`] expecting the grant to hold.
pub async fn ensure_granted<M: PermissionManager>(
    manager: &M,
    target: Address,
    who: Address,
    permission: Permission,
) -> Result<(), DeployError> {
    ensure_permission(manager, target, who, permission, true).await
}
