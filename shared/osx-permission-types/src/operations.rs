use alloy_primitives::{Address, B256};

use crate::{abi::MultiTargetPermission, permissions::Permission};

/// `PermissionLib.Operation`, in on-chain order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Operation {
    Grant = 0,
    Revoke = 1,
    GrantWithCondition = 2,
}

impl Operation {
    /// Whether the operation leaves the permission granted.
    pub fn wants_granted(self) -> bool {
        match self {
            Operation::Grant | Operation::GrantWithCondition => true,
            Operation::Revoke => false,
        }
    }
}

impl TryFrom<u8> for Operation {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let op = match value {
            0 => Operation::Grant,
            1 => Operation::Revoke,
            2 => Operation::GrantWithCondition,
            other => return Err(other),
        };
        Ok(op)
    }
}

/// A desired edge in the permission graph: `who` may (or may not) call `permission_id` on
/// `target` (the on-chain `where`).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PermissionOperation {
    pub operation: Operation,
    pub target: Address,
    pub who: Address,
    pub permission_id: B256,
    pub condition: Option<Address>,
}

impl PermissionOperation {
    pub fn grant(target: Address, who: Address, permission: Permission) -> Self {
        Self::new(Operation::Grant, target, who, permission.id())
    }

    pub fn revoke(target: Address, who: Address, permission: Permission) -> Self {
        Self::new(Operation::Revoke, target, who, permission.id())
    }

    pub fn grant_with_condition(
        target: Address,
        who: Address,
        permission: Permission,
        condition: Address,
    ) -> Self {
        Self {
            condition: Some(condition),
            ..Self::new(Operation::GrantWithCondition, target, who, permission.id())
        }
    }

    /// Build from a raw id, eg one returned by a plugin setup.
    pub fn new(operation: Operation, target: Address, who: Address, permission_id: B256) -> Self {
        Self {
            operation,
            target,
            who,
            permission_id,
            condition: None,
        }
    }

    /// Human-readable permission name, falling back to the raw id.
    pub fn permission_label(&self) -> String {
        Permission::from_id(self.permission_id)
            .map(|p| p.name().to_string())
            .unwrap_or_else(|| self.permission_id.to_string())
    }
}

impl From<&PermissionOperation> for MultiTargetPermission {
    fn from(op: &PermissionOperation) -> Self {
        MultiTargetPermission {
            operation: op.operation as u8,
            target: op.target,
            who: op.who,
            condition: op.condition.unwrap_or(Address::ZERO),
            permissionId: op.permission_id,
        }
    }
}

impl TryFrom<MultiTargetPermission> for PermissionOperation {
    type Error = u8;

    fn try_from(item: MultiTargetPermission) -> Result<Self, Self::Error> {
        let operation = Operation::try_from(item.operation)?;
        let condition = (item.condition != Address::ZERO).then_some(item.condition);
        Ok(Self {
            operation,
            target: item.target,
            who: item.who,
            permission_id: item.permissionId,
            condition,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn operation_codes_match_permission_lib() {
        assert_eq!(Operation::Grant as u8, 0);
        assert_eq!(Operation::Revoke as u8, 1);
        assert_eq!(Operation::GrantWithCondition as u8, 2);
        assert_eq!(Operation::try_from(2), Ok(Operation::GrantWithCondition));
        assert_eq!(Operation::try_from(3), Err(3));
    }

    #[test]
    fn missing_condition_encodes_as_zero_address() {
        let dao = address!("00000000000000000000000000000000000000aa");
        let plugin = address!("00000000000000000000000000000000000000bb");
        let op = PermissionOperation::grant(dao, plugin, Permission::Execute);

        let item = MultiTargetPermission::from(&op);
        assert_eq!(item.condition, Address::ZERO);
        assert_eq!(item.operation, 0);
        assert_eq!(item.permissionId, Permission::Execute.id());

        // and decodes back to `None`
        assert_eq!(PermissionOperation::try_from(item), Ok(op));
    }

    #[test]
    fn condition_survives_conversion() {
        let dao = address!("00000000000000000000000000000000000000aa");
        let who = address!("00000000000000000000000000000000000000bb");
        let condition = address!("00000000000000000000000000000000000000cc");
        let op = PermissionOperation::grant_with_condition(dao, who, Permission::Execute, condition);

        let item = MultiTargetPermission::from(&op);
        assert_eq!(item.condition, condition);
        assert_eq!(item.operation, 2);
        assert_eq!(PermissionOperation::try_from(item).map(|o| o.condition), Ok(Some(condition)));
    }

    #[test]
    fn unknown_permission_labels_fall_back_to_id() {
        let op = PermissionOperation::new(Operation::Grant, Address::ZERO, Address::ZERO, B256::ZERO);
        assert_eq!(op.permission_label(), B256::ZERO.to_string());

        let op = PermissionOperation::grant(Address::ZERO, Address::ZERO, Permission::Root);
        assert_eq!(op.permission_label(), "ROOT_PERMISSION");
    }
}
