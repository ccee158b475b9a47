//! Role-rank discipline
//!
//! A smaller `sort` means more privilege. Every privileged mutation compares
//! the operator's minimum active rank against the ranks it touches, and the
//! comparison is always strict: equal rank is refused.

use std::collections::HashSet;
use std::hash::Hash;

use thiserror::Error;

use crate::models::{Admin, AdminUpdate, Role, Status};

/// Rank reserved for super-admin roles
pub const SUPER_ADMIN_RANK: i32 = 1;

/// Rank of an admin holding no active role
pub const NO_RANK: i32 = 999;

/// A refused mutation; the rule it broke is safe to show to the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RankViolation {
    #[error("cannot create equal-or-higher-rank admin")]
    CreateAdmin,
    #[error("cannot update equal-or-higher-rank admin")]
    UpdateAdmin,
    #[error("cannot assign equal-or-higher-rank roles")]
    AssignRole,
    #[error("cannot delete equal-or-higher-rank admin")]
    DeleteAdmin,
    #[error("cannot delete yourself")]
    DeleteSelf,
    #[error("cannot disable yourself")]
    DisableSelf,
    #[error("cannot change your own roles")]
    ChangeOwnRoles,
    #[error("cannot change your own password here, use the change-password endpoint")]
    ChangeOwnPassword,
    #[error("cannot create equal-or-higher-rank role")]
    CreateRole,
    #[error("cannot update equal-or-higher-rank role")]
    UpdateRole,
    #[error("cannot raise a role to equal-or-higher rank")]
    RaiseRole,
    #[error("cannot delete equal-or-higher-rank role")]
    DeleteRole,
    #[error("cannot grant menus you do not hold")]
    GrantMenus,
    #[error("cannot grant apis you do not hold")]
    GrantApis,
}

impl RankViolation {
    pub fn zh(self) -> &'static str {
        match self {
            RankViolation::CreateAdmin => "不能创建比自己等级高或相同等级的用户",
            RankViolation::UpdateAdmin => "不能更新比自己等级高或相同等级的用户",
            RankViolation::AssignRole => "不能把用户角色设置为比自己等级高或相同等级的角色",
            RankViolation::DeleteAdmin => "不能删除比自己等级高或相同等级的用户",
            RankViolation::DeleteSelf => "不能删除自己",
            RankViolation::DisableSelf => "不能禁用自己",
            RankViolation::ChangeOwnRoles => "不能更改自己的角色",
            RankViolation::ChangeOwnPassword => "请使用修改密码接口修改自己的密码",
            RankViolation::CreateRole => "不能创建比自己等级高或相同等级的角色",
            RankViolation::UpdateRole => "不能更新比自己等级高或相同等级的角色",
            RankViolation::RaiseRole => "不能把角色等级提高到比自己高或相同",
            RankViolation::DeleteRole => "不能删除比自己等级高或相同等级的角色",
            RankViolation::GrantMenus => "不能授予自己没有的菜单",
            RankViolation::GrantApis => "不能授予自己没有的接口",
        }
    }
}

/// Minimum `sort` over a set of roles, [`NO_RANK`] for an empty set
pub fn min_rank<'a>(roles: impl IntoIterator<Item = &'a Role>) -> i32 {
    roles.into_iter().map(|role| role.sort).min().unwrap_or(NO_RANK)
}

fn outranks(operator: i32, target: i32, violation: RankViolation) -> Result<(), RankViolation> {
    if operator < target {
        Ok(())
    } else {
        Err(violation)
    }
}

pub fn check_create_admin(operator: &Admin, requested: &[Role]) -> Result<(), RankViolation> {
    outranks(operator.min_rank(), min_rank(requested), RankViolation::CreateAdmin)
}

/// `target` is the admin as currently stored, `requested` the roles named
/// by `update`
pub fn check_update_admin(
    operator: &Admin,
    target: &Admin,
    update: &AdminUpdate,
    requested: &[Role],
) -> Result<(), RankViolation> {
    if operator.id == target.id {
        if update.status != Status::Active {
            return Err(RankViolation::DisableSelf);
        }
        let mut wanted = update.role_ids.clone();
        wanted.sort_unstable();
        wanted.dedup();
        if wanted != target.role_ids() {
            return Err(RankViolation::ChangeOwnRoles);
        }
        if update.password.is_some() {
            return Err(RankViolation::ChangeOwnPassword);
        }
        return Ok(());
    }

    let rank = operator.min_rank();
    outranks(rank, target.min_rank(), RankViolation::UpdateAdmin)?;
    outranks(rank, min_rank(requested), RankViolation::AssignRole)
}

/// `targets` pairs each id with that admin's current minimum rank
pub fn check_delete_admins(operator: &Admin, targets: &[(i64, i32)]) -> Result<(), RankViolation> {
    let rank = operator.min_rank();
    for (id, target_rank) in targets {
        if *id == operator.id {
            return Err(RankViolation::DeleteSelf);
        }
        outranks(rank, *target_rank, RankViolation::DeleteAdmin)?;
    }
    Ok(())
}

pub fn check_create_role(operator: &Admin, rank: i32) -> Result<(), RankViolation> {
    if operator.is_super_admin() {
        return Ok(());
    }
    outranks(operator.min_rank(), rank, RankViolation::CreateRole)
}

pub fn check_update_role(operator: &Admin, existing: i32, requested: i32) -> Result<(), RankViolation> {
    if operator.is_super_admin() {
        return Ok(());
    }
    let rank = operator.min_rank();
    outranks(rank, existing, RankViolation::UpdateRole)?;
    outranks(rank, requested, RankViolation::RaiseRole)
}

pub fn check_delete_role(operator: &Admin, rank: i32) -> Result<(), RankViolation> {
    if operator.is_super_admin() {
        return Ok(());
    }
    outranks(operator.min_rank(), rank, RankViolation::DeleteRole)
}

/// Granting menus or apis to a role: the role must rank below the operator
/// and the grant must be a subset of what the operator holds
pub fn check_grant<T: Eq + Hash>(
    operator: &Admin,
    role_rank: i32,
    requested: &HashSet<T>,
    held: &HashSet<T>,
    violation: RankViolation,
) -> Result<(), RankViolation> {
    if operator.is_super_admin() {
        return Ok(());
    }
    outranks(operator.min_rank(), role_rank, RankViolation::UpdateRole)?;
    if requested.is_subset(held) {
        Ok(())
    } else {
        Err(violation)
    }
}
