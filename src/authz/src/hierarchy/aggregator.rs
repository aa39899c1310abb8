//! Effective permission aggregation over resolved role chains

use super::resolver::RoleHierarchy;
use crate::types::{Permission, PermissionKey, Role, RoleId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Direct permissions attached to each role
pub type RolePermissionMap = HashMap<RoleId, Vec<Permission>>;

/// Effective permission together with the roles it came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub permission: Permission,

    /// Roles whose own permission record supplied this key
    pub source_role_ids: Vec<RoleId>,
}

/// Ordered grant list deduplicated by [`PermissionKey`]
#[derive(Debug, Default)]
struct GrantSet {
    grants: Vec<PermissionGrant>,
    index: HashMap<PermissionKey, usize>,
}

impl GrantSet {
    /// Insert along one chain: a later (closer to leaf) record replaces an
    /// earlier one in place.
    fn override_with(&mut self, permission: &Permission, source: RoleId) {
        match self.index.get(&permission.key()) {
            Some(&slot) => {
                self.grants[slot] = PermissionGrant {
                    permission: permission.clone(),
                    source_role_ids: vec![source],
                };
            }
            None => self.push(permission.clone(), vec![source]),
        }
    }

    /// Insert across roles: the first record for a key is kept, later
    /// sources are only accumulated.
    fn merge(&mut self, grant: PermissionGrant) {
        match self.index.get(&grant.permission.key()) {
            Some(&slot) => {
                let existing = &mut self.grants[slot].source_role_ids;
                for source in grant.source_role_ids {
                    if !existing.contains(&source) {
                        existing.push(source);
                    }
                }
            }
            None => self.push(grant.permission, grant.source_role_ids),
        }
    }

    fn push(&mut self, permission: Permission, source_role_ids: Vec<RoleId>) {
        self.index.insert(permission.key(), self.grants.len());
        self.grants.push(PermissionGrant {
            permission,
            source_role_ids,
        });
    }
}

impl<'a> RoleHierarchy<'a> {
    /// Effective grants of one role, root ancestor first.
    ///
    /// Inactive roles on the chain and inactive permissions contribute
    /// nothing. An inactive `role` itself grants nothing.
    pub fn effective_grants(
        &self,
        role: &Role,
        role_permissions: &RolePermissionMap,
    ) -> Vec<PermissionGrant> {
        if !role.is_active {
            return Vec::new();
        }

        let mut set = GrantSet::default();
        for member in self.inheritance_path(role) {
            if !member.is_active {
                continue;
            }
            let Some(permissions) = role_permissions.get(&member.id) else {
                continue;
            };
            for permission in permissions.iter().filter(|p| p.is_active) {
                set.override_with(permission, member.id);
            }
        }

        set.grants
    }

    /// Union of the effective grants of several roles, in the order supplied.
    ///
    /// Unknown and inactive role ids are skipped.
    pub fn effective_grants_for_roles(
        &self,
        role_ids: &[RoleId],
        role_permissions: &RolePermissionMap,
    ) -> Vec<PermissionGrant> {
        let mut set = GrantSet::default();
        for role in role_ids.iter().filter_map(|id| self.get(id)) {
            for grant in self.effective_grants(role, role_permissions) {
                set.merge(grant);
            }
        }
        set.grants
    }
}

/// Effective permissions of `role` (own + inherited), root ancestor first
pub fn effective_permissions(
    role: &Role,
    all_roles: &[Role],
    role_permissions: &RolePermissionMap,
) -> Vec<Permission> {
    RoleHierarchy::new(all_roles)
        .effective_grants(role, role_permissions)
        .into_iter()
        .map(|grant| grant.permission)
        .collect()
}

/// Effective permissions of a principal holding `role_ids`
pub fn effective_permissions_for_roles(
    role_ids: &[RoleId],
    all_roles: &[Role],
    role_permissions: &RolePermissionMap,
) -> Vec<Permission> {
    RoleHierarchy::new(all_roles)
        .effective_grants_for_roles(role_ids, role_permissions)
        .into_iter()
        .map(|grant| grant.permission)
        .collect()
}
