//! Role-based evaluation
//!
//! Resolves the principal's active roles, expands them through the role
//! hierarchy into effective permissions and matches the requested
//! `resource_type:action` in three tiers: exact, `resource_type:*`, `*:*`.

use crate::context::AuthorizationContext;
use crate::engine::decision::{DecisionReason, RbacVerdict};
use crate::error::Result;
use crate::hierarchy::{PermissionGrant, RoleHierarchy};
use crate::store::RoleStore;
use crate::types::{
    OrganizationId, Permission, PermissionAction, PrincipalId, Role, RoleId, WILDCARD,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// RBAC verdict with its reasons
#[derive(Debug, Clone, PartialEq)]
pub struct RbacOutcome {
    pub verdict: RbacVerdict,
    pub reasons: Vec<DecisionReason>,
}

/// Effective permission and the names of the roles that supplied it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPermission {
    pub permission: Permission,
    pub source_roles: Vec<String>,
}

/// Roles and effective grants of one principal in one organization
#[derive(Debug, Clone, Default)]
pub struct ResolvedGrants {
    /// Active assigned roles, in store order
    pub roles: Vec<Role>,
    pub grants: Vec<UserPermission>,
}

impl ResolvedGrants {
    pub fn role_names(&self) -> Vec<String> {
        self.roles.iter().map(|role| role.name.clone()).collect()
    }
}

pub struct RbacEvaluator {
    roles: Arc<dyn RoleStore>,
}

impl RbacEvaluator {
    pub fn new(roles: Arc<dyn RoleStore>) -> Self {
        Self { roles }
    }

    /// Active roles assigned to the principal in `organization_id`
    pub async fn active_roles(
        &self,
        principal_id: PrincipalId,
        organization_id: Option<OrganizationId>,
    ) -> Result<Vec<Role>> {
        let mut roles = self.roles.user_roles(principal_id, organization_id).await?;
        roles.retain(|role| role.is_active);
        Ok(roles)
    }

    /// Resolve active roles and their effective permissions.
    ///
    /// Hierarchies are resolved against the organization's role set; roles
    /// assigned to the principal but missing from that set are added to it.
    pub async fn resolve(
        &self,
        principal_id: PrincipalId,
        organization_id: Option<OrganizationId>,
    ) -> Result<ResolvedGrants> {
        let roles = self.active_roles(principal_id, organization_id).await?;
        if roles.is_empty() {
            return Ok(ResolvedGrants::default());
        }

        let mut all_roles = self.roles.organization_roles(organization_id).await?;
        for role in &roles {
            if !all_roles.iter().any(|known| known.id == role.id) {
                all_roles.push(role.clone());
            }
        }

        let hierarchy = RoleHierarchy::new(&all_roles);
        let role_ids: Vec<RoleId> = roles.iter().map(|role| role.id).collect();

        let mut chain_ids: Vec<RoleId> = Vec::new();
        let mut seen = HashSet::new();
        for role in &roles {
            for member in hierarchy.inheritance_path(role) {
                if seen.insert(member.id) {
                    chain_ids.push(member.id);
                }
            }
        }

        let role_permissions = self.roles.role_permissions(&chain_ids).await?;
        let grants = hierarchy
            .effective_grants_for_roles(&role_ids, &role_permissions)
            .into_iter()
            .map(|grant| named_grant(&hierarchy, grant))
            .collect();

        Ok(ResolvedGrants { roles, grants })
    }

    pub async fn evaluate(&self, ctx: &AuthorizationContext) -> Result<RbacOutcome> {
        let resolved = self.resolve(ctx.principal_id(), ctx.organization_id()).await?;

        if resolved.roles.is_empty() {
            debug!("Principal {} has no active roles", ctx.principal_id());
            return Ok(RbacOutcome {
                verdict: RbacVerdict::Deny,
                reasons: vec![DecisionReason::RbacNoRoles {
                    message: "User has no active roles".to_string(),
                    principal_id: ctx.principal_id(),
                    organization_id: ctx.organization_id(),
                }],
            });
        }

        let roles = resolved.role_names();
        debug!(
            "Principal {} roles {:?}, {} effective permissions",
            ctx.principal_id(),
            roles,
            resolved.grants.len()
        );

        if resolved.grants.is_empty() {
            return Ok(RbacOutcome {
                verdict: RbacVerdict::Deny,
                reasons: vec![DecisionReason::RbacNoPermissions {
                    message: "User roles grant no permissions".to_string(),
                    roles,
                }],
            });
        }

        let required = ctx.permission_name();
        let permissions = resolved.grants.iter().map(|grant| &grant.permission);

        match match_permission(permissions, ctx.resource_type(), ctx.action()) {
            Some(matched) => Ok(RbacOutcome {
                verdict: RbacVerdict::Allow,
                reasons: vec![DecisionReason::RbacAllow {
                    message: format!("User has permission {}", matched),
                    matched_permission: matched,
                    roles,
                }],
            }),
            None => Ok(RbacOutcome {
                verdict: RbacVerdict::Deny,
                reasons: vec![DecisionReason::RbacDeny {
                    message: format!("User lacks permission {}", required),
                    required_permission: required,
                    user_permissions: resolved
                        .grants
                        .iter()
                        .map(|grant| grant.permission.full_name())
                        .collect(),
                    roles,
                }],
            }),
        }
    }
}

/// Match `resource_type:action` against effective permissions.
///
/// Returns the full name of the first permission found in the highest
/// matching tier.
pub fn match_permission<'p>(
    permissions: impl Iterator<Item = &'p Permission> + Clone,
    resource_type: &str,
    action: &str,
) -> Option<String> {
    let exact = |p: &&Permission| p.resource_type == resource_type && p.action.as_str() == action;
    let resource_wildcard =
        |p: &&Permission| p.resource_type == resource_type && p.action == PermissionAction::Any;
    let global_wildcard =
        |p: &&Permission| p.resource_type == WILDCARD && p.action == PermissionAction::Any;

    permissions
        .clone()
        .find(exact)
        .or_else(|| permissions.clone().find(resource_wildcard))
        .or_else(|| permissions.clone().find(global_wildcard))
        .map(Permission::full_name)
}

fn named_grant(hierarchy: &RoleHierarchy<'_>, grant: PermissionGrant) -> UserPermission {
    UserPermission {
        source_roles: grant
            .source_role_ids
            .iter()
            .filter_map(|id| hierarchy.get(id))
            .map(|role| role.name.clone())
            .collect(),
        permission: grant.permission,
    }
}
