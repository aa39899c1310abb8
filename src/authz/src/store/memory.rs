//! In-memory collaborator implementation
//!
//! Backs tests, benchmarks and the `authz-audit` tool. Roles and policies
//! keep insertion order so multi-role aggregation and equal-priority
//! policies are reported deterministically.

use super::{PolicyStore, Resource, ResourceStore, RoleAssignment, RoleStore};
use crate::error::{AuthzError, Result};
use crate::hierarchy::RolePermissionMap;
use crate::policy::Policy;
use crate::types::{
    OrganizationId, Permission, PermissionId, PolicyId, PrincipalId, ResourceId, Role, RoleId,
};
use async_trait::async_trait;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Thread-safe store implementing every collaborator trait
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    roles: Arc<RwLock<Vec<Role>>>,
    permissions: Arc<RwLock<HashMap<PermissionId, Permission>>>,
    grants: Arc<RwLock<HashMap<RoleId, Vec<PermissionId>>>>,
    assignments: Arc<RwLock<Vec<RoleAssignment>>>,
    policies: Arc<RwLock<Vec<Policy>>>,
    resources: Arc<RwLock<HashMap<ResourceId, Resource>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a role, replacing any role with the same id in place
    pub async fn put_role(&self, role: Role) {
        let mut roles = self.roles.write().await;
        match roles.iter_mut().find(|existing| existing.id == role.id) {
            Some(existing) => *existing = role,
            None => roles.push(role),
        }
    }

    pub async fn get_role(&self, role_id: RoleId) -> Result<Role> {
        self.roles
            .read()
            .await
            .iter()
            .find(|role| role.id == role_id)
            .cloned()
            .ok_or_else(|| AuthzError::RoleNotFound(role_id.to_string()))
    }

    pub async fn roles(&self) -> Vec<Role> {
        self.roles.read().await.clone()
    }

    pub async fn put_permission(&self, permission: Permission) {
        self.permissions
            .write()
            .await
            .insert(permission.id, permission);
    }

    pub async fn permissions(&self) -> Vec<Permission> {
        self.permissions.read().await.values().cloned().collect()
    }

    /// Attach a permission to a role. Granting twice is a no-op.
    pub async fn grant(&self, role_id: RoleId, permission_id: PermissionId) -> Result<()> {
        self.get_role(role_id).await?;
        if !self.permissions.read().await.contains_key(&permission_id) {
            return Err(AuthzError::InvalidInput(format!(
                "Permission {} not found",
                permission_id
            )));
        }

        let mut grants = self.grants.write().await;
        let attached = grants.entry(role_id).or_default();
        if !attached.contains(&permission_id) {
            attached.push(permission_id);
        }
        Ok(())
    }

    pub async fn revoke(&self, role_id: RoleId, permission_id: PermissionId) {
        if let Some(attached) = self.grants.write().await.get_mut(&role_id) {
            attached.retain(|id| *id != permission_id);
        }
    }

    /// Assign a role to a principal, optionally only within one organization
    pub async fn assign(
        &self,
        principal_id: PrincipalId,
        role_id: RoleId,
        organization_id: Option<OrganizationId>,
    ) -> Result<()> {
        self.get_role(role_id).await?;

        let assignment = RoleAssignment {
            principal_id,
            role_id,
            organization_id,
        };
        let mut assignments = self.assignments.write().await;
        if !assignments.contains(&assignment) {
            assignments.push(assignment);
        }
        Ok(())
    }

    pub async fn unassign(
        &self,
        principal_id: PrincipalId,
        role_id: RoleId,
        organization_id: Option<OrganizationId>,
    ) {
        self.assignments.write().await.retain(|a| {
            !(a.principal_id == principal_id
                && a.role_id == role_id
                && a.organization_id == organization_id)
        });
    }

    /// Insert a policy, replacing any policy with the same id in place
    pub async fn put_policy(&self, policy: Policy) {
        let mut policies = self.policies.write().await;
        match policies.iter_mut().find(|existing| existing.id == policy.id) {
            Some(existing) => *existing = policy,
            None => policies.push(policy),
        }
    }

    pub async fn get_policy(&self, policy_id: PolicyId) -> Result<Policy> {
        self.policies
            .read()
            .await
            .iter()
            .find(|policy| policy.id == policy_id)
            .cloned()
            .ok_or_else(|| AuthzError::PolicyNotFound(policy_id.to_string()))
    }

    pub async fn delete_policy(&self, policy_id: PolicyId) -> Result<()> {
        let mut policies = self.policies.write().await;
        let before = policies.len();
        policies.retain(|policy| policy.id != policy_id);
        if policies.len() == before {
            return Err(AuthzError::PolicyNotFound(policy_id.to_string()));
        }
        Ok(())
    }

    pub async fn policies(&self) -> Vec<Policy> {
        self.policies.read().await.clone()
    }

    pub async fn put_resource(&self, resource: Resource) {
        self.resources.write().await.insert(resource.id, resource);
    }
}

#[async_trait]
impl RoleStore for InMemoryStore {
    async fn user_roles(
        &self,
        principal_id: PrincipalId,
        organization_id: Option<OrganizationId>,
    ) -> Result<Vec<Role>> {
        let assignments = self.assignments.read().await;
        let roles = self.roles.read().await;

        let mut found: Vec<Role> = Vec::new();
        for assignment in assignments
            .iter()
            .filter(|a| a.principal_id == principal_id && a.applies_in(organization_id))
        {
            let Some(role) = roles.iter().find(|role| role.id == assignment.role_id) else {
                debug!("Assignment references unknown role {}", assignment.role_id);
                continue;
            };
            let visible = role.organization_id.is_none() || role.organization_id == organization_id;
            if visible && !found.iter().any(|r| r.id == role.id) {
                found.push(role.clone());
            }
        }

        Ok(found)
    }

    async fn organization_roles(
        &self,
        organization_id: Option<OrganizationId>,
    ) -> Result<Vec<Role>> {
        Ok(self
            .roles
            .read()
            .await
            .iter()
            .filter(|role| {
                role.organization_id.is_none() || role.organization_id == organization_id
            })
            .cloned()
            .collect())
    }

    async fn role_permissions(&self, role_ids: &[RoleId]) -> Result<RolePermissionMap> {
        let grants = self.grants.read().await;
        let permissions = self.permissions.read().await;

        let mut map = RolePermissionMap::new();
        for role_id in role_ids {
            let Some(attached) = grants.get(role_id) else {
                continue;
            };
            let records = attached
                .iter()
                .filter_map(|id| permissions.get(id))
                .cloned()
                .collect();
            map.insert(*role_id, records);
        }
        Ok(map)
    }
}

#[async_trait]
impl PolicyStore for InMemoryStore {
    async fn applicable_policies(
        &self,
        resource_type: &str,
        action: &str,
        organization_id: Option<OrganizationId>,
    ) -> Result<Vec<Policy>> {
        let mut matching: Vec<Policy> = self
            .policies
            .read()
            .await
            .iter()
            .filter(|policy| policy.matches_request(resource_type, action, organization_id))
            .cloned()
            .collect();

        // Stable: equal priorities keep insertion order
        matching.sort_by_key(|policy| Reverse(policy.priority));
        Ok(matching)
    }
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    async fn get_resource(
        &self,
        resource_type: &str,
        resource_id: ResourceId,
    ) -> Result<Option<Resource>> {
        Ok(self
            .resources
            .read()
            .await
            .get(&resource_id)
            .filter(|resource| resource.resource_type == resource_type)
            .cloned())
    }
}
