//! Collaborator contracts
//!
//! The engine owns no state. Roles, permissions, policies and resources are
//! read through these traits on every call.

pub mod memory;
pub mod snapshot;

pub use memory::InMemoryStore;
pub use snapshot::{RoleGrant, Snapshot};

use crate::attributes::Attributes;
use crate::error::Result;
use crate::hierarchy::RolePermissionMap;
use crate::policy::Policy;
use crate::types::{OrganizationId, PrincipalId, ResourceId, Role, RoleId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role and permission lookup
#[async_trait]
pub trait RoleStore: Send + Sync {
    /// Roles assigned to `principal_id` that are visible in `organization_id`:
    /// global assignments plus assignments made in that organization
    async fn user_roles(
        &self,
        principal_id: PrincipalId,
        organization_id: Option<OrganizationId>,
    ) -> Result<Vec<Role>>;

    /// Every role needed to resolve hierarchies in `organization_id`:
    /// global roles plus the organization's own roles
    async fn organization_roles(&self, organization_id: Option<OrganizationId>)
        -> Result<Vec<Role>>;

    /// Direct permissions attached to each of `role_ids`
    async fn role_permissions(&self, role_ids: &[RoleId]) -> Result<RolePermissionMap>;
}

/// Policy lookup
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Policies scoped to `(resource_type, action, organization_id)`,
    /// highest priority first
    async fn applicable_policies(
        &self,
        resource_type: &str,
        action: &str,
        organization_id: Option<OrganizationId>,
    ) -> Result<Vec<Policy>>;
}

/// Resource lookup used for context enrichment
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// `Ok(None)` when the resource does not exist
    async fn get_resource(
        &self,
        resource_type: &str,
        resource_id: ResourceId,
    ) -> Result<Option<Resource>>;
}

/// Principal → role binding, optionally limited to one organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub principal_id: PrincipalId,
    pub role_id: RoleId,
    /// `None` applies in every organization
    #[serde(default)]
    pub organization_id: Option<OrganizationId>,
}

impl RoleAssignment {
    pub fn applies_in(&self, organization_id: Option<OrganizationId>) -> bool {
        self.organization_id.is_none() || self.organization_id == organization_id
    }
}

/// Resource record as supplied by the resource collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,

    pub resource_type: String,

    #[serde(default)]
    pub owner_id: Option<PrincipalId>,

    #[serde(default)]
    pub organization_id: Option<OrganizationId>,

    #[serde(default)]
    pub attributes: Attributes,

    #[serde(default = "default_true")]
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl Resource {
    pub fn new(resource_type: impl Into<String>, id: ResourceId) -> Self {
        Self {
            id,
            resource_type: resource_type.into(),
            owner_id: None,
            organization_id: None,
            attributes: Attributes::new(),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    pub fn owned_by(mut self, owner_id: PrincipalId) -> Self {
        self.owner_id = Some(owner_id);
        self
    }

    pub fn in_organization(mut self, organization_id: OrganizationId) -> Self {
        self.organization_id = Some(organization_id);
        self
    }

    pub fn with_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<crate::attributes::AttributeValue>,
    ) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn created(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Attributes used to enrich a request context. Record fields take
    /// precedence over free-form attributes of the same name.
    pub fn attribute_bag(&self) -> Attributes {
        let mut bag = self.attributes.clone();
        bag.insert("owner_id".into(), self.owner_id.into());
        bag.insert("organization_id".into(), self.organization_id.into());
        bag.insert("is_active".into(), self.is_active.into());
        bag.insert("created_at".into(), self.created_at.into());
        bag
    }
}
