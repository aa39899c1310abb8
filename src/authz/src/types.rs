//! Core RBAC value types: roles, permissions and identifiers

use crate::error::{AuthzError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique principal identifier (user, service account)
pub type PrincipalId = Uuid;

/// Unique organization identifier
pub type OrganizationId = Uuid;

/// Unique role identifier
pub type RoleId = Uuid;

/// Unique permission identifier
pub type PermissionId = Uuid;

/// Unique policy identifier
pub type PolicyId = Uuid;

/// Identifier of a concrete resource instance
pub type ResourceId = Uuid;

/// Wildcard accepted in place of a resource type or an action
pub const WILDCARD: &str = "*";

/// Role with optional single-parent inheritance
///
/// Roles never hold a back-reference to their parent value; the chain is
/// resolved against an id-indexed role set by [`crate::hierarchy`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,

    pub name: String,

    #[serde(default)]
    pub description: String,

    /// `None` for global (system-wide) roles
    #[serde(default)]
    pub organization_id: Option<OrganizationId>,

    /// Parent role this role inherits permissions from
    #[serde(default)]
    pub parent_role_id: Option<RoleId>,

    pub created_by: PrincipalId,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(default = "default_true")]
    pub is_active: bool,

    #[serde(default)]
    pub is_system_role: bool,
}

fn default_true() -> bool {
    true
}

impl Role {
    /// Create a new active, global, non-system role
    pub fn new(name: impl Into<String>, created_by: PrincipalId) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            organization_id: None,
            parent_role_id: None,
            created_by,
            created_at: Utc::now(),
            updated_at: None,
            is_active: true,
            is_system_role: false,
        }
    }

    /// Create a system role. System roles have no parent and cannot be deactivated.
    pub fn system(name: impl Into<String>, created_by: PrincipalId) -> Self {
        Self {
            is_system_role: true,
            ..Self::new(name, created_by)
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Scope the role to an organization
    pub fn in_organization(mut self, organization_id: OrganizationId) -> Self {
        self.organization_id = Some(organization_id);
        self
    }

    /// Set the parent link without any validation.
    ///
    /// Use [`Role::set_parent_role`] for the checked lifecycle operation.
    pub fn with_parent(mut self, parent_role_id: RoleId) -> Self {
        self.parent_role_id = Some(parent_role_id);
        self
    }

    pub fn has_parent(&self) -> bool {
        self.parent_role_id.is_some()
    }

    pub fn is_global_role(&self) -> bool {
        self.organization_id.is_none()
    }

    pub fn is_organization_role(&self) -> bool {
        self.organization_id.is_some()
    }

    pub fn update_description(&self, description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            updated_at: Some(Utc::now()),
            ..self.clone()
        }
    }

    pub fn deactivate(&self) -> Result<Self> {
        if self.is_system_role {
            return Err(AuthzError::Lifecycle(format!(
                "Cannot deactivate system role '{}'",
                self.name
            )));
        }

        Ok(Self {
            is_active: false,
            updated_at: Some(Utc::now()),
            ..self.clone()
        })
    }

    pub fn activate(&self) -> Self {
        Self {
            is_active: true,
            updated_at: Some(Utc::now()),
            ..self.clone()
        }
    }

    /// Re-parent the role.
    ///
    /// Only the rules that need no other role are checked here; use
    /// [`crate::hierarchy::can_inherit_from`] for the full pre-flight check.
    pub fn set_parent_role(&self, parent_role_id: RoleId) -> Result<Self> {
        if self.is_system_role {
            return Err(AuthzError::Lifecycle(
                "System roles cannot inherit from other roles".to_string(),
            ));
        }

        if parent_role_id == self.id {
            return Err(AuthzError::Lifecycle(
                "Role cannot inherit from itself".to_string(),
            ));
        }

        Ok(Self {
            parent_role_id: Some(parent_role_id),
            updated_at: Some(Utc::now()),
            ..self.clone()
        })
    }

    pub fn remove_parent_role(&self) -> Result<Self> {
        if self.is_system_role {
            return Err(AuthzError::Lifecycle(
                "System roles cannot be modified".to_string(),
            ));
        }

        Ok(Self {
            parent_role_id: None,
            updated_at: Some(Utc::now()),
            ..self.clone()
        })
    }

    pub fn can_be_deleted(&self) -> Result<()> {
        if self.is_system_role {
            return Err(AuthzError::Lifecycle(
                "System roles cannot be deleted".to_string(),
            ));
        }
        Ok(())
    }

    pub fn can_be_modified(&self) -> Result<()> {
        if self.is_system_role {
            return Err(AuthzError::Lifecycle(
                "System roles cannot be modified".to_string(),
            ));
        }
        if !self.is_active {
            return Err(AuthzError::Lifecycle(
                "Inactive roles cannot be modified".to_string(),
            ));
        }
        Ok(())
    }
}

/// Action a permission grants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionAction {
    Create,
    Read,
    Update,
    Delete,
    Execute,
    Manage,
    /// Any action (`*`)
    #[serde(rename = "*")]
    Any,
}

impl PermissionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Execute => "execute",
            Self::Manage => "manage",
            Self::Any => WILDCARD,
        }
    }
}

impl fmt::Display for PermissionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionAction {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(Self::Create),
            "read" => Ok(Self::Read),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            "execute" => Ok(Self::Execute),
            "manage" => Ok(Self::Manage),
            WILDCARD => Ok(Self::Any),
            other => Err(AuthzError::InvalidInput(format!(
                "Unknown permission action: '{}'",
                other
            ))),
        }
    }
}

/// Natural key of a permission: `(resource_type, action)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PermissionKey {
    pub resource_type: String,
    pub action: PermissionAction,
}

impl fmt::Display for PermissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource_type, self.action)
    }
}

/// Permission granting one action on one resource type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,

    pub name: String,

    #[serde(default)]
    pub description: String,

    pub action: PermissionAction,

    /// Resource type (e.g. "document") or `*`
    pub resource_type: String,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(default = "default_true")]
    pub is_active: bool,

    #[serde(default)]
    pub is_system_permission: bool,
}

impl Permission {
    pub fn new(
        name: impl Into<String>,
        resource_type: impl Into<String>,
        action: PermissionAction,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            action,
            resource_type: resource_type.into(),
            created_at: Utc::now(),
            updated_at: None,
            is_active: true,
            is_system_permission: false,
        }
    }

    /// Create a system permission. System permissions cannot be deactivated or deleted.
    pub fn system(
        name: impl Into<String>,
        resource_type: impl Into<String>,
        action: PermissionAction,
    ) -> Self {
        Self {
            is_system_permission: true,
            ..Self::new(name, resource_type, action)
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn key(&self) -> PermissionKey {
        PermissionKey {
            resource_type: self.resource_type.clone(),
            action: self.action,
        }
    }

    /// Full name in the form `resource_type:action`
    pub fn full_name(&self) -> String {
        self.key().to_string()
    }

    /// Exact (non-wildcard) match against a resource type and action
    pub fn matches(&self, resource_type: &str, action: &str) -> bool {
        self.is_active && self.resource_type == resource_type && self.action.as_str() == action
    }

    pub fn deactivate(&self) -> Result<Self> {
        if self.is_system_permission {
            return Err(AuthzError::Lifecycle(format!(
                "Cannot deactivate system permission '{}'",
                self.name
            )));
        }

        Ok(Self {
            is_active: false,
            updated_at: Some(Utc::now()),
            ..self.clone()
        })
    }

    pub fn activate(&self) -> Self {
        Self {
            is_active: true,
            updated_at: Some(Utc::now()),
            ..self.clone()
        }
    }

    pub fn can_be_deleted(&self) -> Result<()> {
        if self.is_system_permission {
            return Err(AuthzError::Lifecycle(
                "System permissions cannot be deleted".to_string(),
            ));
        }
        Ok(())
    }
}
