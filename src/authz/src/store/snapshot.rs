//! JSON snapshot of collaborator state

use super::{InMemoryStore, Resource, RoleAssignment};
use crate::error::Result;
use crate::hierarchy::validate_hierarchy;
use crate::policy::evaluator::validate_conditions;
use crate::policy::Policy;
use crate::types::{Permission, PermissionId, Role, RoleId};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Role → permission attachment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrant {
    pub role_id: RoleId,
    pub permission_id: PermissionId,
}

/// Everything the engine reads, in one document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub roles: Vec<Role>,

    #[serde(default)]
    pub permissions: Vec<Permission>,

    #[serde(default)]
    pub grants: Vec<RoleGrant>,

    #[serde(default)]
    pub assignments: Vec<RoleAssignment>,

    #[serde(default)]
    pub policies: Vec<Policy>,

    #[serde(default)]
    pub resources: Vec<Resource>,
}

impl Snapshot {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let snapshot = Self::from_json(&raw)?;
        info!(
            "Loaded snapshot {}: {} roles, {} permissions, {} policies",
            path.as_ref().display(),
            snapshot.roles.len(),
            snapshot.permissions.len(),
            snapshot.policies.len()
        );
        Ok(snapshot)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Hierarchy and policy-condition problems, one line each
    pub fn audit(&self) -> Vec<String> {
        let mut issues: Vec<String> = validate_hierarchy(&self.roles)
            .iter()
            .map(ToString::to_string)
            .collect();

        for policy in &self.policies {
            if let Err(errors) = validate_conditions(policy) {
                issues.extend(
                    errors
                        .into_iter()
                        .map(|error| format!("Policy {} ({}): {}", policy.name, policy.id, error)),
                );
            }
        }

        issues
    }
}

impl InMemoryStore {
    /// Build a store from a snapshot. Grants and assignments must reference
    /// roles and permissions present in the snapshot.
    pub async fn from_snapshot(snapshot: Snapshot) -> Result<Self> {
        let store = Self::new();

        for role in snapshot.roles {
            store.put_role(role).await;
        }
        for permission in snapshot.permissions {
            store.put_permission(permission).await;
        }
        for grant in snapshot.grants {
            store.grant(grant.role_id, grant.permission_id).await?;
        }
        for assignment in snapshot.assignments {
            store
                .assign(
                    assignment.principal_id,
                    assignment.role_id,
                    assignment.organization_id,
                )
                .await?;
        }
        for policy in snapshot.policies {
            store.put_policy(policy).await;
        }
        for resource in snapshot.resources {
            store.put_resource(resource).await;
        }

        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthzError;
    use crate::policy::{Condition, PolicyEffect};
    use crate::store::RoleStore;
    use crate::types::PermissionAction;
    use std::io::Write;
    use uuid::Uuid;

    fn sample() -> Snapshot {
        let admin = Uuid::new_v4();
        let viewer = Role::new("viewer", admin);
        let read = Permission::new("Read documents", "document", PermissionAction::Read);

        Snapshot {
            grants: vec![RoleGrant {
                role_id: viewer.id,
                permission_id: read.id,
            }],
            assignments: vec![RoleAssignment {
                principal_id: Uuid::new_v4(),
                role_id: viewer.id,
                organization_id: None,
            }],
            roles: vec![viewer],
            permissions: vec![read],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let snapshot = sample();
        let principal = snapshot.assignments[0].principal_id;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(snapshot.to_json().unwrap().as_bytes()).unwrap();

        let loaded = Snapshot::from_path(file.path()).unwrap();
        let store = InMemoryStore::from_snapshot(loaded).await.unwrap();

        let roles = store.user_roles(principal, None).await.unwrap();
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].name, "viewer");
    }

    #[tokio::test]
    async fn test_dangling_grant_is_rejected() {
        let mut snapshot = sample();
        snapshot.permissions.clear();

        assert!(matches!(
            InMemoryStore::from_snapshot(snapshot).await,
            Err(AuthzError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_missing_file_and_bad_json() {
        assert!(matches!(
            Snapshot::from_path("/nonexistent/snapshot.json"),
            Err(AuthzError::Io(_))
        ));
        assert!(matches!(
            Snapshot::from_json("{ not json"),
            Err(AuthzError::Serialization(_))
        ));
    }

    #[test]
    fn test_audit_collects_hierarchy_and_condition_issues() {
        let mut snapshot = sample();
        let orphan = Role::new("orphan", Uuid::new_v4()).with_parent(Uuid::new_v4());
        snapshot.roles.push(orphan);
        snapshot.policies.push(
            Policy::new("bad", PolicyEffect::Allow, "document", "read", Uuid::new_v4())
                .with_condition(Condition::new("region", "in", "eu")),
        );

        let issues = snapshot.audit();
        assert_eq!(issues.len(), 2);
        assert!(issues[0].contains("orphan"));
        assert!(issues[1].contains("requires a list"));
    }
}
