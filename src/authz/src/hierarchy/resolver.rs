//! Role hierarchy resolution and validation
//!
//! Roles form single-parent chains. [`RoleHierarchy`] indexes an
//! organization's role set by id and walks `parent_role_id` links with a
//! visited set, so corrupt data (cycles, orphaned parents) always
//! terminates.

use crate::types::{Role, RoleId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

/// Broken inheritance rule, in the order [`RoleHierarchy::validate`] checks them
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HierarchyViolation {
    #[error("Role cannot inherit from itself")]
    SelfParent,

    #[error("Circular inheritance detected")]
    CircularInheritance,

    #[error("Parent role {0} not found")]
    ParentNotFound(RoleId),

    #[error("Cannot inherit from inactive role {0}")]
    ParentInactive(RoleId),

    #[error("Child role must be in same organization as parent")]
    CrossOrganization,

    #[error("Global role cannot inherit from organization role")]
    GlobalInheritsOrganization,

    #[error("System roles cannot inherit from other roles")]
    SystemRoleInheritance,
}

/// One finding of an offline hierarchy audit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyIssue {
    pub role_id: RoleId,
    pub role_name: String,
    pub violation: HierarchyViolation,
}

impl fmt::Display for HierarchyIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Role {} ({}): {}", self.role_name, self.role_id, self.violation)
    }
}

/// Organization scope rule for a child → parent link.
///
/// An organization role may inherit from a role of the same organization or
/// from a global role. A global role may only inherit from a global role.
pub fn check_scope(child: &Role, parent: &Role) -> Result<(), HierarchyViolation> {
    match (child.organization_id, parent.organization_id) {
        (Some(child_org), Some(parent_org)) if child_org != parent_org => {
            Err(HierarchyViolation::CrossOrganization)
        }
        (None, Some(_)) => Err(HierarchyViolation::GlobalInheritsOrganization),
        _ => Ok(()),
    }
}

/// Id-indexed view over a role set
#[derive(Debug, Clone)]
pub struct RoleHierarchy<'a> {
    roles: HashMap<RoleId, &'a Role>,
    /// Input order, so audits and tree views are deterministic
    order: Vec<RoleId>,
}

impl<'a> RoleHierarchy<'a> {
    pub fn new(roles: &'a [Role]) -> Self {
        let mut index = HashMap::with_capacity(roles.len());
        let mut order = Vec::with_capacity(roles.len());
        for role in roles {
            if index.insert(role.id, role).is_none() {
                order.push(role.id);
            }
        }

        Self { roles: index, order }
    }

    pub fn get(&self, id: &RoleId) -> Option<&'a Role> {
        self.roles.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Role ids from the root ancestor down to `role`.
    ///
    /// Stops at a parent id missing from the set (orphaned link) and at the
    /// first revisited role (cycle), returning the partial path in both cases.
    pub fn resolve_path(&self, role: &Role) -> Vec<RoleId> {
        let mut path = vec![role.id];
        let mut visited = HashSet::from([role.id]);
        let mut parent_id = role.parent_role_id;

        while let Some(id) = parent_id {
            if !visited.insert(id) {
                debug!("Cycle in role hierarchy at {} while resolving {}", id, role.id);
                break;
            }

            let Some(parent) = self.get(&id) else {
                debug!("Parent role {} of chain {} not found", id, role.id);
                break;
            };

            path.push(parent.id);
            parent_id = parent.parent_role_id;
        }

        path.reverse();
        path
    }

    /// Roles on [`Self::resolve_path`], root first
    pub fn role_hierarchy(&self, role: &'a Role) -> Vec<&'a Role> {
        self.resolve_path(role)
            .into_iter()
            .filter_map(|id| if id == role.id { Some(role) } else { self.get(&id) })
            .collect()
    }

    /// Chain used for live permission inheritance, root first.
    ///
    /// Like [`Self::resolve_path`], and additionally never follows the parent
    /// of a system role and cuts the chain at the first link that breaks the
    /// organization scope rule. Everything above a cut is treated as not
    /// inherited.
    pub fn inheritance_path<'b>(&'b self, role: &'b Role) -> Vec<&'b Role>
    where
        'a: 'b,
    {
        let mut chain: Vec<&'b Role> = vec![role];
        let mut visited = HashSet::from([role.id]);
        let mut current: &'b Role = role;

        loop {
            if current.is_system_role {
                if current.has_parent() {
                    warn!("Ignoring parent of system role '{}'", current.name);
                }
                break;
            }

            let Some(parent_id) = current.parent_role_id else {
                break;
            };
            if !visited.insert(parent_id) {
                warn!("Cycle in role hierarchy at {}, inheritance truncated", parent_id);
                break;
            }
            let Some(parent) = self.get(&parent_id) else {
                warn!(
                    "Role '{}' references missing parent {}, inheritance truncated",
                    current.name, parent_id
                );
                break;
            };
            if let Err(violation) = check_scope(current, parent) {
                warn!(
                    "Role '{}' cannot inherit from '{}': {}",
                    current.name, parent.name, violation
                );
                break;
            }

            chain.push(parent);
            current = parent;
        }

        chain.reverse();
        chain
    }

    /// Whether `ancestor_id` appears on the parent chain of `role`
    pub fn is_descendant_of(&self, role: &Role, ancestor_id: RoleId) -> bool {
        let mut visited = HashSet::new();
        let mut parent_id = role.parent_role_id;

        while let Some(id) = parent_id {
            if id == ancestor_id {
                return true;
            }
            if !visited.insert(id) {
                return false;
            }
            parent_id = self.get(&id).and_then(|parent| parent.parent_role_id);
        }

        false
    }

    /// Validate the inheritance rules of one role.
    ///
    /// Checks, in order: self-parenting, circular ancestry, missing parent,
    /// inactive parent, organization scope, system-role inheritance.
    pub fn validate(&self, role: &Role) -> Result<(), HierarchyViolation> {
        let Some(parent_id) = role.parent_role_id else {
            return Ok(());
        };

        if parent_id == role.id {
            return Err(HierarchyViolation::SelfParent);
        }

        if self.is_descendant_of(role, role.id) {
            return Err(HierarchyViolation::CircularInheritance);
        }

        let parent = self
            .get(&parent_id)
            .ok_or(HierarchyViolation::ParentNotFound(parent_id))?;

        if !parent.is_active {
            return Err(HierarchyViolation::ParentInactive(parent_id));
        }

        check_scope(role, parent)?;

        if role.is_system_role {
            return Err(HierarchyViolation::SystemRoleInheritance);
        }

        Ok(())
    }

    /// Pre-flight check before making `parent` the parent of `child`
    pub fn can_inherit_from(&self, child: &Role, parent: &Role) -> Result<(), HierarchyViolation> {
        if child.id == parent.id {
            return Err(HierarchyViolation::SelfParent);
        }

        if child.is_system_role {
            return Err(HierarchyViolation::SystemRoleInheritance);
        }

        if !parent.is_active {
            return Err(HierarchyViolation::ParentInactive(parent.id));
        }

        if self.is_descendant_of(parent, child.id) {
            return Err(HierarchyViolation::CircularInheritance);
        }

        check_scope(child, parent)
    }

    /// Validate every role in the set
    pub fn validate_all(&self) -> Vec<HierarchyIssue> {
        self.order
            .iter()
            .filter_map(|id| self.get(id))
            .filter_map(|role| {
                self.validate(role).err().map(|violation| HierarchyIssue {
                    role_id: role.id,
                    role_name: role.name.clone(),
                    violation,
                })
            })
            .collect()
    }

    /// Direct children of `parent_id`
    pub fn child_roles(&self, parent_id: RoleId) -> Vec<&'a Role> {
        self.order
            .iter()
            .filter_map(|id| self.get(id))
            .filter(|role| role.parent_role_id == Some(parent_id))
            .collect()
    }

    /// Children, grandchildren and so on of `ancestor_id`, breadth first
    pub fn descendant_roles(&self, ancestor_id: RoleId) -> Vec<&'a Role> {
        let mut descendants = Vec::new();
        let mut visited = HashSet::from([ancestor_id]);
        let mut queue = VecDeque::from([ancestor_id]);

        while let Some(current) = queue.pop_front() {
            for child in self.child_roles(current) {
                if visited.insert(child.id) {
                    descendants.push(child);
                    queue.push_back(child.id);
                }
            }
        }

        descendants
    }

    /// Children grouped by parent id; `None` holds the root roles
    pub fn build_role_tree(&self) -> BTreeMap<Option<RoleId>, Vec<RoleId>> {
        let mut tree: BTreeMap<Option<RoleId>, Vec<RoleId>> = BTreeMap::new();
        for role in self.order.iter().filter_map(|id| self.get(id)) {
            tree.entry(role.parent_role_id).or_default().push(role.id);
        }
        tree
    }
}

/// Role ids from root ancestor to `role`, resolved against `all_roles`
pub fn resolve_path(role: &Role, all_roles: &[Role]) -> Vec<RoleId> {
    RoleHierarchy::new(all_roles).resolve_path(role)
}

/// Validate the inheritance rules of `role` against `all_roles`
pub fn validate(role: &Role, all_roles: &[Role]) -> Result<(), HierarchyViolation> {
    RoleHierarchy::new(all_roles).validate(role)
}

/// Check whether `child` may be re-parented under `parent`
pub fn can_inherit_from(
    child: &Role,
    parent: &Role,
    all_roles: &[Role],
) -> Result<(), HierarchyViolation> {
    RoleHierarchy::new(all_roles).can_inherit_from(child, parent)
}

/// Audit every role in `all_roles`
pub fn validate_hierarchy(all_roles: &[Role]) -> Vec<HierarchyIssue> {
    RoleHierarchy::new(all_roles).validate_all()
}
