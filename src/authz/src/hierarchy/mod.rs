//! Role hierarchy module
//!
//! Resolves single-parent role chains, validates inheritance rules and
//! aggregates the effective permissions a role (or a set of roles) grants.
//!
//! # Features
//!
//! - **Cycle safe**: every walk keeps a visited set and stops on revisits
//! - **Tolerant resolution**: orphaned or cross-scope links degrade to
//!   "no inheritance above this link" instead of failing the evaluation
//! - **Leaf wins**: a child's own permission record overrides an inherited
//!   record with the same `(resource_type, action)` key
//! - **Offline audits**: [`validate_hierarchy`] reports every broken rule
//!
//! # Example
//!
//! ```rust
//! use iam_authz::hierarchy::{effective_permissions, resolve_path, RolePermissionMap};
//! use iam_authz::types::{Permission, PermissionAction, Role};
//! use uuid::Uuid;
//!
//! let admin = Uuid::new_v4();
//! let viewer = Role::new("viewer", admin);
//! let editor = Role::new("editor", admin).with_parent(viewer.id);
//!
//! let mut grants = RolePermissionMap::new();
//! grants.insert(viewer.id, vec![Permission::new("Read", "document", PermissionAction::Read)]);
//!
//! let roles = vec![viewer.clone(), editor.clone()];
//! assert_eq!(resolve_path(&editor, &roles), vec![viewer.id, editor.id]);
//! assert_eq!(effective_permissions(&editor, &roles, &grants).len(), 1);
//! ```

pub mod aggregator;
pub mod resolver;


pub use aggregator::{
    effective_permissions, effective_permissions_for_roles, PermissionGrant, RolePermissionMap,
};
pub use resolver::{
    can_inherit_from, check_scope, resolve_path, validate, validate_hierarchy, HierarchyIssue,
    HierarchyViolation, RoleHierarchy,
};
