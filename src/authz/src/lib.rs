//! # IAM Authorization Engine
//!
//! Decides whether a principal may perform an action on a resource by
//! combining role-based (RBAC) and attribute-based (ABAC) access control.
//!
//! ## Features
//!
//! - **Role inheritance** with cycle-safe, single-parent hierarchies
//! - **Wildcard permissions** (`document:*`, `*:*`)
//! - **Prioritized policies** with typed conditions and deny precedence
//! - **Fail closed**: collaborator errors and panics become DENY decisions
//! - **Auditable**: every decision carries a typed reason trail and timing
//! - **Async-first design** using Tokio, collaborators behind `async_trait`
//!
//! ## Example
//!
//! ```rust
//! use iam_authz::{AuthorizationContext, AuthorizationEngine, InMemoryStore};
//! use iam_authz::types::{Permission, PermissionAction, Role};
//! use std::sync::Arc;
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(InMemoryStore::new());
//!     let admin = Uuid::new_v4();
//!     let alice = Uuid::new_v4();
//!
//!     let viewer = Role::new("viewer", admin);
//!     let read = Permission::new("Read documents", "document", PermissionAction::Read);
//!     store.put_role(viewer.clone()).await;
//!     store.put_permission(read.clone()).await;
//!     store.grant(viewer.id, read.id).await?;
//!     store.assign(alice, viewer.id, None).await?;
//!
//!     let engine = AuthorizationEngine::new(store.clone(), store.clone(), store);
//!     let decision = engine
//!         .authorize(&AuthorizationContext::new(alice, "document", "read"))
//!         .await;
//!
//!     assert!(decision.is_allowed());
//!     Ok(())
//! }
//! ```

pub mod abac;
pub mod attributes;
pub mod context;
pub mod engine;
pub mod error;
pub mod hierarchy;
pub mod policy;
pub mod rbac;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use attributes::{AttributeValue, Attributes};
pub use context::AuthorizationContext;
pub use engine::{
    AuthorizationDecision, AuthorizationEngine, DecisionReason, DecisionResult, EngineConfig,
    ReasonKind,
};
pub use error::{AuthzError, Result};
pub use policy::{Condition, ConditionOperator, Policy, PolicyEffect};
pub use rbac::UserPermission;
pub use store::{InMemoryStore, PolicyStore, Resource, ResourceStore, RoleStore, Snapshot};
pub use types::{OrganizationId, PermissionId, PolicyId, PrincipalId, ResourceId, RoleId};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
