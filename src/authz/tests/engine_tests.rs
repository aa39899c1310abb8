//! Authorization engine tests
//!
//! End-to-end decisions through `AuthorizationEngine`:
//! role resolution → effective permissions → policy evaluation → combination

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use iam_authz::{
    engine::{AuthorizationEngine, DecisionReason, DecisionResult, EngineConfig, ReasonKind},
    error::{AuthzError, Result},
    hierarchy::RolePermissionMap,
    policy::{Condition, Policy, PolicyEffect},
    store::{InMemoryStore, Resource, RoleStore},
    types::{OrganizationId, Permission, PermissionAction, PrincipalId, Role, RoleId, WILDCARD},
    AuthorizationContext,
};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

struct Fixture {
    store: Arc<InMemoryStore>,
    engine: AuthorizationEngine,
    admin: PrincipalId,
}

impl Fixture {
    fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    fn with_config(config: EngineConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let engine =
            AuthorizationEngine::with_config(store.clone(), store.clone(), store.clone(), config);
        Self {
            store,
            engine,
            admin: Uuid::new_v4(),
        }
    }

    async fn role(&self, name: &str, parent: Option<RoleId>) -> Role {
        let mut role = Role::new(name, self.admin);
        role.parent_role_id = parent;
        self.store.put_role(role.clone()).await;
        role
    }

    async fn grant(
        &self,
        role: &Role,
        resource_type: &str,
        action: PermissionAction,
    ) -> Permission {
        let permission = Permission::new(
            format!("{}:{}", resource_type, action),
            resource_type,
            action,
        );
        self.store.put_permission(permission.clone()).await;
        self.store.grant(role.id, permission.id).await.unwrap();
        permission
    }

    async fn assign(&self, principal: PrincipalId, role: &Role) {
        self.store.assign(principal, role.id, None).await.unwrap();
    }

    async fn policy(&self, policy: Policy) -> Policy {
        self.store.put_policy(policy.clone()).await;
        policy
    }

    /// Principal holding a global `viewer` role with `document:read`
    async fn viewer(&self) -> PrincipalId {
        let user = Uuid::new_v4();
        let viewer = self.role("viewer", None).await;
        self.grant(&viewer, "document", PermissionAction::Read).await;
        self.assign(user, &viewer).await;
        user
    }
}

fn kinds(reasons: &[DecisionReason]) -> Vec<ReasonKind> {
    reasons.iter().map(DecisionReason::kind).collect()
}

// ============================================================================
// SCENARIOS
// ============================================================================

#[tokio::test]
async fn test_viewer_can_read_without_policies() {
    let fx = Fixture::new();
    let user = fx.viewer().await;

    let decision = fx
        .engine
        .authorize(&AuthorizationContext::new(user, "document", "read"))
        .await;

    assert_eq!(decision.result, DecisionResult::Allow);
    assert_eq!(
        kinds(&decision.reasons),
        vec![ReasonKind::RbacAllow, ReasonKind::AbacNoPolicies]
    );
    match &decision.reasons[0] {
        DecisionReason::RbacAllow {
            matched_permission,
            roles,
            ..
        } => {
            assert_eq!(matched_permission, "document:read");
            assert_eq!(roles, &vec!["viewer".to_string()]);
        }
        other => panic!("unexpected reason {:?}", other),
    }
}

#[tokio::test]
async fn test_no_roles_and_global_deny_policy() {
    let fx = Fixture::new();
    fx.policy(Policy::new(
        "no-deletes",
        PolicyEffect::Deny,
        "document",
        "delete",
        fx.admin,
    ))
    .await;

    let decision = fx
        .engine
        .authorize(&AuthorizationContext::new(Uuid::new_v4(), "document", "delete"))
        .await;

    assert!(decision.is_denied());
    assert_eq!(
        kinds(&decision.reasons),
        vec![ReasonKind::RbacNoRoles, ReasonKind::PolicyEvaluation]
    );
}

#[tokio::test]
async fn test_owner_policy_inapplicable_keeps_rbac_allow() {
    let fx = Fixture::new();
    let user = fx.viewer().await;
    fx.policy(
        Policy::new("owner-only", PolicyEffect::Allow, "document", "read", fx.admin)
            .with_condition(Condition::new("resource.owner_id", "eq", user.to_string())),
    )
    .await;

    let ctx = AuthorizationContext::new(user, "document", "read")
        .with_resource_attribute("owner_id", Uuid::new_v4());
    let decision = fx.engine.authorize(&ctx).await;

    assert!(decision.is_allowed());
    assert_eq!(
        kinds(&decision.reasons),
        vec![ReasonKind::RbacAllow, ReasonKind::AbacNotApplicable]
    );
}

// ============================================================================
// ROLE INHERITANCE
// ============================================================================

#[tokio::test]
async fn test_three_level_inheritance_and_deactivation() {
    let fx = Fixture::new();
    let a = fx.role("A", None).await;
    let b = fx.role("B", Some(a.id)).await;
    let c = fx.role("C", Some(b.id)).await;
    fx.grant(&a, "report", PermissionAction::Execute).await;

    let user = Uuid::new_v4();
    fx.assign(user, &c).await;
    let ctx = AuthorizationContext::new(user, "report", "execute");

    assert!(fx.engine.authorize(&ctx).await.is_allowed());

    fx.store.put_role(a.deactivate().unwrap()).await;

    let decision = fx.engine.authorize(&ctx).await;
    assert!(decision.is_denied());
    assert_eq!(decision.reasons[0].kind(), ReasonKind::RbacNoPermissions);
}

#[tokio::test]
async fn test_cycle_terminates_with_decision() {
    let fx = Fixture::new();
    let a = Role::new("A", fx.admin);
    let b = Role::new("B", fx.admin).with_parent(a.id);
    let a = a.with_parent(b.id);
    fx.store.put_role(a.clone()).await;
    fx.store.put_role(b.clone()).await;
    fx.grant(&a, "document", PermissionAction::Read).await;

    let user = Uuid::new_v4();
    fx.assign(user, &b).await;

    let decision = tokio::time::timeout(
        Duration::from_secs(5),
        fx.engine
            .authorize(&AuthorizationContext::new(user, "document", "read")),
    )
    .await
    .expect("authorize must terminate on cyclic hierarchies");

    assert!(decision.is_allowed());
}

#[tokio::test]
async fn test_cross_organization_parent_is_not_inherited() {
    let fx = Fixture::new();
    let org_a = Uuid::new_v4();
    let org_b = Uuid::new_v4();

    let foreign = Role::new("foreign-admin", fx.admin).in_organization(org_b);
    let local = Role::new("local", fx.admin)
        .in_organization(org_a)
        .with_parent(foreign.id);
    fx.store.put_role(foreign.clone()).await;
    fx.store.put_role(local.clone()).await;
    fx.grant(&foreign, WILDCARD, PermissionAction::Any).await;
    fx.grant(&local, "document", PermissionAction::Read).await;

    let user = Uuid::new_v4();
    fx.store.assign(user, local.id, Some(org_a)).await.unwrap();

    let read = AuthorizationContext::new(user, "document", "read").in_organization(org_a);
    let delete = AuthorizationContext::new(user, "document", "delete").in_organization(org_a);

    assert!(fx.engine.authorize(&read).await.is_allowed());
    assert!(fx.engine.authorize(&delete).await.is_denied());
}

// ============================================================================
// WILDCARDS
// ============================================================================

#[tokio::test]
async fn test_resource_wildcard() {
    let fx = Fixture::new();
    let editor = fx.role("doc-admin", None).await;
    fx.grant(&editor, "document", PermissionAction::Any).await;
    let user = Uuid::new_v4();
    fx.assign(user, &editor).await;

    for (resource_type, action, allowed) in [
        ("document", "read", true),
        ("document", "delete", true),
        ("report", "read", false),
    ] {
        let decision = fx
            .engine
            .authorize(&AuthorizationContext::new(user, resource_type, action))
            .await;
        assert_eq!(decision.is_allowed(), allowed, "{}:{}", resource_type, action);
    }

    let denied = fx
        .engine
        .authorize(&AuthorizationContext::new(user, "report", "read"))
        .await;
    match &denied.reasons[0] {
        DecisionReason::RbacDeny {
            required_permission,
            user_permissions,
            ..
        } => {
            assert_eq!(required_permission, "report:read");
            assert_eq!(user_permissions, &vec!["document:*".to_string()]);
        }
        other => panic!("unexpected reason {:?}", other),
    }
}

#[tokio::test]
async fn test_global_wildcard() {
    let fx = Fixture::new();
    let root = fx.role("superuser", None).await;
    fx.grant(&root, WILDCARD, PermissionAction::Any).await;
    let user = Uuid::new_v4();
    fx.assign(user, &root).await;

    for (resource_type, action) in [("document", "read"), ("invoice", "approve"), ("x", "y")] {
        assert!(
            fx.can(user, resource_type, action).await,
            "{}:{}",
            resource_type,
            action
        );
    }
}

impl Fixture {
    async fn can(&self, user: PrincipalId, resource_type: &str, action: &str) -> bool {
        self.engine
            .can_access(user, resource_type, None, action, None)
            .await
    }
}

// ============================================================================
// POLICY COMBINATION
// ============================================================================

#[tokio::test]
async fn test_low_priority_deny_overrides_rbac_and_allow_policy() {
    let fx = Fixture::new();
    let user = fx.viewer().await;
    fx.policy(
        Policy::new("allow-all", PolicyEffect::Allow, "document", "read", fx.admin)
            .with_priority(1000),
    )
    .await;
    fx.policy(
        Policy::new("contractors", PolicyEffect::Deny, "document", "read", fx.admin)
            .with_priority(-5)
            .with_condition(Condition::new("employment", "eq", "contractor")),
    )
    .await;

    let employee = AuthorizationContext::new(user, "document", "read")
        .with_user_attribute("employment", "staff");
    let contractor = AuthorizationContext::new(user, "document", "read")
        .with_user_attribute("employment", "contractor");

    assert!(fx.engine.authorize(&employee).await.is_allowed());

    let decision = fx.engine.authorize(&contractor).await;
    assert!(decision.is_denied());
    assert_eq!(decision.reasons_of(ReasonKind::PolicyEvaluation).len(), 2);
}

#[tokio::test]
async fn test_allow_policy_grants_without_roles() {
    let fx = Fixture::new();
    fx.policy(
        Policy::new("office-hours", PolicyEffect::Allow, "room", "enter", fx.admin)
            .with_condition(Condition::new("is_business_hours", "eq", true))
            .with_condition(Condition::new("is_weekend", "eq", false)),
    )
    .await;

    let user = Uuid::new_v4();
    // 2024-01-17 was a Wednesday
    let weekday_noon = Utc.with_ymd_and_hms(2024, 1, 17, 12, 0, 0).unwrap();
    let weekday_night = Utc.with_ymd_and_hms(2024, 1, 17, 23, 0, 0).unwrap();

    let open = AuthorizationContext::new(user, "room", "enter").at(weekday_noon);
    let closed = AuthorizationContext::new(user, "room", "enter").at(weekday_night);

    let decision = fx.engine.authorize(&open).await;
    assert!(decision.is_allowed());
    assert_eq!(decision.primary_reason().map(|r| r.kind()), Some(ReasonKind::RbacNoRoles));

    assert!(fx.engine.authorize(&closed).await.is_denied());
}

#[tokio::test]
async fn test_organization_scoped_policy() {
    let fx = Fixture::new();
    let user = fx.viewer().await;
    let org = Uuid::new_v4();
    fx.policy(
        Policy::new("org-freeze", PolicyEffect::Deny, "document", "read", fx.admin)
            .in_organization(org),
    )
    .await;

    let inside = AuthorizationContext::new(user, "document", "read").in_organization(org);
    let outside =
        AuthorizationContext::new(user, "document", "read").in_organization(Uuid::new_v4());

    assert!(fx.engine.authorize(&inside).await.is_denied());
    assert!(fx.engine.authorize(&outside).await.is_allowed());
}

// ============================================================================
// RESOURCE ENRICHMENT
// ============================================================================

#[tokio::test]
async fn test_stored_owner_overrides_caller_claim() {
    let fx = Fixture::new();
    let owner = Uuid::new_v4();
    let stranger = Uuid::new_v4();
    fx.policy(
        Policy::new("owners-edit", PolicyEffect::Allow, "document", "update", fx.admin)
            .with_condition(Condition::new("is_same_user", "eq", true)),
    )
    .await;

    let doc = Resource::new("document", Uuid::new_v4()).owned_by(owner);
    fx.store.put_resource(doc.clone()).await;

    assert!(
        fx.engine
            .can_access(owner, "document", Some(doc.id), "update", None)
            .await
    );
    assert!(
        !fx.engine
            .can_access(stranger, "document", Some(doc.id), "update", None)
            .await
    );

    let spoofed = AuthorizationContext::new(stranger, "document", "update")
        .on_resource(doc.id)
        .with_resource_attribute("owner_id", stranger);
    assert!(fx.engine.authorize(&spoofed).await.is_denied());
}

#[tokio::test]
async fn test_missing_resource_keeps_caller_attributes() {
    let fx = Fixture::new();
    let user = Uuid::new_v4();
    fx.policy(
        Policy::new("public", PolicyEffect::Allow, "document", "read", fx.admin)
            .with_condition(Condition::new("resource_visibility", "eq", "public")),
    )
    .await;

    let ctx = AuthorizationContext::new(user, "document", "read")
        .on_resource(Uuid::new_v4())
        .with_resource_attribute("visibility", "public");

    assert!(fx.engine.authorize(&ctx).await.is_allowed());
}

// ============================================================================
// CONVENIENCE OPERATIONS
// ============================================================================

#[tokio::test]
async fn test_check_multiple() {
    let fx = Fixture::new();
    let role = fx.role("author", None).await;
    fx.grant(&role, "document", PermissionAction::Read).await;
    fx.grant(&role, "document", PermissionAction::Update).await;
    let user = Uuid::new_v4();
    fx.assign(user, &role).await;

    let results = fx
        .engine
        .check_multiple(user, "document", &["read", "update", "delete"], None)
        .await;

    assert_eq!(results.len(), 3);
    assert!(results["read"]);
    assert!(results["update"]);
    assert!(!results["delete"]);
}

#[tokio::test]
async fn test_check_user_has_permission_accepts_both_forms() {
    let fx = Fixture::new();
    let user = fx.viewer().await;

    assert!(
        fx.engine
            .check_user_has_permission(user, "read", "document", None)
            .await
    );
    assert!(
        fx.engine
            .check_user_has_permission(user, "document:read", "document", None)
            .await
    );
    assert!(
        !fx.engine
            .check_user_has_permission(user, "report:read", "document", None)
            .await
    );
    assert!(
        !fx.engine
            .check_user_has_permission(user, "delete", "document", None)
            .await
    );
}

#[tokio::test]
async fn test_get_user_permissions_with_sources() {
    let fx = Fixture::new();
    let viewer = fx.role("viewer", None).await;
    let editor = fx.role("editor", Some(viewer.id)).await;
    let auditor = fx.role("auditor", None).await;
    fx.grant(&viewer, "document", PermissionAction::Read).await;
    fx.grant(&editor, "document", PermissionAction::Update).await;
    fx.grant(&auditor, WILDCARD, PermissionAction::Any).await;

    let user = Uuid::new_v4();
    fx.assign(user, &editor).await;
    fx.assign(user, &auditor).await;

    let all = fx.engine.get_user_permissions(user, None, None).await.unwrap();
    let names: Vec<String> = all.iter().map(|p| p.permission.full_name()).collect();
    assert_eq!(names, vec!["document:read", "document:update", "*:*"]);
    assert_eq!(all[0].source_roles, vec!["viewer".to_string()]);
    assert_eq!(all[1].source_roles, vec!["editor".to_string()]);

    let reports = fx
        .engine
        .get_user_permissions(user, None, Some("report"))
        .await
        .unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].permission.full_name(), "*:*");

    assert_eq!(
        fx.engine.user_role_names(user, None).await.unwrap(),
        vec!["editor".to_string(), "auditor".to_string()]
    );
    assert!(fx.engine.user_has_role(user, "auditor", None).await.unwrap());
    assert!(!fx.engine.user_has_role(user, "viewer", None).await.unwrap());
}

// ============================================================================
// FAILURE HANDLING
// ============================================================================

struct FailingRoleStore;

#[async_trait]
impl RoleStore for FailingRoleStore {
    async fn user_roles(&self, _: PrincipalId, _: Option<OrganizationId>) -> Result<Vec<Role>> {
        Err(AuthzError::store("role database unavailable"))
    }

    async fn organization_roles(&self, _: Option<OrganizationId>) -> Result<Vec<Role>> {
        Err(AuthzError::store("role database unavailable"))
    }

    async fn role_permissions(&self, _: &[RoleId]) -> Result<RolePermissionMap> {
        Err(AuthzError::store("role database unavailable"))
    }
}

struct PanickingRoleStore;

#[async_trait]
impl RoleStore for PanickingRoleStore {
    async fn user_roles(&self, _: PrincipalId, _: Option<OrganizationId>) -> Result<Vec<Role>> {
        panic!("corrupted role index");
    }

    async fn organization_roles(&self, _: Option<OrganizationId>) -> Result<Vec<Role>> {
        Ok(Vec::new())
    }

    async fn role_permissions(&self, _: &[RoleId]) -> Result<RolePermissionMap> {
        Ok(RolePermissionMap::new())
    }
}

async fn authorize_with_roles(roles: Arc<dyn RoleStore>, concurrent: bool) -> DecisionReason {
    let store = Arc::new(InMemoryStore::new());
    store
        .put_policy(Policy::new(
            "allow-all",
            PolicyEffect::Allow,
            "document",
            "read",
            Uuid::new_v4(),
        ))
        .await;

    let engine = AuthorizationEngine::with_config(
        roles,
        store.clone(),
        store,
        EngineConfig {
            concurrent_evaluation: concurrent,
            ..Default::default()
        },
    );

    let decision = engine
        .authorize(&AuthorizationContext::new(Uuid::new_v4(), "document", "read"))
        .await;

    assert_eq!(decision.result, DecisionResult::Deny);
    assert_eq!(decision.reasons.len(), 1);
    decision.reasons[0].clone()
}

#[tokio::test]
async fn test_store_error_fails_closed() {
    for concurrent in [true, false] {
        let reason = authorize_with_roles(Arc::new(FailingRoleStore), concurrent).await;
        match reason {
            DecisionReason::AuthorizationError { error, .. } => {
                assert!(error.contains("role database unavailable"), "{}", error);
            }
            other => panic!("unexpected reason {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_store_panic_fails_closed() {
    for concurrent in [true, false] {
        let reason = authorize_with_roles(Arc::new(PanickingRoleStore), concurrent).await;
        match reason {
            DecisionReason::AuthorizationError { error, .. } => {
                assert!(error.contains("corrupted role index"), "{}", error);
            }
            other => panic!("unexpected reason {:?}", other),
        }
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

#[tokio::test]
async fn test_sequential_and_concurrent_agree() {
    let sequential = Fixture::with_config(EngineConfig {
        concurrent_evaluation: false,
        ..Default::default()
    });
    let user = sequential.viewer().await;
    sequential
        .policy(Policy::new(
            "no-deletes",
            PolicyEffect::Deny,
            "document",
            "delete",
            sequential.admin,
        ))
        .await;

    let concurrent = AuthorizationEngine::new(
        sequential.store.clone(),
        sequential.store.clone(),
        sequential.store.clone(),
    );

    for action in ["read", "delete", "update"] {
        let ctx = AuthorizationContext::new(user, "document", action);
        let a = sequential.engine.authorize(&ctx).await;
        let b = concurrent.authorize(&ctx).await;
        assert_eq!(a.result, b.result, "{}", action);
        assert_eq!(a.reasons, b.reasons, "{}", action);
    }
}
