//! Property tests for decision combination, deny precedence and determinism

use chrono::{TimeZone, Utc};
use iam_authz::{
    engine::{combine, AbacVerdict, AuthorizationEngine, DecisionResult, RbacVerdict},
    policy::{Condition, Policy, PolicyEffect},
    store::InMemoryStore,
    types::{Permission, PermissionAction, Role},
    AuthorizationContext,
};
use proptest::prelude::*;
use std::sync::Arc;
use uuid::Uuid;

fn rbac_verdict() -> impl Strategy<Value = RbacVerdict> {
    prop_oneof![Just(RbacVerdict::Allow), Just(RbacVerdict::Deny)]
}

fn abac_verdict() -> impl Strategy<Value = AbacVerdict> {
    prop_oneof![
        Just(AbacVerdict::Allow),
        Just(AbacVerdict::Deny),
        Just(AbacVerdict::NotApplicable)
    ]
}

fn effect() -> impl Strategy<Value = PolicyEffect> {
    prop_oneof![Just(PolicyEffect::Allow), Just(PolicyEffect::Deny)]
}

/// Store with one principal, optionally granted `document:read`, and the
/// given unconditional policies
async fn seeded(grant_read: bool, policies: &[(PolicyEffect, i32)]) -> (Arc<InMemoryStore>, Uuid) {
    let store = Arc::new(InMemoryStore::new());
    let admin = Uuid::new_v4();
    let user = Uuid::new_v4();

    let role = Role::new("reader", admin);
    store.put_role(role.clone()).await;
    if grant_read {
        let read = Permission::new("Read", "document", PermissionAction::Read);
        store.put_permission(read.clone()).await;
        store.grant(role.id, read.id).await.unwrap();
    }
    store.assign(user, role.id, None).await.unwrap();

    for (i, (effect, priority)) in policies.iter().enumerate() {
        store
            .put_policy(
                Policy::new(format!("p{}", i), *effect, "document", "read", admin)
                    .with_priority(*priority),
            )
            .await;
    }

    (store, user)
}

proptest! {
    #[test]
    fn test_combination_rule(rbac in rbac_verdict(), abac in abac_verdict()) {
        let expected = match (rbac, abac) {
            (_, AbacVerdict::Deny) => DecisionResult::Deny,
            (RbacVerdict::Allow, _) | (_, AbacVerdict::Allow) => DecisionResult::Allow,
            _ => DecisionResult::Deny,
        };
        prop_assert_eq!(combine(rbac, abac), expected);
    }

    #[test]
    fn test_any_applicable_deny_wins(
        grant_read in any::<bool>(),
        others in prop::collection::vec((effect(), -100i32..100), 0..6),
        deny_priority in -100i32..100,
    ) {
        let mut policies = others;
        policies.push((PolicyEffect::Deny, deny_priority));

        tokio_test::block_on(async {
            let (store, user) = seeded(grant_read, &policies).await;
            let engine = AuthorizationEngine::new(store.clone(), store.clone(), store);

            let decision = engine
                .authorize(&AuthorizationContext::new(user, "document", "read"))
                .await;

            assert!(decision.is_denied());
            assert!(!decision.reasons.is_empty());
        });
    }

    #[test]
    fn test_decision_determinism(
        grant_read in any::<bool>(),
        policies in prop::collection::vec((effect(), -10i32..10), 0..4),
        department in "(eng|ops|finance)",
        action in "(read|update|delete)",
        hour in 0u32..24,
    ) {
        tokio_test::block_on(async {
            let (store, user) = seeded(grant_read, &policies).await;
            let finance_update = Policy::new(
                "finance-update",
                PolicyEffect::Allow,
                "document",
                "update",
                Uuid::new_v4(),
            )
            .with_condition(Condition::new("department", "eq", "finance"))
            .with_condition(Condition::new("is_business_hours", "eq", true));
            store.put_policy(finance_update).await;
            let engine = AuthorizationEngine::new(store.clone(), store.clone(), store);

            let at = Utc.with_ymd_and_hms(2024, 3, 5, hour, 0, 0).unwrap();
            let ctx = AuthorizationContext::new(user, "document", action.as_str())
                .with_user_attribute("department", department.as_str())
                .at(at);

            let first = engine.authorize(&ctx).await;
            let second = engine.authorize(&ctx).await;

            assert_eq!(first.result, second.result);
            assert_eq!(first.reasons, second.reasons);
            if first.is_denied() {
                assert!(!first.reasons.is_empty());
            }
        });
    }
}
