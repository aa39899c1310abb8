//! Authorization orchestrator
//!
//! Runs RBAC and ABAC against the same (enriched) context and combines
//! their verdicts into one auditable decision.
//!
//! ```text
//! context → ResourceStore (enrich) ─┬→ RbacEvaluator ← RoleStore ──┐
//!                                   └→ AbacEvaluator ← PolicyStore ┴→ combine → Decision
//! ```

pub mod decision;

pub use decision::{
    combine, AbacVerdict, AuthorizationDecision, DecisionReason, DecisionResult, RbacVerdict,
    ReasonKind,
};

use crate::abac::{AbacEvaluator, AbacOutcome};
use crate::context::AuthorizationContext;
use crate::error::{AuthzError, Result};
use crate::policy::{BusinessHours, PolicyEvaluator};
use crate::rbac::{RbacEvaluator, RbacOutcome, UserPermission};
use crate::store::{PolicyStore, ResourceStore, RoleStore};
use crate::types::{OrganizationId, PrincipalId, ResourceId, WILDCARD};
use chrono::Utc;
use futures::future::try_join;
use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Run RBAC and ABAC concurrently instead of RBAC then ABAC
    pub concurrent_evaluation: bool,

    /// Window for the `is_business_hours` computed attribute
    pub business_hours: BusinessHours,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrent_evaluation: true,
            business_hours: BusinessHours::default(),
        }
    }
}

impl EngineConfig {
    pub const CONCURRENT_EVALUATION_ENV: &'static str = "AUTHZ_CONCURRENT_EVALUATION";
    pub const BUSINESS_HOURS_START_ENV: &'static str = "AUTHZ_BUSINESS_HOURS_START";
    pub const BUSINESS_HOURS_END_ENV: &'static str = "AUTHZ_BUSINESS_HOURS_END";

    /// Defaults overridden by `AUTHZ_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`Self::from_env`] with an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = lookup(Self::CONCURRENT_EVALUATION_ENV) {
            config.concurrent_evaluation = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => {
                    return Err(AuthzError::InvalidInput(format!(
                        "{}: expected a boolean, got '{}'",
                        Self::CONCURRENT_EVALUATION_ENV,
                        other
                    )))
                }
            };
        }
        if let Some(raw) = lookup(Self::BUSINESS_HOURS_START_ENV) {
            config.business_hours.start_hour = parse_hour(Self::BUSINESS_HOURS_START_ENV, &raw)?;
        }
        if let Some(raw) = lookup(Self::BUSINESS_HOURS_END_ENV) {
            config.business_hours.end_hour = parse_hour(Self::BUSINESS_HOURS_END_ENV, &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let BusinessHours {
            start_hour,
            end_hour,
        } = self.business_hours;
        if start_hour > 23 || end_hour > 23 || start_hour > end_hour {
            return Err(AuthzError::InvalidInput(format!(
                "Invalid business hours {}..={}",
                start_hour, end_hour
            )));
        }
        Ok(())
    }
}

fn parse_hour(key: &str, raw: &str) -> Result<u32> {
    raw.trim()
        .parse::<u32>()
        .map_err(|e| AuthzError::InvalidInput(format!("{}: '{}' is not an hour: {}", key, raw, e)))
}

/// Authorization engine combining RBAC and ABAC
///
/// Holds only collaborator handles and configuration; every call is a
/// fresh evaluation.
pub struct AuthorizationEngine {
    rbac: RbacEvaluator,
    abac: AbacEvaluator,
    resources: Arc<dyn ResourceStore>,
    config: EngineConfig,
}

impl AuthorizationEngine {
    pub fn new(
        roles: Arc<dyn RoleStore>,
        policies: Arc<dyn PolicyStore>,
        resources: Arc<dyn ResourceStore>,
    ) -> Self {
        Self::with_config(roles, policies, resources, EngineConfig::default())
    }

    pub fn with_config(
        roles: Arc<dyn RoleStore>,
        policies: Arc<dyn PolicyStore>,
        resources: Arc<dyn ResourceStore>,
        config: EngineConfig,
    ) -> Self {
        info!(
            "AuthorizationEngine initialized with concurrent_evaluation={}, business_hours={}..={}",
            config.concurrent_evaluation,
            config.business_hours.start_hour,
            config.business_hours.end_hour
        );

        Self {
            rbac: RbacEvaluator::new(roles),
            abac: AbacEvaluator::new(policies, PolicyEvaluator::new(config.business_hours)),
            resources,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Decide whether the request in `ctx` is allowed.
    ///
    /// Never fails: a collaborator error or panic yields a DENY carrying an
    /// `authorization_error` reason.
    pub async fn authorize(&self, ctx: &AuthorizationContext) -> AuthorizationDecision {
        let start = Instant::now();
        let evaluated_at = Utc::now();
        // RBAC and ABAC see one instant; a time pinned with `at` is kept
        let pinned = ctx.evaluated_at(evaluated_at);
        let ctx = &pinned;

        debug!(
            "Authorization request: principal={}, permission={}, organization={:?}, resource={:?}",
            ctx.principal_id(),
            ctx.permission_name(),
            ctx.organization_id(),
            ctx.resource_id()
        );

        let evaluation = AssertUnwindSafe(self.evaluate(ctx)).catch_unwind().await;

        let decision = match evaluation {
            Ok(Ok((rbac, abac))) => {
                let result = combine(rbac.verdict, abac.verdict);
                let mut reasons = rbac.reasons;
                reasons.extend(abac.reasons);
                AuthorizationDecision::new(result, reasons, evaluated_at, start.elapsed())
            }
            Ok(Err(e)) => {
                warn!("Authorization failed for {}: {}", ctx.principal_id(), e);
                AuthorizationDecision::error(e, evaluated_at, start.elapsed())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!("Authorization panicked for {}: {}", ctx.principal_id(), message);
                AuthorizationDecision::error(message, evaluated_at, start.elapsed())
            }
        };

        info!(
            "Decision: {} for principal {} on {} in {:?}",
            decision.result,
            ctx.principal_id(),
            ctx.permission_name(),
            decision.evaluation_time
        );

        decision
    }

    async fn evaluate(&self, ctx: &AuthorizationContext) -> Result<(RbacOutcome, AbacOutcome)> {
        let enriched = self.enrich(ctx).await?;

        if self.config.concurrent_evaluation {
            try_join(self.rbac.evaluate(&enriched), self.abac.evaluate(&enriched)).await
        } else {
            let rbac = self.rbac.evaluate(&enriched).await?;
            let abac = self.abac.evaluate(&enriched).await?;
            Ok((rbac, abac))
        }
    }

    /// Merge the stored resource's attributes over the caller's.
    async fn enrich(&self, ctx: &AuthorizationContext) -> Result<AuthorizationContext> {
        let Some(resource_id) = ctx.resource_id() else {
            return Ok(ctx.clone());
        };

        match self
            .resources
            .get_resource(ctx.resource_type(), resource_id)
            .await?
        {
            Some(resource) => Ok(ctx.merge_resource_attributes(&resource.attribute_bag())),
            None => {
                debug!("Resource {} not found, context not enriched", resource_id);
                Ok(ctx.clone())
            }
        }
    }

    /// Boolean form of [`Self::authorize`] for one resource
    pub async fn can_access(
        &self,
        principal_id: PrincipalId,
        resource_type: &str,
        resource_id: Option<ResourceId>,
        action: &str,
        organization_id: Option<OrganizationId>,
    ) -> bool {
        let ctx = AuthorizationContext::new(principal_id, resource_type, action)
            .with_organization(organization_id)
            .with_resource_id(resource_id);

        self.authorize(&ctx).await.is_allowed()
    }

    /// Authorize each action independently
    pub async fn check_multiple(
        &self,
        principal_id: PrincipalId,
        resource_type: &str,
        actions: &[&str],
        organization_id: Option<OrganizationId>,
    ) -> HashMap<String, bool> {
        let mut results = HashMap::with_capacity(actions.len());
        for action in actions {
            let ctx = AuthorizationContext::new(principal_id, resource_type, *action)
                .with_organization(organization_id);
            let allowed = self.authorize(&ctx).await.is_allowed();
            results.insert(action.to_string(), allowed);
        }
        results
    }

    /// Check a permission given as `action` or `resource_type:action`.
    ///
    /// A full name must agree with `resource_type`.
    pub async fn check_user_has_permission(
        &self,
        principal_id: PrincipalId,
        permission_name: &str,
        resource_type: &str,
        organization_id: Option<OrganizationId>,
    ) -> bool {
        let action = match permission_name.split_once(':') {
            Some((named_type, action)) if named_type == resource_type => action,
            Some(_) => {
                debug!(
                    "Permission {} does not apply to resource type {}",
                    permission_name, resource_type
                );
                return false;
            }
            None => permission_name,
        };

        let ctx = AuthorizationContext::new(principal_id, resource_type, action)
            .with_organization(organization_id);
        self.authorize(&ctx).await.is_allowed()
    }

    /// Effective permissions of a principal with the roles that supplied them.
    ///
    /// `resource_type` keeps permissions for that type and for `*`.
    pub async fn get_user_permissions(
        &self,
        principal_id: PrincipalId,
        organization_id: Option<OrganizationId>,
        resource_type: Option<&str>,
    ) -> Result<Vec<UserPermission>> {
        let mut grants = self.rbac.resolve(principal_id, organization_id).await?.grants;

        if let Some(filter) = resource_type {
            grants.retain(|grant| {
                grant.permission.resource_type == filter
                    || grant.permission.resource_type == WILDCARD
            });
        }

        Ok(grants)
    }

    /// Names of the principal's active roles in `organization_id`
    pub async fn user_role_names(
        &self,
        principal_id: PrincipalId,
        organization_id: Option<OrganizationId>,
    ) -> Result<Vec<String>> {
        Ok(self
            .rbac
            .active_roles(principal_id, organization_id)
            .await?
            .into_iter()
            .map(|role| role.name)
            .collect())
    }

    pub async fn user_has_role(
        &self,
        principal_id: PrincipalId,
        role_name: &str,
        organization_id: Option<OrganizationId>,
    ) -> Result<bool> {
        Ok(self
            .user_role_names(principal_id, organization_id)
            .await?
            .iter()
            .any(|name| name == role_name))
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panic: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panic: {}", message)
    } else {
        "panic during evaluation".to_string()
    }
}
