//! Authorization decision types and the RBAC/ABAC combination rule

use crate::policy::{Condition, PolicyEffect};
use crate::types::{OrganizationId, PolicyId, PrincipalId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Final outcome of one `authorize` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DecisionResult {
    Allow,
    Deny,
}

impl fmt::Display for DecisionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => f.write_str("ALLOW"),
            Self::Deny => f.write_str("DENY"),
        }
    }
}

/// RBAC sub-verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RbacVerdict {
    Allow,
    Deny,
}

/// ABAC sub-verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbacVerdict {
    Allow,
    Deny,
    NotApplicable,
}

/// Combine the two sub-verdicts.
///
/// An ABAC deny always wins; otherwise either ALLOW suffices; otherwise DENY.
pub fn combine(rbac: RbacVerdict, abac: AbacVerdict) -> DecisionResult {
    match (rbac, abac) {
        (_, AbacVerdict::Deny) => DecisionResult::Deny,
        (_, AbacVerdict::Allow) => DecisionResult::Allow,
        (RbacVerdict::Allow, AbacVerdict::NotApplicable) => DecisionResult::Allow,
        (RbacVerdict::Deny, AbacVerdict::NotApplicable) => DecisionResult::Deny,
    }
}

/// Discriminant of a [`DecisionReason`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonKind {
    RbacAllow,
    RbacDeny,
    RbacNoRoles,
    RbacNoPermissions,
    AbacNoPolicies,
    AbacNotApplicable,
    PolicyEvaluation,
    AuthorizationError,
    DefaultDeny,
}

impl ReasonKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RbacAllow => "rbac_allow",
            Self::RbacDeny => "rbac_deny",
            Self::RbacNoRoles => "rbac_no_roles",
            Self::RbacNoPermissions => "rbac_no_permissions",
            Self::AbacNoPolicies => "abac_no_policies",
            Self::AbacNotApplicable => "abac_not_applicable",
            Self::PolicyEvaluation => "policy_evaluation",
            Self::AuthorizationError => "authorization_error",
            Self::DefaultDeny => "default_deny",
        }
    }
}

impl fmt::Display for ReasonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a decision's reason trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionReason {
    RbacAllow {
        message: String,
        /// Key that matched, e.g. `document:*`
        matched_permission: String,
        roles: Vec<String>,
    },

    RbacDeny {
        message: String,
        required_permission: String,
        user_permissions: Vec<String>,
        roles: Vec<String>,
    },

    RbacNoRoles {
        message: String,
        principal_id: PrincipalId,
        organization_id: Option<OrganizationId>,
    },

    RbacNoPermissions {
        message: String,
        roles: Vec<String>,
    },

    AbacNoPolicies {
        message: String,
        resource_type: String,
        action: String,
    },

    AbacNotApplicable {
        message: String,
        candidate_policies: usize,
    },

    PolicyEvaluation {
        message: String,
        policy_id: PolicyId,
        policy_name: String,
        effect: PolicyEffect,
        priority: i32,
        matched_conditions: Vec<Condition>,
    },

    AuthorizationError {
        message: String,
        error: String,
    },

    DefaultDeny {
        message: String,
    },
}

impl DecisionReason {
    pub fn kind(&self) -> ReasonKind {
        match self {
            Self::RbacAllow { .. } => ReasonKind::RbacAllow,
            Self::RbacDeny { .. } => ReasonKind::RbacDeny,
            Self::RbacNoRoles { .. } => ReasonKind::RbacNoRoles,
            Self::RbacNoPermissions { .. } => ReasonKind::RbacNoPermissions,
            Self::AbacNoPolicies { .. } => ReasonKind::AbacNoPolicies,
            Self::AbacNotApplicable { .. } => ReasonKind::AbacNotApplicable,
            Self::PolicyEvaluation { .. } => ReasonKind::PolicyEvaluation,
            Self::AuthorizationError { .. } => ReasonKind::AuthorizationError,
            Self::DefaultDeny { .. } => ReasonKind::DefaultDeny,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::RbacAllow { message, .. }
            | Self::RbacDeny { message, .. }
            | Self::RbacNoRoles { message, .. }
            | Self::RbacNoPermissions { message, .. }
            | Self::AbacNoPolicies { message, .. }
            | Self::AbacNotApplicable { message, .. }
            | Self::PolicyEvaluation { message, .. }
            | Self::AuthorizationError { message, .. }
            | Self::DefaultDeny { message } => message,
        }
    }

    pub fn authorization_error(error: impl fmt::Display) -> Self {
        let error = error.to_string();
        Self::AuthorizationError {
            message: format!("Authorization failed: {}", error),
            error,
        }
    }

    pub fn default_deny() -> Self {
        Self::DefaultDeny {
            message: "No rule granted access".to_string(),
        }
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind(), self.message())
    }
}

/// Authorization decision with its reason trail and timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationDecision {
    pub id: Uuid,

    pub result: DecisionResult,

    /// RBAC reasons first, then ABAC reasons
    pub reasons: Vec<DecisionReason>,

    pub evaluated_at: DateTime<Utc>,

    pub evaluation_time: Duration,
}

impl AuthorizationDecision {
    /// Build a decision. A DENY is never left without a reason.
    pub fn new(
        result: DecisionResult,
        mut reasons: Vec<DecisionReason>,
        evaluated_at: DateTime<Utc>,
        evaluation_time: Duration,
    ) -> Self {
        if result == DecisionResult::Deny && reasons.is_empty() {
            reasons.push(DecisionReason::default_deny());
        }

        Self {
            id: Uuid::new_v4(),
            result,
            reasons,
            evaluated_at,
            evaluation_time,
        }
    }

    /// Fail-closed decision for an evaluation that could not complete
    pub fn error(
        error: impl fmt::Display,
        evaluated_at: DateTime<Utc>,
        evaluation_time: Duration,
    ) -> Self {
        Self::new(
            DecisionResult::Deny,
            vec![DecisionReason::authorization_error(error)],
            evaluated_at,
            evaluation_time,
        )
    }

    pub fn is_allowed(&self) -> bool {
        self.result == DecisionResult::Allow
    }

    pub fn is_denied(&self) -> bool {
        self.result == DecisionResult::Deny
    }

    pub fn primary_reason(&self) -> Option<&DecisionReason> {
        self.reasons.first()
    }

    pub fn reasons_of(&self, kind: ReasonKind) -> Vec<&DecisionReason> {
        self.reasons.iter().filter(|r| r.kind() == kind).collect()
    }

    pub fn has_reason(&self, kind: ReasonKind) -> bool {
        self.reasons.iter().any(|r| r.kind() == kind)
    }

    /// One-line summary, e.g. `DENY (rbac_no_roles, policy_evaluation) in 42µs`
    pub fn summary(&self) -> String {
        let kinds: Vec<&str> = self.reasons.iter().map(|r| r.kind().as_str()).collect();
        format!(
            "{} ({}) in {:?}",
            self.result,
            kinds.join(", "),
            self.evaluation_time
        )
    }
}
