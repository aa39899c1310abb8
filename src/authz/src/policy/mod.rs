//! ABAC policy definitions and condition operators

pub mod evaluator;

pub use evaluator::{
    ApplicablePolicy, BusinessHours, ConditionTrace, NotApplicable, PolicyEvaluator,
    PolicyExplanation, PolicyOutcome,
};

use crate::attributes::{AttributeValue, Attributes};
use crate::context::{ENV_NAMESPACE, ENV_PREFIX, RESOURCE_PREFIX};
use crate::types::{OrganizationId, PolicyId, PrincipalId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Policy effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PolicyEffect {
    /// Allow the action
    #[serde(alias = "allow")]
    Allow,
    /// Deny the action
    #[serde(alias = "deny")]
    Deny,
}

impl fmt::Display for PolicyEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => f.write_str("allow"),
            Self::Deny => f.write_str("deny"),
        }
    }
}

/// Comparison applied by a [`Condition`]
///
/// Stored policies may carry operators this engine does not know; they are
/// kept as [`ConditionOperator::Unsupported`] and never hold.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConditionOperator {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
    In,
    NotIn,
    Contains,
    Unsupported(String),
}

impl ConditionOperator {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Gt => "gt",
            Self::Lt => "lt",
            Self::Gte => "gte",
            Self::Lte => "lte",
            Self::In => "in",
            Self::NotIn => "not_in",
            Self::Contains => "contains",
            Self::Unsupported(raw) => raw,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported(_))
    }

    pub fn is_ordering(&self) -> bool {
        matches!(self, Self::Gt | Self::Lt | Self::Gte | Self::Lte)
    }

    pub fn is_membership(&self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }

    /// Apply the operator to an actual (context) value and an expected value.
    ///
    /// Ordering operators need two numbers, `in`/`not_in` need a list as the
    /// expected value, `contains` needs a list or a string as the actual
    /// value. Anything else is false.
    pub fn apply(&self, actual: &AttributeValue, expected: &AttributeValue) -> bool {
        match self {
            Self::Eq => actual == expected,
            Self::Ne => actual != expected,
            Self::Gt | Self::Lt | Self::Gte | Self::Lte => {
                let (Some(lhs), Some(rhs)) = (actual.as_number(), expected.as_number()) else {
                    return false;
                };
                match self {
                    Self::Gt => lhs > rhs,
                    Self::Lt => lhs < rhs,
                    Self::Gte => lhs >= rhs,
                    _ => lhs <= rhs,
                }
            }
            Self::In => expected
                .as_list()
                .is_some_and(|items| items.contains(actual)),
            Self::NotIn => expected
                .as_list()
                .is_some_and(|items| !items.contains(actual)),
            Self::Contains => match (actual, expected) {
                (AttributeValue::List(items), needle) => items.contains(needle),
                (AttributeValue::String(haystack), AttributeValue::String(needle)) => {
                    haystack.contains(needle.as_str())
                }
                _ => false,
            },
            Self::Unsupported(_) => false,
        }
    }
}

impl From<String> for ConditionOperator {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "eq" => Self::Eq,
            "ne" => Self::Ne,
            "gt" => Self::Gt,
            "lt" => Self::Lt,
            "gte" => Self::Gte,
            "lte" => Self::Lte,
            "in" => Self::In,
            "not_in" => Self::NotIn,
            "contains" => Self::Contains,
            _ => Self::Unsupported(raw),
        }
    }
}

impl From<&str> for ConditionOperator {
    fn from(raw: &str) -> Self {
        Self::from(raw.to_string())
    }
}

impl From<ConditionOperator> for String {
    fn from(op: ConditionOperator) -> Self {
        op.as_str().to_string()
    }
}

impl fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `attribute <operator> value`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Flat key (`resource_owner_id`) or dotted path (`resource.owner_id`)
    pub attribute: String,
    pub operator: ConditionOperator,
    pub value: AttributeValue,
}

impl Condition {
    pub fn new(
        attribute: impl Into<String>,
        operator: impl Into<ConditionOperator>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        Self {
            attribute: attribute.into(),
            operator: operator.into(),
            value: value.into(),
        }
    }

    /// Evaluate against an evaluation dictionary.
    ///
    /// A missing or null attribute makes the condition false.
    pub fn evaluate(&self, dictionary: &Attributes) -> bool {
        match lookup(dictionary, &self.attribute) {
            Some(actual) if !actual.is_null() => self.operator.apply(actual, &self.value),
            _ => false,
        }
    }
}

/// Resolve a condition attribute against an evaluation dictionary.
///
/// The path is first looked up verbatim, which resolves `user.x`,
/// `resource.x` and `env.x` against the attribute bags. `environment.x` is an
/// alias of `env.x`. A dotted path missing from its bag falls back to the
/// flattened key (`user.x` → `x`, `resource.x` → `resource_x`,
/// `env.x` → `env_x`), which is how `resource.type` reaches the requested
/// resource type.
pub fn lookup<'d>(dictionary: &'d Attributes, path: &str) -> Option<&'d AttributeValue> {
    if let Some(value) = dictionary.get(path) {
        return Some(value);
    }

    let (namespace, key) = path.split_once('.')?;
    let flat = match namespace {
        "user" => key.to_string(),
        "resource" => format!("{RESOURCE_PREFIX}{key}"),
        "env" => format!("{ENV_PREFIX}{key}"),
        "environment" => {
            if let Some(value) = dictionary.get(&format!("{ENV_NAMESPACE}{key}")) {
                return Some(value);
            }
            format!("{ENV_PREFIX}{key}")
        }
        _ => return None,
    };
    dictionary.get(&flat)
}

/// Named, prioritized ABAC rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub id: PolicyId,

    pub name: String,

    #[serde(default)]
    pub description: String,

    pub effect: PolicyEffect,

    pub resource_type: String,

    pub action: String,

    /// All must hold for the policy to apply
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// `None` applies to every organization
    #[serde(default)]
    pub organization_id: Option<OrganizationId>,

    pub created_by: PrincipalId,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(default = "default_true")]
    pub is_active: bool,

    /// Higher is evaluated (and reported) first
    #[serde(default)]
    pub priority: i32,
}

fn default_true() -> bool {
    true
}

impl Policy {
    pub fn new(
        name: impl Into<String>,
        effect: PolicyEffect,
        resource_type: impl Into<String>,
        action: impl Into<String>,
        created_by: PrincipalId,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            effect,
            resource_type: resource_type.into(),
            action: action.into(),
            conditions: Vec::new(),
            organization_id: None,
            created_by,
            created_at: Utc::now(),
            updated_at: None,
            is_active: true,
            priority: 0,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn in_organization(mut self, organization_id: OrganizationId) -> Self {
        self.organization_id = Some(organization_id);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Scope filter: active, same resource type and action, and either
    /// global or scoped to `organization_id`
    pub fn matches_request(
        &self,
        resource_type: &str,
        action: &str,
        organization_id: Option<OrganizationId>,
    ) -> bool {
        self.is_active
            && self.resource_type == resource_type
            && self.action == action
            && self
                .organization_id
                .map_or(true, |scope| Some(scope) == organization_id)
    }

    pub fn update_conditions(&self, conditions: Vec<Condition>) -> Self {
        Self {
            conditions,
            updated_at: Some(Utc::now()),
            ..self.clone()
        }
    }

    pub fn update_priority(&self, priority: i32) -> Self {
        Self {
            priority,
            updated_at: Some(Utc::now()),
            ..self.clone()
        }
    }

    pub fn deactivate(&self) -> Self {
        Self {
            is_active: false,
            updated_at: Some(Utc::now()),
            ..self.clone()
        }
    }

    pub fn activate(&self) -> Self {
        Self {
            is_active: true,
            updated_at: Some(Utc::now()),
            ..self.clone()
        }
    }
}
