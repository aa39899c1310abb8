//! Single-policy evaluation
//!
//! A policy applies to a request when it is active, its scope matches the
//! request and every condition holds against the evaluation dictionary:
//! the flattened context plus attributes computed from it.

use super::{lookup, Condition, ConditionOperator, Policy, PolicyEffect};
use crate::attributes::{AttributeValue, Attributes};
use crate::context::AuthorizationContext;
use crate::types::PolicyId;
use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// Inclusive hour window used for `is_business_hours`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessHours {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            start_hour: 9,
            end_hour: 17,
        }
    }
}

impl BusinessHours {
    pub fn contains(&self, hour: u32) -> bool {
        (self.start_hour..=self.end_hour).contains(&hour)
    }
}

/// Policy that applied to a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicablePolicy {
    pub policy_id: PolicyId,
    pub policy_name: String,
    pub effect: PolicyEffect,
    pub priority: i32,
    pub matched_conditions: Vec<Condition>,
}

/// Why a policy did not apply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotApplicable {
    Inactive,
    ResourceTypeMismatch,
    ActionMismatch,
    OrganizationMismatch,
    ConditionFailed { index: usize, attribute: String },
}

impl fmt::Display for NotApplicable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inactive => f.write_str("Policy is inactive"),
            Self::ResourceTypeMismatch => f.write_str("Resource type does not match"),
            Self::ActionMismatch => f.write_str("Action does not match"),
            Self::OrganizationMismatch => f.write_str("Organization does not match"),
            Self::ConditionFailed { index, attribute } => {
                write!(f, "Condition {} on '{}' not satisfied", index, attribute)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PolicyOutcome {
    Applicable(ApplicablePolicy),
    NotApplicable(NotApplicable),
}

impl PolicyOutcome {
    pub fn is_applicable(&self) -> bool {
        matches!(self, Self::Applicable(_))
    }
}

/// Per-condition trace produced by [`PolicyEvaluator::explain`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionTrace {
    pub index: usize,
    pub attribute: String,
    pub operator: ConditionOperator,
    pub expected: AttributeValue,
    pub actual: Option<AttributeValue>,
    pub result: bool,
}

/// Human-oriented breakdown of one policy against one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyExplanation {
    pub policy_id: PolicyId,
    pub policy_name: String,
    pub effect: PolicyEffect,
    pub applies: bool,
    /// Set when the policy was filtered out before its conditions ran
    pub scope_mismatch: Option<NotApplicable>,
    pub conditions: Vec<ConditionTrace>,
}

/// Stateless evaluator for a single policy
#[derive(Debug, Clone, Default)]
pub struct PolicyEvaluator {
    business_hours: BusinessHours,
}

impl PolicyEvaluator {
    pub fn new(business_hours: BusinessHours) -> Self {
        Self { business_hours }
    }

    pub fn business_hours(&self) -> BusinessHours {
        self.business_hours
    }

    /// Evaluate one policy against a request
    pub fn evaluate(&self, policy: &Policy, ctx: &AuthorizationContext) -> PolicyOutcome {
        let dictionary = self.evaluation_dictionary(ctx);
        self.evaluate_with(policy, ctx, &dictionary)
    }

    /// Evaluate against a dictionary already built by
    /// [`Self::evaluation_dictionary`] for the same `ctx`
    pub fn evaluate_with(
        &self,
        policy: &Policy,
        ctx: &AuthorizationContext,
        dictionary: &Attributes,
    ) -> PolicyOutcome {
        if let Err(mismatch) = scope_check(policy, ctx) {
            debug!("Policy '{}' not applicable: {}", policy.name, mismatch);
            return PolicyOutcome::NotApplicable(mismatch);
        }

        for (index, condition) in policy.conditions.iter().enumerate() {
            if let ConditionOperator::Unsupported(op) = &condition.operator {
                warn!(
                    "Policy '{}' uses unsupported operator '{}' on '{}'",
                    policy.name, op, condition.attribute
                );
            }
            if !condition.evaluate(dictionary) {
                debug!(
                    "Policy '{}' condition {} ({} {}) not satisfied",
                    policy.name, index, condition.attribute, condition.operator
                );
                return PolicyOutcome::NotApplicable(NotApplicable::ConditionFailed {
                    index,
                    attribute: condition.attribute.clone(),
                });
            }
        }

        PolicyOutcome::Applicable(ApplicablePolicy {
            policy_id: policy.id,
            policy_name: policy.name.clone(),
            effect: policy.effect,
            priority: policy.priority,
            matched_conditions: policy.conditions.clone(),
        })
    }

    /// Flattened context overlaid with computed attributes.
    ///
    /// Computed keys win over raw context fields, which win over the
    /// attribute bags.
    pub fn evaluation_dictionary(&self, ctx: &AuthorizationContext) -> Attributes {
        let mut dictionary = ctx.to_dictionary();
        dictionary.extend(self.computed_attributes(ctx));
        dictionary
    }

    /// Attributes derived from the context. Time-based keys use the
    /// pinned request time, or the current instant for an unpinned context.
    pub fn computed_attributes(&self, ctx: &AuthorizationContext) -> Attributes {
        let now = ctx.request_time().unwrap_or_else(Utc::now);
        let hour = now.hour();
        let weekday = now.weekday().num_days_from_monday();

        let mut computed = Attributes::new();
        computed.insert("request_time".into(), now.into());
        computed.insert("current_hour".into(), hour.into());
        computed.insert("current_day_of_week".into(), weekday.into());
        computed.insert("current_month".into(), now.month().into());
        computed.insert("current_year".into(), now.year().into());
        computed.insert("is_weekend".into(), (weekday >= 5).into());
        computed.insert(
            "is_business_hours".into(),
            self.business_hours.contains(hour).into(),
        );
        computed.insert("is_same_user".into(), ctx.is_resource_owner().into());
        computed.insert(
            "is_same_organization".into(),
            is_same_organization(ctx).into(),
        );
        computed.insert(
            "resource_age_days".into(),
            resource_age_days(ctx, now).into(),
        );
        computed.insert(
            "user_role_count".into(),
            ctx.user_attribute("roles")
                .and_then(AttributeValue::as_list)
                .map_or(0, <[AttributeValue]>::len)
                .into(),
        );

        computed
    }

    /// Evaluate one condition in isolation against a prepared dictionary
    pub fn test_condition(&self, condition: &Condition, dictionary: &Attributes) -> bool {
        condition.evaluate(dictionary)
    }

    /// Explain how each condition of `policy` fares against `ctx`.
    ///
    /// Unlike [`Self::evaluate`] every condition is traced, not just the
    /// first failing one.
    pub fn explain(&self, policy: &Policy, ctx: &AuthorizationContext) -> PolicyExplanation {
        let dictionary = self.evaluation_dictionary(ctx);
        let scope_mismatch = scope_check(policy, ctx).err();

        let conditions: Vec<ConditionTrace> = policy
            .conditions
            .iter()
            .enumerate()
            .map(|(index, condition)| ConditionTrace {
                index,
                attribute: condition.attribute.clone(),
                operator: condition.operator.clone(),
                expected: condition.value.clone(),
                actual: lookup(&dictionary, &condition.attribute).cloned(),
                result: condition.evaluate(&dictionary),
            })
            .collect();

        PolicyExplanation {
            policy_id: policy.id,
            policy_name: policy.name.clone(),
            effect: policy.effect,
            applies: scope_mismatch.is_none() && conditions.iter().all(|trace| trace.result),
            scope_mismatch,
            conditions,
        }
    }
}

/// Static checks on a policy's conditions
///
/// Reports empty attributes, unsupported operators, membership operators
/// without a list and ordering operators without a number.
pub fn validate_conditions(policy: &Policy) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    for (index, condition) in policy.conditions.iter().enumerate() {
        if condition.attribute.trim().is_empty() {
            errors.push(format!("Condition {}: attribute is empty", index));
        }
        if !condition.operator.is_supported() {
            errors.push(format!(
                "Condition {}: unsupported operator '{}'",
                index, condition.operator
            ));
        }
        if condition.operator.is_membership() && condition.value.as_list().is_none() {
            errors.push(format!(
                "Condition {}: operator '{}' requires a list value",
                index, condition.operator
            ));
        }
        if condition.operator.is_ordering() && condition.value.as_number().is_none() {
            errors.push(format!(
                "Condition {}: operator '{}' requires a numeric value",
                index, condition.operator
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn scope_check(policy: &Policy, ctx: &AuthorizationContext) -> Result<(), NotApplicable> {
    if !policy.is_active {
        return Err(NotApplicable::Inactive);
    }
    if policy.resource_type != ctx.resource_type() {
        return Err(NotApplicable::ResourceTypeMismatch);
    }
    if policy.action != ctx.action() {
        return Err(NotApplicable::ActionMismatch);
    }
    if let Some(scope) = policy.organization_id {
        if ctx.organization_id() != Some(scope) {
            return Err(NotApplicable::OrganizationMismatch);
        }
    }
    Ok(())
}

fn is_same_organization(ctx: &AuthorizationContext) -> bool {
    let Some(org) = ctx.organization_id() else {
        return false;
    };
    ctx.resource_attribute("organization_id")
        .and_then(AttributeValue::as_str)
        == Some(org.to_string().as_str())
}

/// Whole days since the resource's `created_at`; 0 when absent or unparseable
fn resource_age_days(ctx: &AuthorizationContext, now: DateTime<Utc>) -> i64 {
    ctx.resource_attribute("created_at")
        .and_then(AttributeValue::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map_or(0, |created| {
            (now - created.with_timezone(&Utc)).num_days()
        })
}
