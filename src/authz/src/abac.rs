//! Attribute-based evaluation over prioritized policies
//!
//! Candidates are evaluated highest priority first. Priority only orders
//! evaluation and reporting: any applicable DENY decides the verdict.

use crate::context::AuthorizationContext;
use crate::engine::decision::{AbacVerdict, DecisionReason};
use crate::error::Result;
use crate::policy::{Policy, PolicyEffect, PolicyEvaluator, PolicyOutcome};
use crate::store::PolicyStore;
use std::cmp::Reverse;
use std::sync::Arc;
use tracing::debug;

/// ABAC verdict with its reasons
#[derive(Debug, Clone, PartialEq)]
pub struct AbacOutcome {
    pub verdict: AbacVerdict,
    pub reasons: Vec<DecisionReason>,
}

pub struct AbacEvaluator {
    policies: Arc<dyn PolicyStore>,
    evaluator: PolicyEvaluator,
}

impl AbacEvaluator {
    pub fn new(policies: Arc<dyn PolicyStore>, evaluator: PolicyEvaluator) -> Self {
        Self {
            policies,
            evaluator,
        }
    }

    /// Fetch candidates for the request and evaluate them
    pub async fn evaluate(&self, ctx: &AuthorizationContext) -> Result<AbacOutcome> {
        let candidates = self
            .policies
            .applicable_policies(ctx.resource_type(), ctx.action(), ctx.organization_id())
            .await?;

        debug!(
            "{} candidate policies for {}",
            candidates.len(),
            ctx.permission_name()
        );

        Ok(self.evaluate_candidates(&candidates, ctx))
    }

    /// Evaluate an already fetched candidate set
    pub fn evaluate_candidates(
        &self,
        candidates: &[Policy],
        ctx: &AuthorizationContext,
    ) -> AbacOutcome {
        if candidates.is_empty() {
            return AbacOutcome {
                verdict: AbacVerdict::NotApplicable,
                reasons: vec![DecisionReason::AbacNoPolicies {
                    message: "No policies defined for this resource and action".to_string(),
                    resource_type: ctx.resource_type().to_string(),
                    action: ctx.action().to_string(),
                }],
            };
        }

        let mut ordered: Vec<&Policy> = candidates.iter().collect();
        ordered.sort_by_key(|policy| Reverse(policy.priority));

        let dictionary = self.evaluator.evaluation_dictionary(ctx);
        let mut reasons = Vec::new();
        let mut any_allow = false;
        let mut any_deny = false;

        for policy in ordered {
            let PolicyOutcome::Applicable(applied) =
                self.evaluator.evaluate_with(policy, ctx, &dictionary)
            else {
                continue;
            };

            match applied.effect {
                PolicyEffect::Allow => any_allow = true,
                PolicyEffect::Deny => any_deny = true,
            }

            reasons.push(DecisionReason::PolicyEvaluation {
                message: format!("Policy '{}' applied: {}", applied.policy_name, applied.effect),
                policy_id: applied.policy_id,
                policy_name: applied.policy_name,
                effect: applied.effect,
                priority: applied.priority,
                matched_conditions: applied.matched_conditions,
            });
        }

        let verdict = if any_deny {
            AbacVerdict::Deny
        } else if any_allow {
            AbacVerdict::Allow
        } else {
            reasons.push(DecisionReason::AbacNotApplicable {
                message: format!("None of {} policies applied", candidates.len()),
                candidate_policies: candidates.len(),
            });
            AbacVerdict::NotApplicable
        };

        debug!("ABAC verdict {:?} for {}", verdict, ctx.permission_name());
        AbacOutcome { verdict, reasons }
    }
}
