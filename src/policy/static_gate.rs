use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{PolicyDecision, PolicyDecisionMatrix, PolicyEvaluateRequest, PolicyGate, PolicyStatus};
use crate::constants::SCHEMA_VERSION;
use crate::error::{AcquisitionError, Result};

/// Policy recorded for one source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePolicy {
    pub policy_id: String,
    pub status: PolicyStatus,
}

/// In-process policy gate backed by a per-source registry.
///
/// Sources without a registered policy evaluate as `unknown` with no policy id.
#[derive(Debug, Default)]
pub struct StaticPolicyGate {
    policies: DashMap<String, SourcePolicy>,
    matrix: PolicyDecisionMatrix,
}

impl StaticPolicyGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the policy for a source, returning the stored record
    pub fn upsert_policy(&self, source_id: &str, policy_id: &str, status: PolicyStatus) -> SourcePolicy {
        let policy = SourcePolicy {
            policy_id: policy_id.to_string(),
            status,
        };
        info!(source_id = %source_id, policy_id = %policy_id, status = %status, "🔐 Source policy updated");
        self.policies.insert(source_id.to_string(), policy.clone());
        policy
    }

    pub fn get_policy(&self, source_id: &str) -> Option<SourcePolicy> {
        self.policies.get(source_id).map(|p| p.value().clone())
    }
}

#[async_trait]
impl PolicyGate for StaticPolicyGate {
    async fn evaluate(&self, request: &PolicyEvaluateRequest) -> Result<PolicyDecision> {
        if request.schema_version != SCHEMA_VERSION {
            return Err(AcquisitionError::PolicyGate(format!(
                "schema_version must be {SCHEMA_VERSION}, got {}",
                request.schema_version
            )));
        }

        let policy = self.get_policy(&request.source_id);
        let status = policy
            .as_ref()
            .map(|p| p.status)
            .unwrap_or(PolicyStatus::Unknown);
        let (allowed_operations, reason) =
            self.matrix
                .evaluate(status, request.task_type, &request.requested_operation);

        debug!(
            source_id = %request.source_id,
            domain = %request.domain,
            task_type = %request.task_type,
            decision = %status,
            "Policy evaluated"
        );

        Ok(PolicyDecision {
            decision: status,
            allowed_operations,
            reason,
            policy_id: policy.map(|p| p.policy_id),
        })
    }
}
