use super::PolicyStatus;
use crate::constants::REQUESTED_OPERATION;
use crate::models::TaskType;

/// Maps a source's policy status to the task types it permits.
///
/// | status             | allowed           |
/// |--------------------|-------------------|
/// | `crawl_allowed`    | every task type   |
/// | `manual_only`      | `ImportTask`      |
/// | `partner_required` | none              |
/// | `unknown`          | none              |
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyDecisionMatrix;

impl PolicyDecisionMatrix {
    pub fn allowed_operations(&self, status: PolicyStatus) -> Vec<TaskType> {
        match status {
            PolicyStatus::CrawlAllowed => TaskType::ALL.to_vec(),
            PolicyStatus::ManualOnly => vec![TaskType::Import],
            PolicyStatus::PartnerRequired | PolicyStatus::Unknown => Vec::new(),
        }
    }

    /// Allowed task types plus a human-readable reason
    pub fn evaluate(
        &self,
        status: PolicyStatus,
        task_type: TaskType,
        requested_operation: &str,
    ) -> (Vec<TaskType>, String) {
        let allowed = self.allowed_operations(status);
        let mut reason = match status {
            PolicyStatus::CrawlAllowed => "crawl_allowed: automation permitted",
            PolicyStatus::ManualOnly => "manual_only: ImportTask only",
            PolicyStatus::PartnerRequired => "partner_required: automation blocked until review",
            PolicyStatus::Unknown => "unknown: automation blocked until review",
        }
        .to_string();

        if !allowed.contains(&task_type) {
            reason.push_str(&format!("; requested {task_type} denied"));
        }
        if requested_operation != REQUESTED_OPERATION {
            reason.push_str(&format!("; requested_operation={requested_operation}"));
        }

        (allowed, reason)
    }
}
