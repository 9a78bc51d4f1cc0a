//! `propose_plan` and `compact_summary` (C7, §6): no-op side channels with
//! a typed payload. Neither does anything useful on its own; the value is
//! in forcing a structured shape out of free-form text that a tool host
//! can render as a live plan or a compacted history entry.

use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStepStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub step: String,
    pub status: PlanStepStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProposePlanArgs {
    #[serde(default)]
    pub explanation: Option<String>,
    pub plan: Vec<PlanStep>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProposePlanResult {
    pub success: bool,
    pub plan: Vec<PlanStep>,
}

/// Echoes the proposed plan back as the acknowledged payload; a tool host
/// renders it as a live plan view. Nothing is persisted.
pub fn propose_plan(args: ProposePlanArgs) -> ProposePlanResult {
    ProposePlanResult {
        success: true,
        plan: args.plan,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompactSummaryArgs {
    pub summary: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompactSummaryResult {
    pub success: bool,
    pub summary: String,
}

/// Acknowledges a context-compaction summary the caller wants recorded in
/// the conversation history. Nothing is persisted by this crate.
pub fn compact_summary(args: CompactSummaryArgs) -> CompactSummaryResult {
    CompactSummaryResult {
        success: true,
        summary: args.summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn propose_plan_echoes_steps() {
        let result = propose_plan(ProposePlanArgs {
            explanation: None,
            plan: vec![PlanStep {
                step: "explore the codebase".to_string(),
                status: PlanStepStatus::InProgress,
            }],
        });
        assert!(result.success);
        assert_eq!(result.plan.len(), 1);
    }
}
