//! Workflow events
//!
//! Every mutating workflow operation produces events. [`StageApproved`] is
//! handed to the phase controller inside the approval transaction; all
//! events are turned into audit entries after commit.

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::phase::InfraPhase;
use super::stage::StageKind;
use crate::actor::Actor;
use crate::audit::AuditEntry;

/// Entity name recorded for workflow audit entries
pub const PROJECT_ENTITY: &str = "PROJECT";

/// A stage was approved; the phase it gates may now advance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageApproved {
    pub project_id: String,
    pub stage: StageKind,
    pub approved_by: String,
}

/// Something that happened to an infrastructure project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    StageSaved {
        project_id: String,
        stage: StageKind,
    },
    StageSubmitted {
        project_id: String,
        stage: StageKind,
    },
    StageApproved(StageApproved),
    StageRejected {
        project_id: String,
        stage: StageKind,
        reason: String,
    },
    PhaseAdvanced {
        project_id: String,
        from: InfraPhase,
        to: InfraPhase,
    },
    RkbItemAdded {
        project_id: String,
        item_id: String,
        total_budget: i64,
    },
    RkbItemRemoved {
        project_id: String,
        item_id: String,
        total_budget: i64,
    },
    ExecutionLogged {
        project_id: String,
        log_id: String,
        progress: i64,
    },
    ProjectCompleted {
        project_id: String,
        from: InfraPhase,
    },
}

impl WorkflowEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            WorkflowEvent::StageSaved { .. } => "stage_saved",
            WorkflowEvent::StageSubmitted { .. } => "stage_submitted",
            WorkflowEvent::StageApproved(_) => "stage_approved",
            WorkflowEvent::StageRejected { .. } => "stage_rejected",
            WorkflowEvent::PhaseAdvanced { .. } => "phase_advanced",
            WorkflowEvent::RkbItemAdded { .. } => "rkb_item_added",
            WorkflowEvent::RkbItemRemoved { .. } => "rkb_item_removed",
            WorkflowEvent::ExecutionLogged { .. } => "execution_logged",
            WorkflowEvent::ProjectCompleted { .. } => "project_completed",
        }
    }

    pub fn project_id(&self) -> &str {
        match self {
            WorkflowEvent::StageApproved(e) => &e.project_id,
            WorkflowEvent::StageSaved { project_id, .. }
            | WorkflowEvent::StageSubmitted { project_id, .. }
            | WorkflowEvent::StageRejected { project_id, .. }
            | WorkflowEvent::PhaseAdvanced { project_id, .. }
            | WorkflowEvent::RkbItemAdded { project_id, .. }
            | WorkflowEvent::RkbItemRemoved { project_id, .. }
            | WorkflowEvent::ExecutionLogged { project_id, .. }
            | WorkflowEvent::ProjectCompleted { project_id, .. } => project_id,
        }
    }

    /// Audit action name, e.g. `APPROVE_RKB`
    pub fn action(&self) -> String {
        match self {
            WorkflowEvent::StageSaved { stage, .. } => format!("SAVE_{}", stage.audit_key()),
            WorkflowEvent::StageSubmitted { stage, .. } => format!("SUBMIT_{}", stage.audit_key()),
            WorkflowEvent::StageApproved(e) => format!("APPROVE_{}", e.stage.audit_key()),
            WorkflowEvent::StageRejected { stage, .. } => format!("REJECT_{}", stage.audit_key()),
            WorkflowEvent::PhaseAdvanced { .. } => "ADVANCE_PHASE".to_string(),
            WorkflowEvent::RkbItemAdded { .. } => "ADD_RKB_ITEM".to_string(),
            WorkflowEvent::RkbItemRemoved { .. } => "REMOVE_RKB_ITEM".to_string(),
            WorkflowEvent::ExecutionLogged { .. } => "LOG_EXECUTION".to_string(),
            WorkflowEvent::ProjectCompleted { .. } => "COMPLETE_PROJECT".to_string(),
        }
    }

    /// Event payload without the project id
    pub fn details(&self) -> serde_json::Value {
        match self {
            WorkflowEvent::StageSaved { stage, .. } | WorkflowEvent::StageSubmitted { stage, .. } => {
                json!({ "stage": stage })
            }
            WorkflowEvent::StageApproved(e) => {
                json!({ "stage": e.stage, "approved_by": e.approved_by })
            }
            WorkflowEvent::StageRejected { stage, reason, .. } => {
                json!({ "stage": stage, "reason": reason })
            }
            WorkflowEvent::PhaseAdvanced { from, to, .. } => json!({ "from": from, "to": to }),
            WorkflowEvent::RkbItemAdded {
                item_id,
                total_budget,
                ..
            }
            | WorkflowEvent::RkbItemRemoved {
                item_id,
                total_budget,
                ..
            } => json!({ "item_id": item_id, "total_budget": total_budget }),
            WorkflowEvent::ExecutionLogged {
                log_id, progress, ..
            } => json!({ "log_id": log_id, "progress": progress }),
            WorkflowEvent::ProjectCompleted { from, .. } => json!({ "from": from }),
        }
    }

    pub fn to_audit_entry(&self, actor: Option<&Actor>) -> AuditEntry {
        AuditEntry::new(
            self.action(),
            PROJECT_ENTITY,
            self.project_id(),
            Some(self.details().to_string()),
            actor.map(|a| a.id.clone()),
        )
    }
}
