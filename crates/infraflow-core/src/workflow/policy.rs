//! Workflow policy knobs
//!
//! Defaults lock submitted stages and enforce the phase guard.
//! [`WorkflowPolicy::permissive`] turns every guard off.

use serde::{Deserialize, Serialize};

/// What happens when a stage is saved while it awaits or has a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditPolicy {
    /// PENDING and APPROVED stages refuse edits with `StageLocked`
    #[default]
    Locked,
    /// Any save silently resets the stage to DRAFT
    ResetToDraft,
}

impl EditPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            EditPolicy::Locked => "locked",
            EditPolicy::ResetToDraft => "reset_to_draft",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "locked" => Some(EditPolicy::Locked),
            "reset_to_draft" => Some(EditPolicy::ResetToDraft),
            _ => None,
        }
    }
}

/// How reported execution progress is checked against earlier logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPolicy {
    /// Each log reports whatever it likes; a lower value reads as a correction
    #[default]
    FreeForm,
    /// A log may not report less than the current progress
    StrictMonotonic,
}

impl ProgressPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressPolicy::FreeForm => "free_form",
            ProgressPolicy::StrictMonotonic => "strict_monotonic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "free_form" => Some(ProgressPolicy::FreeForm),
            "strict_monotonic" => Some(ProgressPolicy::StrictMonotonic),
            _ => None,
        }
    }
}

/// Policy applied by [`InfraWorkflow`](super::InfraWorkflow) operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowPolicy {
    pub edit_policy: EditPolicy,
    pub progress_policy: ProgressPolicy,
    /// Stage operations require the project to sit in that stage's phase
    pub enforce_phase_guard: bool,
    /// `complete_project` requires the latest execution log to report 100%
    pub require_full_progress: bool,
}

impl Default for WorkflowPolicy {
    fn default() -> Self {
        Self {
            edit_policy: EditPolicy::Locked,
            progress_policy: ProgressPolicy::FreeForm,
            enforce_phase_guard: true,
            require_full_progress: false,
        }
    }
}

impl WorkflowPolicy {
    /// No engine-side guards; saving reopens any stage as a draft
    pub fn permissive() -> Self {
        Self {
            edit_policy: EditPolicy::ResetToDraft,
            progress_policy: ProgressPolicy::FreeForm,
            enforce_phase_guard: false,
            require_full_progress: false,
        }
    }

    pub fn with_edit_policy(mut self, edit_policy: EditPolicy) -> Self {
        self.edit_policy = edit_policy;
        self
    }

    pub fn with_progress_policy(mut self, progress_policy: ProgressPolicy) -> Self {
        self.progress_policy = progress_policy;
        self
    }

    pub fn with_phase_guard(mut self, enforce: bool) -> Self {
        self.enforce_phase_guard = enforce;
        self
    }

    pub fn with_full_progress_required(mut self, required: bool) -> Self {
        self.require_full_progress = required;
        self
    }
}
