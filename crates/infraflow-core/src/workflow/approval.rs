//! Approval status shared by every approvable stage
//!
//! ```text
//! DRAFT ──submit──▶ PENDING ──approve──▶ APPROVED
//!   ▲                  │
//!   └──save── REJECTED ◀┘ reject
//! ```
//!
//! REVISED only exists for proposals and behaves like DRAFT.

use serde::{Deserialize, Serialize};

use super::stage::StageKind;

/// Approval status of a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    #[default]
    Draft,
    Pending,
    Approved,
    Rejected,
    Revised,
}

impl ApprovalStatus {
    /// Convert to string for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Draft => "draft",
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
            ApprovalStatus::Revised => "revised",
        }
    }

    /// Parse from database string
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(ApprovalStatus::Draft),
            "pending" => Some(ApprovalStatus::Pending),
            "approved" => Some(ApprovalStatus::Approved),
            "rejected" => Some(ApprovalStatus::Rejected),
            "revised" => Some(ApprovalStatus::Revised),
            _ => None,
        }
    }

    /// Whether the stage fields may be changed in this status
    pub fn is_editable(&self, kind: StageKind) -> bool {
        match self {
            ApprovalStatus::Draft | ApprovalStatus::Rejected => true,
            ApprovalStatus::Revised => kind.allows_revised(),
            ApprovalStatus::Pending | ApprovalStatus::Approved => false,
        }
    }

    /// Whether the stage may be (re)submitted for a decision
    pub fn can_submit(&self) -> bool {
        !matches!(self, ApprovalStatus::Approved)
    }

    /// Whether an approver may approve or reject in this status
    pub fn awaits_decision(&self) -> bool {
        matches!(self, ApprovalStatus::Pending)
    }
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approval_status_parse() {
        assert_eq!(ApprovalStatus::parse("draft"), Some(ApprovalStatus::Draft));
        assert_eq!(ApprovalStatus::parse("pending"), Some(ApprovalStatus::Pending));
        assert_eq!(ApprovalStatus::parse("approved"), Some(ApprovalStatus::Approved));
        assert_eq!(ApprovalStatus::parse("rejected"), Some(ApprovalStatus::Rejected));
        assert_eq!(ApprovalStatus::parse("revised"), Some(ApprovalStatus::Revised));
        assert_eq!(ApprovalStatus::parse("APPROVED"), None);
    }

    #[test]
    fn test_editable_states() {
        for kind in [StageKind::Proposal, StageKind::Rkb, StageKind::Disbursement] {
            assert!(ApprovalStatus::Draft.is_editable(kind));
            assert!(ApprovalStatus::Rejected.is_editable(kind));
            assert!(!ApprovalStatus::Pending.is_editable(kind));
            assert!(!ApprovalStatus::Approved.is_editable(kind));
        }
        assert!(ApprovalStatus::Revised.is_editable(StageKind::Proposal));
        assert!(!ApprovalStatus::Revised.is_editable(StageKind::Rkb));
    }

    #[test]
    fn test_decisions_only_from_pending() {
        assert!(ApprovalStatus::Pending.awaits_decision());
        assert!(!ApprovalStatus::Draft.awaits_decision());
        assert!(!ApprovalStatus::Approved.awaits_decision());
        assert!(!ApprovalStatus::Approved.can_submit());
        assert!(ApprovalStatus::Rejected.can_submit());
    }
}
