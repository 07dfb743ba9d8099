//! Per-request workflow context
//!
//! `InfraWorkflow` borrows the database for one request and carries the
//! policy, the audit sink and the acting user. The stage, phase, budget and
//! execution operations are implemented on it in their own modules.

use tracing::debug;

use super::approval::ApprovalStatus;
use super::events::WorkflowEvent;
use super::phase::InfraPhase;
use super::policy::{EditPolicy, WorkflowPolicy};
use super::stage::StageKind;
use crate::actor::Actor;
use crate::audit::{self, AuditSink, NoopAuditSink};
use crate::commands::project::{self, Project, ProjectDetail};
use crate::error::{Error, Result};
use crate::storage::Database;

static NOOP_AUDIT: NoopAuditSink = NoopAuditSink;

/// Workflow engine bound to one database and one caller
#[derive(Clone, Copy)]
pub struct InfraWorkflow<'a> {
    db: &'a Database,
    policy: WorkflowPolicy,
    audit: &'a dyn AuditSink,
    actor: Option<&'a Actor>,
}

impl<'a> InfraWorkflow<'a> {
    /// Engine with the default policy, no audit trail and no caller
    pub fn new(db: &'a Database) -> Self {
        Self {
            db,
            policy: WorkflowPolicy::default(),
            audit: &NOOP_AUDIT,
            actor: None,
        }
    }

    /// Replace the workflow policy
    pub fn with_policy(mut self, policy: WorkflowPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Record events to `audit` after each commit
    pub fn with_audit(mut self, audit: &'a dyn AuditSink) -> Self {
        self.audit = audit;
        self
    }

    /// Run operations on behalf of `actor`
    pub fn acting_as(mut self, actor: &'a Actor) -> Self {
        self.actor = Some(actor);
        self
    }

    /// Database the engine operates on
    pub fn db(&self) -> &'a Database {
        self.db
    }

    /// Active workflow policy
    pub fn policy(&self) -> &WorkflowPolicy {
        &self.policy
    }

    /// Caller, if one was set
    pub fn actor(&self) -> Option<&'a Actor> {
        self.actor
    }

    /// Load a project with every workflow sub-record
    pub async fn get_full_project_data(&self, project_id: &str) -> Result<ProjectDetail> {
        project::get_full_project_data(self.db, project_id).await
    }

    /// Write audit entries for committed events
    pub(crate) async fn record(&self, events: &[WorkflowEvent]) {
        for event in events {
            debug!(event = event.event_type(), project_id = %event.project_id(), "Workflow event");
            audit::record_best_effort(self.audit, &event.to_audit_entry(self.actor)).await;
        }
    }

    /// The acting user, if allowed to approve or reject
    pub(crate) fn require_decider(&self, action: &str) -> Result<&'a Actor> {
        match self.actor {
            Some(actor) if actor.role.can_decide() => Ok(actor),
            _ => Err(Error::Unauthorized {
                action: action.to_string(),
            }),
        }
    }

    /// Check that `project` sits in `phase` before touching `stage`
    ///
    /// With the phase guard off only the infrastructure check applies.
    pub(crate) fn check_phase(&self, project: &Project, phase: InfraPhase, stage: &str) -> Result<()> {
        let current = project.current_phase.ok_or(Error::NotInfrastructureProject)?;
        if self.policy.enforce_phase_guard && current != phase {
            return Err(Error::WrongPhase {
                stage: stage.to_string(),
                current: current.to_string(),
            });
        }
        Ok(())
    }

    /// Check that a stage in `status` may be edited under the edit policy
    pub(crate) fn check_editable(&self, kind: StageKind, status: ApprovalStatus) -> Result<()> {
        match self.policy.edit_policy {
            EditPolicy::ResetToDraft => Ok(()),
            EditPolicy::Locked if status.is_editable(kind) => Ok(()),
            EditPolicy::Locked => Err(Error::StageLocked {
                stage: kind.label().to_string(),
                status: status.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Role;
    use crate::commands::project::ProjectType;

    #[tokio::test]
    async fn test_require_decider() {
        let db = Database::in_memory().await.unwrap();
        let admin = Actor::new("u1", "Rina", Role::Admin);
        let user = Actor::new("u2", "Budi", Role::User);

        assert!(InfraWorkflow::new(&db).require_decider("approve").is_err());
        assert!(InfraWorkflow::new(&db).acting_as(&user).require_decider("approve").is_err());
        let actor = InfraWorkflow::new(&db).acting_as(&admin).require_decider("approve").unwrap();
        assert_eq!(actor.id, "u1");
    }

    #[tokio::test]
    async fn test_check_phase_respects_guard() {
        let db = Database::in_memory().await.unwrap();
        let project = Project::new("Rack upgrade", ProjectType::Infrastructure);
        let web = Project::new("Blog", ProjectType::WebDev);

        let strict = InfraWorkflow::new(&db);
        assert!(strict.check_phase(&project, InfraPhase::Proposal, "Proposal").is_ok());
        assert!(matches!(
            strict.check_phase(&project, InfraPhase::Rkb, "RKB"),
            Err(Error::WrongPhase { .. })
        ));

        let loose = InfraWorkflow::new(&db).with_policy(WorkflowPolicy::default().with_phase_guard(false));
        assert!(loose.check_phase(&project, InfraPhase::Rkb, "RKB").is_ok());
        assert!(matches!(
            loose.check_phase(&web, InfraPhase::Rkb, "RKB"),
            Err(Error::NotInfrastructureProject)
        ));
    }

    #[tokio::test]
    async fn test_check_editable_by_policy() {
        let db = Database::in_memory().await.unwrap();
        let locked = InfraWorkflow::new(&db);
        assert!(locked.check_editable(StageKind::Rkb, ApprovalStatus::Rejected).is_ok());
        assert!(matches!(
            locked.check_editable(StageKind::Rkb, ApprovalStatus::Pending),
            Err(Error::StageLocked { .. })
        ));

        let reopen = InfraWorkflow::new(&db).with_policy(WorkflowPolicy::default().with_edit_policy(EditPolicy::ResetToDraft));
        assert!(reopen.check_editable(StageKind::Rkb, ApprovalStatus::Approved).is_ok());
    }
}
