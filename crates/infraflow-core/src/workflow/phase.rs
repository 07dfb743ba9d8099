//! Phase controller
//!
//! Owns `projects.current_phase` and is the only code that moves it. The
//! phase advances one step at a time and only when the outgoing phase's stage
//! is approved:
//!
//! ```text
//! PROPOSAL ─▶ RKB ─▶ DISBURSEMENT ─▶ EXECUTION ─▶ COMPLETED
//!  (gate)     (gate)     (gate)       (explicit)
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::{debug, info};

use super::approval::ApprovalStatus;
use super::engine::InfraWorkflow;
use super::events::{StageApproved, WorkflowEvent};
use super::execution;
use super::stage::{self, StageKind};
use crate::commands::project::{self, Project, ProjectStatus};
use crate::error::{Error, Result};

/// Phase of an infrastructure project
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfraPhase {
    Proposal,
    Rkb,
    Disbursement,
    Execution,
    Completed,
}

impl InfraPhase {
    /// Fixed phase order
    pub const ORDER: [InfraPhase; 5] = [
        InfraPhase::Proposal,
        InfraPhase::Rkb,
        InfraPhase::Disbursement,
        InfraPhase::Execution,
        InfraPhase::Completed,
    ];

    /// Convert to string for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            InfraPhase::Proposal => "proposal",
            InfraPhase::Rkb => "rkb",
            InfraPhase::Disbursement => "disbursement",
            InfraPhase::Execution => "execution",
            InfraPhase::Completed => "completed",
        }
    }

    /// Parse from database string
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "proposal" => Some(InfraPhase::Proposal),
            "rkb" => Some(InfraPhase::Rkb),
            "disbursement" => Some(InfraPhase::Disbursement),
            "execution" => Some(InfraPhase::Execution),
            "completed" => Some(InfraPhase::Completed),
            _ => None,
        }
    }

    /// Position in [`InfraPhase::ORDER`]
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// The following phase, or `None` once completed
    pub fn next(&self) -> Option<InfraPhase> {
        Self::ORDER.get(self.index() + 1).copied()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InfraPhase::Completed)
    }
}

impl std::fmt::Display for InfraPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A completed move from one phase to the next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: InfraPhase,
    pub to: InfraPhase,
}

impl PhaseTransition {
    fn into_event(self, project_id: &str) -> WorkflowEvent {
        WorkflowEvent::PhaseAdvanced {
            project_id: project_id.to_string(),
            from: self.from,
            to: self.to,
        }
    }
}

/// Advance the project one phase inside an open transaction
///
/// The caller must already hold the project lock.
pub(crate) async fn advance_in_tx(
    conn: &mut SqliteConnection,
    project_id: &str,
) -> Result<PhaseTransition> {
    let project = project::fetch_project(conn, project_id)
        .await?
        .ok_or_else(|| Error::ProjectNotFound(project_id.to_string()))?;

    let current = project.current_phase.ok_or(Error::NotInfrastructureProject)?;
    let next = current.next().ok_or(Error::AlreadyCompleted)?;

    if let Some(kind) = StageKind::gating(current) {
        let status = stage::fetch_status(conn, kind, project_id).await?;
        if status != Some(ApprovalStatus::Approved) {
            return Err(Error::PhaseNotApproved(kind.label().to_string()));
        }
    }

    let status = if next.is_terminal() {
        ProjectStatus::Completed
    } else {
        ProjectStatus::InProgress
    };

    let updated = sqlx::query(
        "UPDATE projects SET current_phase = ?, status = ?, updated_at = ? WHERE id = ? AND current_phase = ?",
    )
    .bind(next.as_str())
    .bind(status.as_str())
    .bind(Utc::now())
    .bind(project_id)
    .bind(current.as_str())
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if updated == 0 {
        return Err(Error::ConcurrentModification(project_id.to_string()));
    }

    info!(project_id = %project_id, from = %current, to = %next, "Advanced project phase");
    Ok(PhaseTransition { from: current, to: next })
}

/// Consume a stage approval and advance the phase it gates
///
/// Returns `None` when the project already moved past the approved stage's
/// phase, which happens when a concurrent approval won.
pub(crate) async fn on_stage_approved(
    conn: &mut SqliteConnection,
    event: &StageApproved,
) -> Result<Option<PhaseTransition>> {
    let project = project::fetch_project(conn, &event.project_id)
        .await?
        .ok_or_else(|| Error::ProjectNotFound(event.project_id.clone()))?;

    let current = project.current_phase.ok_or(Error::NotInfrastructureProject)?;
    if current > event.stage.phase() {
        debug!(
            project_id = %event.project_id,
            stage = event.stage.label(),
            current = %current,
            "Phase already past approved stage"
        );
        return Ok(None);
    }

    advance_in_tx(conn, &event.project_id).await.map(Some)
}

impl<'a> InfraWorkflow<'a> {
    /// Advance a project to its next phase
    ///
    /// Fails with `PhaseNotApproved` unless the outgoing phase's stage is
    /// approved. Approvals call this implicitly; calling it directly is the
    /// manual reconciliation path.
    pub async fn advance_phase(&self, project_id: &str) -> Result<InfraPhase> {
        let mut tx = self.db().begin().await?;
        project::lock_project(&mut tx, project_id).await?;
        let transition = advance_in_tx(&mut tx, project_id).await?;
        tx.commit().await?;

        self.record(&[transition.into_event(project_id)]).await;
        Ok(transition.to)
    }

    /// Mark an infrastructure project completed
    ///
    /// Skips the approval gates. With `require_full_progress` the latest
    /// execution log must report 100%.
    pub async fn complete_project(&self, project_id: &str) -> Result<Project> {
        let mut tx = self.db().begin().await?;
        let project = project::lock_project(&mut tx, project_id).await?;

        let current = project.current_phase.ok_or(Error::NotInfrastructureProject)?;
        if current.is_terminal() {
            tx.commit().await?;
            debug!(project_id = %project_id, "Project already completed");
            return Ok(project);
        }

        if self.policy().require_full_progress {
            let progress = execution::latest_progress(&mut tx, project_id).await?;
            if progress < 100 {
                return Err(Error::IncompleteExecution(progress));
            }
        }

        sqlx::query("UPDATE projects SET current_phase = ?, status = ?, updated_at = ? WHERE id = ?")
            .bind(InfraPhase::Completed.as_str())
            .bind(ProjectStatus::Completed.as_str())
            .bind(Utc::now())
            .bind(project_id)
            .execute(&mut *tx)
            .await?;

        let project = project::fetch_project(&mut tx, project_id)
            .await?
            .ok_or_else(|| Error::ProjectNotFound(project_id.to_string()))?;
        tx.commit().await?;

        info!(project_id = %project_id, from = %current, "Completed project");
        self.record(&[WorkflowEvent::ProjectCompleted {
            project_id: project_id.to_string(),
            from: current,
        }])
        .await;

        Ok(project)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::project::{ProjectType, create_project, get_project};
    use crate::storage::Database;

    #[test]
    fn test_phase_order_and_next() {
        assert_eq!(InfraPhase::Proposal.next(), Some(InfraPhase::Rkb));
        assert_eq!(InfraPhase::Rkb.next(), Some(InfraPhase::Disbursement));
        assert_eq!(InfraPhase::Disbursement.next(), Some(InfraPhase::Execution));
        assert_eq!(InfraPhase::Execution.next(), Some(InfraPhase::Completed));
        assert_eq!(InfraPhase::Completed.next(), None);

        for (i, phase) in InfraPhase::ORDER.iter().enumerate() {
            assert_eq!(phase.index(), i);
            assert_eq!(InfraPhase::parse(phase.as_str()), Some(*phase));
        }
    }

    #[test]
    fn test_phase_ordering_follows_index() {
        assert!(InfraPhase::Proposal < InfraPhase::Rkb);
        assert!(InfraPhase::Execution < InfraPhase::Completed);
    }

    async fn infra_project(db: &Database) -> Project {
        create_project(db, Project::new("Datacenter power", ProjectType::Infrastructure))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_advance_requires_approved_proposal() {
        let db = Database::in_memory().await.unwrap();
        let project = infra_project(&db).await;
        let workflow = InfraWorkflow::new(&db);

        let err = workflow.advance_phase(&project.id).await.unwrap_err();
        assert!(matches!(err, Error::PhaseNotApproved(ref stage) if stage == "Proposal"));

        let reloaded = get_project(&db, &project.id).await.unwrap().unwrap();
        assert_eq!(reloaded.current_phase, Some(InfraPhase::Proposal));
    }

    #[tokio::test]
    async fn test_advance_unknown_project() {
        let db = Database::in_memory().await.unwrap();
        let err = InfraWorkflow::new(&db).advance_phase("nope").await.unwrap_err();
        assert!(matches!(err, Error::ProjectNotFound(_)));
    }

    #[tokio::test]
    async fn test_advance_from_execution_has_no_gate() {
        let db = Database::in_memory().await.unwrap();
        let project = infra_project(&db).await;
        sqlx::query("UPDATE projects SET current_phase = 'execution' WHERE id = ?")
            .bind(&project.id)
            .execute(db.pool())
            .await
            .unwrap();

        let phase = InfraWorkflow::new(&db).advance_phase(&project.id).await.unwrap();
        assert_eq!(phase, InfraPhase::Completed);

        let reloaded = get_project(&db, &project.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, ProjectStatus::Completed);
    }

    #[tokio::test]
    async fn test_complete_project_is_unconditional_by_default() {
        let db = Database::in_memory().await.unwrap();
        let project = infra_project(&db).await;

        let completed = InfraWorkflow::new(&db).complete_project(&project.id).await.unwrap();
        assert_eq!(completed.current_phase, Some(InfraPhase::Completed));
        assert_eq!(completed.status, ProjectStatus::Completed);

        // Completing twice is a no-op
        let again = InfraWorkflow::new(&db).complete_project(&project.id).await.unwrap();
        assert_eq!(again.current_phase, Some(InfraPhase::Completed));
    }

    #[tokio::test]
    async fn test_complete_project_rejects_web_dev() {
        let db = Database::in_memory().await.unwrap();
        let project = create_project(&db, Project::new("Landing page", ProjectType::WebDev))
            .await
            .unwrap();

        let err = InfraWorkflow::new(&db).complete_project(&project.id).await.unwrap_err();
        assert!(matches!(err, Error::NotInfrastructureProject));
    }
}
