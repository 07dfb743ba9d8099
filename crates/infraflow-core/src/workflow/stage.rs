//! Approvable stages
//!
//! Proposal, RKB and disbursement share one lifecycle: save while editable,
//! submit for a decision, then approve or reject. [`StageFields`] describes
//! the stage-specific columns; everything else lives here once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Row, Sqlite, SqliteConnection};
use tracing::{debug, info};
use uuid::Uuid;

use super::approval::ApprovalStatus;
use super::engine::InfraWorkflow;
use super::events::{StageApproved, WorkflowEvent};
use super::phase::{self, InfraPhase, PhaseTransition};
use crate::commands::project;
use crate::error::{Error, Result};

/// Query type the stage field sets bind their columns into
pub type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// Which approvable stage a record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Proposal,
    Rkb,
    Disbursement,
}

impl StageKind {
    /// Human-readable name used in messages
    pub fn label(&self) -> &'static str {
        match self {
            StageKind::Proposal => "Proposal",
            StageKind::Rkb => "RKB",
            StageKind::Disbursement => "Disbursement",
        }
    }

    /// Backing table for the stage record
    pub fn table(&self) -> &'static str {
        match self {
            StageKind::Proposal => "proposals",
            StageKind::Rkb => "rkb_submissions",
            StageKind::Disbursement => "disbursements",
        }
    }

    /// Upper-case tag used in audit action names
    pub fn audit_key(&self) -> &'static str {
        match self {
            StageKind::Proposal => "PROPOSAL",
            StageKind::Rkb => "RKB",
            StageKind::Disbursement => "DISBURSEMENT",
        }
    }

    /// The phase this stage gates
    pub fn phase(&self) -> InfraPhase {
        match self {
            StageKind::Proposal => InfraPhase::Proposal,
            StageKind::Rkb => InfraPhase::Rkb,
            StageKind::Disbursement => InfraPhase::Disbursement,
        }
    }

    /// The stage that must be approved to leave `phase`
    pub fn gating(phase: InfraPhase) -> Option<StageKind> {
        match phase {
            InfraPhase::Proposal => Some(StageKind::Proposal),
            InfraPhase::Rkb => Some(StageKind::Rkb),
            InfraPhase::Disbursement => Some(StageKind::Disbursement),
            InfraPhase::Execution | InfraPhase::Completed => None,
        }
    }

    pub(crate) fn allows_revised(&self) -> bool {
        matches!(self, StageKind::Proposal)
    }
}

/// Stage-specific field set
///
/// Every field in [`StageFields::COLUMNS`] is optional on save: `None` keeps
/// the stored value.
pub trait StageFields: Default + Send + Sync + Unpin + Sized + 'static {
    const KIND: StageKind;

    /// Columns written on save, in binding order
    const COLUMNS: &'static [&'static str];

    /// Columns read back but never written by callers
    const DERIVED_COLUMNS: &'static [&'static str] = &[];

    /// Bind one value per entry of [`StageFields::COLUMNS`]
    fn bind_columns<'q>(&'q self, query: SqliteQuery<'q>) -> SqliteQuery<'q>;

    fn from_row(row: &SqliteRow) -> Self;

    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// A stage record together with its approval state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage<T> {
    pub id: String,
    pub project_id: String,
    #[serde(flatten)]
    pub fields: T,
    pub approval_status: ApprovalStatus,
    pub approved_by: Option<String>,
    pub approval_date: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<T: StageFields> Stage<T> {
    /// Which stage this record belongs to
    pub fn kind(&self) -> StageKind {
        T::KIND
    }

    /// Whether the record accepts edits under its current status
    pub fn is_editable(&self) -> bool {
        self.approval_status.is_editable(T::KIND)
    }
}

/// Outcome of an approval: the approved stage and where the project now sits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDecision<T> {
    pub stage: Stage<T>,
    pub phase: InfraPhase,
    pub transition: Option<PhaseTransition>,
}

fn select_sql<T: StageFields>() -> String {
    let columns: Vec<&str> = T::COLUMNS
        .iter()
        .chain(T::DERIVED_COLUMNS.iter())
        .copied()
        .collect();
    format!(
        "SELECT id, project_id, {}, approval_status, approved_by, approval_date, rejection_reason, created_at, updated_at FROM {} WHERE project_id = ?",
        columns.join(", "),
        T::KIND.table()
    )
}

fn upsert_sql<T: StageFields>() -> String {
    let table = T::KIND.table();
    let placeholders = vec!["?"; T::COLUMNS.len()].join(", ");
    let updates: Vec<String> = T::COLUMNS
        .iter()
        .map(|c| format!("{c} = COALESCE(excluded.{c}, {table}.{c})"))
        .collect();
    format!(
        "INSERT INTO {table} (id, project_id, {}, approval_status, created_at, updated_at) \
         VALUES (?, ?, {placeholders}, ?, ?, ?) \
         ON CONFLICT(project_id) DO UPDATE SET {}, \
         approval_status = excluded.approval_status, approved_by = NULL, approval_date = NULL, \
         updated_at = excluded.updated_at",
        T::COLUMNS.join(", "),
        updates.join(", "),
    )
}

fn row_to_stage<T: StageFields>(row: &SqliteRow) -> Stage<T> {
    Stage {
        id: row.get("id"),
        project_id: row.get("project_id"),
        fields: T::from_row(row),
        approval_status: ApprovalStatus::parse(row.get("approval_status")).unwrap_or_default(),
        approved_by: row.get("approved_by"),
        approval_date: row.get("approval_date"),
        rejection_reason: row.get("rejection_reason"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Read a project's stage record
pub(crate) async fn fetch_stage<T: StageFields>(
    conn: &mut SqliteConnection,
    project_id: &str,
) -> Result<Option<Stage<T>>> {
    let sql = select_sql::<T>();
    let row = sqlx::query(&sql)
        .bind(project_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.as_ref().map(row_to_stage::<T>))
}

async fn fetch_required<T: StageFields>(
    conn: &mut SqliteConnection,
    project_id: &str,
) -> Result<Stage<T>> {
    fetch_stage::<T>(conn, project_id)
        .await?
        .ok_or_else(|| Error::StageNotFound {
            stage: T::KIND.label().to_string(),
            project_id: project_id.to_string(),
        })
}

/// Read only the approval status of a stage
pub(crate) async fn fetch_status(
    conn: &mut SqliteConnection,
    kind: StageKind,
    project_id: &str,
) -> Result<Option<ApprovalStatus>> {
    let row: Option<(String,)> = sqlx::query_as(&format!(
        "SELECT approval_status FROM {} WHERE project_id = ?",
        kind.table()
    ))
    .bind(project_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.and_then(|(s,)| ApprovalStatus::parse(&s)))
}

async fn upsert_fields<T: StageFields>(
    conn: &mut SqliteConnection,
    project_id: &str,
    fields: &T,
    status: ApprovalStatus,
) -> Result<()> {
    let sql = upsert_sql::<T>();
    let now = Utc::now();
    let query = sqlx::query(&sql)
        .bind(Uuid::new_v4().to_string())
        .bind(project_id);

    fields
        .bind_columns(query)
        .bind(status.as_str())
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

async fn set_pending(conn: &mut SqliteConnection, kind: StageKind, project_id: &str) -> Result<()> {
    sqlx::query(&format!(
        "UPDATE {} SET approval_status = 'pending', rejection_reason = NULL, updated_at = ? WHERE project_id = ?",
        kind.table()
    ))
    .bind(Utc::now())
    .bind(project_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn mark_approved(
    conn: &mut SqliteConnection,
    kind: StageKind,
    project_id: &str,
    approved_by: &str,
) -> Result<()> {
    let now = Utc::now();
    let updated = sqlx::query(&format!(
        "UPDATE {} SET approval_status = 'approved', approved_by = ?, approval_date = ?, \
         rejection_reason = NULL, updated_at = ? WHERE project_id = ? AND approval_status = 'pending'",
        kind.table()
    ))
    .bind(approved_by)
    .bind(now)
    .bind(now)
    .bind(project_id)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if updated == 0 {
        return Err(Error::ConcurrentModification(project_id.to_string()));
    }
    Ok(())
}

async fn mark_rejected(
    conn: &mut SqliteConnection,
    kind: StageKind,
    project_id: &str,
    reason: &str,
) -> Result<()> {
    let updated = sqlx::query(&format!(
        "UPDATE {} SET approval_status = 'rejected', rejection_reason = ?, updated_at = ? \
         WHERE project_id = ? AND approval_status = 'pending'",
        kind.table()
    ))
    .bind(reason)
    .bind(Utc::now())
    .bind(project_id)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if updated == 0 {
        return Err(Error::ConcurrentModification(project_id.to_string()));
    }
    Ok(())
}

impl<'a> InfraWorkflow<'a> {
    /// Read a project's stage record
    pub async fn get_stage<T: StageFields>(&self, project_id: &str) -> Result<Option<Stage<T>>> {
        let mut conn = self.db().pool().acquire().await?;
        fetch_stage::<T>(&mut conn, project_id).await
    }

    /// Create or update a stage, returning it to DRAFT
    pub async fn save_stage<T: StageFields>(&self, project_id: &str, fields: &T) -> Result<Stage<T>> {
        fields.validate()?;

        let mut tx = self.db().begin().await?;
        let project = project::lock_project(&mut tx, project_id).await?;
        self.check_phase(&project, T::KIND.phase(), T::KIND.label())?;

        if let Some(status) = fetch_status(&mut tx, T::KIND, project_id).await? {
            self.check_editable(T::KIND, status)?;
        }

        upsert_fields(&mut tx, project_id, fields, ApprovalStatus::Draft).await?;
        let stage = fetch_required::<T>(&mut tx, project_id).await?;
        tx.commit().await?;

        info!(project_id = %project_id, stage = T::KIND.label(), "Saved stage draft");
        self.record(&[WorkflowEvent::StageSaved {
            project_id: project_id.to_string(),
            stage: T::KIND,
        }])
        .await;

        Ok(stage)
    }

    /// Submit a stage for approval
    ///
    /// Creates an empty PENDING record when none exists. Resubmitting a
    /// PENDING stage is a no-op; an APPROVED stage cannot be resubmitted.
    pub async fn submit_stage<T: StageFields>(&self, project_id: &str) -> Result<Stage<T>> {
        let mut tx = self.db().begin().await?;
        let project = project::lock_project(&mut tx, project_id).await?;
        self.check_phase(&project, T::KIND.phase(), T::KIND.label())?;

        match fetch_status(&mut tx, T::KIND, project_id).await? {
            None => upsert_fields(&mut tx, project_id, &T::default(), ApprovalStatus::Pending).await?,
            Some(ApprovalStatus::Pending) => {
                let stage = fetch_required::<T>(&mut tx, project_id).await?;
                tx.commit().await?;
                debug!(project_id = %project_id, stage = T::KIND.label(), "Stage already pending");
                return Ok(stage);
            }
            Some(status) if !status.can_submit() => {
                return Err(Error::InvalidTransition {
                    stage: T::KIND.label().to_string(),
                    from: status.to_string(),
                    action: "submit".to_string(),
                });
            }
            Some(_) => set_pending(&mut tx, T::KIND, project_id).await?,
        }

        let stage = fetch_required::<T>(&mut tx, project_id).await?;
        tx.commit().await?;

        info!(project_id = %project_id, stage = T::KIND.label(), "Submitted stage for approval");
        self.record(&[WorkflowEvent::StageSubmitted {
            project_id: project_id.to_string(),
            stage: T::KIND,
        }])
        .await;

        Ok(stage)
    }

    /// Approve a pending stage and advance the project past its phase
    ///
    /// The approval and the phase advance commit together; if the phase
    /// controller refuses, the stage stays PENDING.
    pub async fn approve_stage<T: StageFields>(&self, project_id: &str) -> Result<StageDecision<T>> {
        let actor = self.require_decider("approve")?;

        let mut tx = self.db().begin().await?;
        let project = project::lock_project(&mut tx, project_id).await?;
        self.check_phase(&project, T::KIND.phase(), T::KIND.label())?;

        let current = fetch_required::<T>(&mut tx, project_id).await?;
        if !current.approval_status.awaits_decision() {
            return Err(Error::InvalidTransition {
                stage: T::KIND.label().to_string(),
                from: current.approval_status.to_string(),
                action: "approve".to_string(),
            });
        }

        let approved_by = actor.display_name().to_string();
        mark_approved(&mut tx, T::KIND, project_id, &approved_by).await?;

        let approved = StageApproved {
            project_id: project_id.to_string(),
            stage: T::KIND,
            approved_by,
        };
        let transition = phase::on_stage_approved(&mut tx, &approved).await?;

        let stage = fetch_required::<T>(&mut tx, project_id).await?;
        let phase = project::fetch_project(&mut tx, project_id)
            .await?
            .and_then(|p| p.current_phase)
            .ok_or(Error::NotInfrastructureProject)?;
        tx.commit().await?;

        info!(
            project_id = %project_id,
            stage = T::KIND.label(),
            approved_by = %approved.approved_by,
            phase = %phase,
            "Approved stage"
        );

        let mut events = vec![WorkflowEvent::StageApproved(approved)];
        if let Some(t) = transition {
            events.push(WorkflowEvent::PhaseAdvanced {
                project_id: project_id.to_string(),
                from: t.from,
                to: t.to,
            });
        }
        self.record(&events).await;

        Ok(StageDecision {
            stage,
            phase,
            transition,
        })
    }

    /// Reject a pending stage; the project stays in its phase
    pub async fn reject_stage<T: StageFields>(&self, project_id: &str, reason: &str) -> Result<Stage<T>> {
        self.require_decider("reject")?;

        let reason = reason.trim();
        if reason.is_empty() {
            return Err(Error::validation("reason", "Rejection reason cannot be empty"));
        }

        let mut tx = self.db().begin().await?;
        let project = project::lock_project(&mut tx, project_id).await?;
        self.check_phase(&project, T::KIND.phase(), T::KIND.label())?;

        let current = fetch_required::<T>(&mut tx, project_id).await?;
        if !current.approval_status.awaits_decision() {
            return Err(Error::InvalidTransition {
                stage: T::KIND.label().to_string(),
                from: current.approval_status.to_string(),
                action: "reject".to_string(),
            });
        }

        mark_rejected(&mut tx, T::KIND, project_id, reason).await?;
        let stage = fetch_required::<T>(&mut tx, project_id).await?;
        tx.commit().await?;

        info!(project_id = %project_id, stage = T::KIND.label(), "Rejected stage");
        self.record(&[WorkflowEvent::StageRejected {
            project_id: project_id.to_string(),
            stage: T::KIND,
            reason: reason.to_string(),
        }])
        .await;

        Ok(stage)
    }
}
