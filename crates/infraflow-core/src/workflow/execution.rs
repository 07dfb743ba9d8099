//! Execution progress logs
//!
//! Logs are append-only. Current progress is the progress of the newest log
//! by execution date, later inserts winning ties.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use tracing::info;
use uuid::Uuid;

use super::engine::InfraWorkflow;
use super::events::WorkflowEvent;
use super::phase::InfraPhase;
use super::policy::ProgressPolicy;
use crate::commands::project;
use crate::error::{Error, Result};

/// Minimum length of an activity description
pub const MIN_DESCRIPTION_LEN: usize = 3;

/// One progress report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionLog {
    pub id: String,
    pub project_id: String,
    pub activity_description: String,
    pub execution_date: DateTime<Utc>,
    pub progress_percentage: i64,
    pub findings: Option<String>,
    pub completed_by: Option<String>,
    pub photo_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for a new progress report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewExecutionLog {
    pub activity_description: String,
    /// Defaults to now
    pub execution_date: Option<DateTime<Utc>>,
    pub progress_percentage: i64,
    pub findings: Option<String>,
    pub completed_by: Option<String>,
    pub photo_url: Option<String>,
}

impl NewExecutionLog {
    pub fn new(activity_description: impl Into<String>, progress_percentage: i64) -> Self {
        Self {
            activity_description: activity_description.into(),
            progress_percentage,
            ..Default::default()
        }
    }

    pub fn on(mut self, execution_date: DateTime<Utc>) -> Self {
        self.execution_date = Some(execution_date);
        self
    }

    pub fn with_findings(mut self, findings: impl Into<String>) -> Self {
        self.findings = Some(findings.into());
        self
    }

    pub fn completed_by(mut self, who: impl Into<String>) -> Self {
        self.completed_by = Some(who.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.activity_description.trim().chars().count() < MIN_DESCRIPTION_LEN {
            return Err(Error::validation(
                "activity_description",
                format!("Description must be at least {} characters", MIN_DESCRIPTION_LEN),
            ));
        }
        if !(0..=100).contains(&self.progress_percentage) {
            return Err(Error::validation(
                "progress_percentage",
                "Progress must be between 0 and 100",
            ));
        }
        Ok(())
    }
}

const LOG_COLUMNS: &str = "id, project_id, activity_description, execution_date, progress_percentage, findings, completed_by, photo_url, created_at";

fn row_to_log(row: SqliteRow) -> ExecutionLog {
    ExecutionLog {
        id: row.get("id"),
        project_id: row.get("project_id"),
        activity_description: row.get("activity_description"),
        execution_date: row.get("execution_date"),
        progress_percentage: row.get("progress_percentage"),
        findings: row.get("findings"),
        completed_by: row.get("completed_by"),
        photo_url: row.get("photo_url"),
        created_at: row.get("created_at"),
    }
}

/// A project's logs, newest first
pub(crate) async fn fetch_logs(conn: &mut SqliteConnection, project_id: &str) -> Result<Vec<ExecutionLog>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM execution_logs WHERE project_id = ? ORDER BY execution_date DESC, rowid DESC",
        LOG_COLUMNS
    ))
    .bind(project_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(row_to_log).collect())
}

/// Progress of the newest log, 0 without logs
pub(crate) async fn latest_progress(conn: &mut SqliteConnection, project_id: &str) -> Result<i64> {
    let row: Option<(i64,)> = sqlx::query_as(
        "SELECT progress_percentage FROM execution_logs WHERE project_id = ? \
         ORDER BY execution_date DESC, rowid DESC LIMIT 1",
    )
    .bind(project_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(|(p,)| p).unwrap_or(0))
}

impl<'a> InfraWorkflow<'a> {
    /// Append a progress report during the execution phase
    pub async fn add_execution_log(&self, project_id: &str, entry: &NewExecutionLog) -> Result<ExecutionLog> {
        entry.validate()?;

        let mut tx = self.db().begin().await?;
        let project = project::lock_project(&mut tx, project_id).await?;
        self.check_phase(&project, InfraPhase::Execution, "Execution log")?;

        if self.policy().progress_policy == ProgressPolicy::StrictMonotonic {
            let current = latest_progress(&mut tx, project_id).await?;
            if entry.progress_percentage < current {
                return Err(Error::ProgressRegression {
                    current,
                    reported: entry.progress_percentage,
                });
            }
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let row = sqlx::query(&format!(
            "INSERT INTO execution_logs ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING {}",
            LOG_COLUMNS, LOG_COLUMNS
        ))
        .bind(&id)
        .bind(project_id)
        .bind(entry.activity_description.trim())
        .bind(entry.execution_date.unwrap_or(now))
        .bind(entry.progress_percentage)
        .bind(&entry.findings)
        .bind(&entry.completed_by)
        .bind(&entry.photo_url)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        let log = row_to_log(row);
        info!(project_id = %project_id, log_id = %log.id, progress = log.progress_percentage, "Logged execution progress");
        self.record(&[WorkflowEvent::ExecutionLogged {
            project_id: project_id.to_string(),
            log_id: log.id.clone(),
            progress: log.progress_percentage,
        }])
        .await;

        Ok(log)
    }

    /// A project's logs, newest first
    pub async fn execution_logs(&self, project_id: &str) -> Result<Vec<ExecutionLog>> {
        let mut conn = self.db().pool().acquire().await?;
        fetch_logs(&mut conn, project_id).await
    }

    pub async fn current_progress(&self, project_id: &str) -> Result<i64> {
        let mut conn = self.db().pool().acquire().await?;
        latest_progress(&mut conn, project_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::project::{Project, ProjectType, create_project};
    use crate::storage::Database;
    use crate::workflow::policy::WorkflowPolicy;
    use chrono::Duration;

    async fn project_in_execution(db: &Database) -> Project {
        let project = create_project(db, Project::new("Server room", ProjectType::Infrastructure))
            .await
            .unwrap();
        sqlx::query("UPDATE projects SET current_phase = 'execution' WHERE id = ?")
            .bind(&project.id)
            .execute(db.pool())
            .await
            .unwrap();
        project
    }

    #[test]
    fn test_log_validation() {
        assert!(NewExecutionLog::new("Cabling", 40).validate().is_ok());
        assert!(NewExecutionLog::new(" ab ", 40).validate().is_err());
        assert!(NewExecutionLog::new("Cabling", 101).validate().is_err());
        assert!(NewExecutionLog::new("Cabling", -1).validate().is_err());
        assert!(NewExecutionLog::new("abc", 0).validate().is_ok());
    }

    #[tokio::test]
    async fn test_progress_follows_execution_date() {
        let db = Database::in_memory().await.unwrap();
        let project = project_in_execution(&db).await;
        let workflow = InfraWorkflow::new(&db);
        let today = Utc::now();

        workflow
            .add_execution_log(&project.id, &NewExecutionLog::new("Racks mounted", 60).on(today))
            .await
            .unwrap();
        // Backdated report does not become current
        workflow
            .add_execution_log(
                &project.id,
                &NewExecutionLog::new("Site survey", 10).on(today - Duration::days(3)),
            )
            .await
            .unwrap();

        assert_eq!(workflow.current_progress(&project.id).await.unwrap(), 60);
        let logs = workflow.execution_logs(&project.id).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].activity_description, "Racks mounted");
    }

    #[tokio::test]
    async fn test_same_date_later_insert_wins() {
        let db = Database::in_memory().await.unwrap();
        let project = project_in_execution(&db).await;
        let workflow = InfraWorkflow::new(&db);
        let date = Utc::now();

        workflow
            .add_execution_log(&project.id, &NewExecutionLog::new("Morning shift", 30).on(date))
            .await
            .unwrap();
        workflow
            .add_execution_log(&project.id, &NewExecutionLog::new("Evening shift", 20).on(date))
            .await
            .unwrap();

        assert_eq!(workflow.current_progress(&project.id).await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_strict_progress_rejects_regression() {
        let db = Database::in_memory().await.unwrap();
        let project = project_in_execution(&db).await;
        let workflow = InfraWorkflow::new(&db).with_policy(
            WorkflowPolicy::default().with_progress_policy(ProgressPolicy::StrictMonotonic),
        );

        workflow
            .add_execution_log(&project.id, &NewExecutionLog::new("Cabling", 50))
            .await
            .unwrap();
        let err = workflow
            .add_execution_log(&project.id, &NewExecutionLog::new("Rework", 40))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProgressRegression { current: 50, reported: 40 }));

        // Free-form accepts the same report
        InfraWorkflow::new(&db)
            .add_execution_log(&project.id, &NewExecutionLog::new("Rework", 40))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_logging_requires_execution_phase() {
        let db = Database::in_memory().await.unwrap();
        let project = create_project(&db, Project::new("Server room", ProjectType::Infrastructure))
            .await
            .unwrap();

        let err = InfraWorkflow::new(&db)
            .add_execution_log(&project.id, &NewExecutionLog::new("Too early", 5))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::WrongPhase { .. }));
        assert_eq!(InfraWorkflow::new(&db).current_progress(&project.id).await.unwrap(), 0);
    }
}
