//! Project management commands
//!
//! Provides create/read operations for projects and the eager
//! "full project data" view over every workflow sub-record.

use crate::Result;
use crate::storage::Database;
use crate::workflow::disbursement::DisbursementFields;
use crate::workflow::execution::{self, ExecutionLog};
use crate::workflow::phase::InfraPhase;
use crate::workflow::proposal::ProposalFields;
use crate::workflow::rkb::{self, RkbFields, RkbItem};
use crate::workflow::stage::{self, Stage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

/// Project type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectType {
    Infrastructure,
    WebDev,
}

impl ProjectType {
    /// Convert to string for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectType::Infrastructure => "infrastructure",
            ProjectType::WebDev => "web_dev",
        }
    }

    /// Parse from database string
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "infrastructure" => Some(ProjectType::Infrastructure),
            "web_dev" => Some(ProjectType::WebDev),
            _ => None,
        }
    }
}

/// Project status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    #[default]
    Planning,
    InProgress,
    OnHold,
    Completed,
}

impl ProjectStatus {
    /// Convert to string for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Planning => "planning",
            ProjectStatus::InProgress => "in_progress",
            ProjectStatus::OnHold => "on_hold",
            ProjectStatus::Completed => "completed",
        }
    }

    /// Parse from database string
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "planning" => Some(ProjectStatus::Planning),
            "in_progress" => Some(ProjectStatus::InProgress),
            "on_hold" => Some(ProjectStatus::OnHold),
            "completed" => Some(ProjectStatus::Completed),
            _ => None,
        }
    }
}

/// A project tracked by the IT department
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Unique project identifier
    pub id: String,
    /// Project name
    pub name: String,
    /// Optional project description
    pub description: Option<String>,
    /// Infrastructure or web development
    pub project_type: ProjectType,
    /// Project status
    pub status: ProjectStatus,
    /// Workflow phase; only infrastructure projects have one
    pub current_phase: Option<InfraPhase>,
    /// Responsible manager (user id from the directory service)
    pub manager_id: Option<String>,
    /// When the project was created
    pub created_at: DateTime<Utc>,
    /// When the project was last updated
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Create a new project; infrastructure projects start at the proposal phase
    pub fn new(name: impl Into<String>, project_type: ProjectType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: None,
            project_type,
            status: ProjectStatus::Planning,
            current_phase: match project_type {
                ProjectType::Infrastructure => Some(InfraPhase::Proposal),
                ProjectType::WebDev => None,
            },
            manager_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the project description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the responsible manager
    pub fn with_manager(mut self, manager_id: impl Into<String>) -> Self {
        self.manager_id = Some(manager_id.into());
        self
    }

    pub fn is_infrastructure(&self) -> bool {
        self.project_type == ProjectType::Infrastructure
    }
}

const PROJECT_COLUMNS: &str =
    "id, name, description, project_type, status, current_phase, manager_id, created_at, updated_at";

/// Convert a database row to a Project
fn row_to_project(row: sqlx::sqlite::SqliteRow) -> Project {
    let project_type: String = row.get("project_type");
    let current_phase: Option<String> = row.get("current_phase");
    Project {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        project_type: ProjectType::parse(&project_type).unwrap_or(ProjectType::WebDev),
        status: ProjectStatus::parse(row.get("status")).unwrap_or_default(),
        current_phase: current_phase.as_deref().and_then(InfraPhase::parse),
        manager_id: row.get("manager_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Project repository for database operations
pub struct ProjectRepository<'a> {
    db: &'a Database,
}

impl<'a> ProjectRepository<'a> {
    /// Create a new project repository
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Create a new project in the database
    pub async fn create(&self, project: &Project) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO projects (id, name, description, project_type, status, current_phase, manager_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&project.id)
        .bind(&project.name)
        .bind(&project.description)
        .bind(project.project_type.as_str())
        .bind(project.status.as_str())
        .bind(project.current_phase.map(|p| p.as_str()))
        .bind(&project.manager_id)
        .bind(project.created_at)
        .bind(project.updated_at)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    /// Get a project by ID
    pub async fn get(&self, id: &str) -> Result<Option<Project>> {
        let row = sqlx::query(&format!("SELECT {} FROM projects WHERE id = ?", PROJECT_COLUMNS))
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row.map(row_to_project))
    }

    /// List projects, most recently updated first, with optional type filter
    pub async fn list(&self, project_type: Option<ProjectType>) -> Result<Vec<Project>> {
        let rows = if let Some(project_type) = project_type {
            sqlx::query(&format!(
                "SELECT {} FROM projects WHERE project_type = ? ORDER BY updated_at DESC, name",
                PROJECT_COLUMNS
            ))
            .bind(project_type.as_str())
            .fetch_all(self.db.pool())
            .await?
        } else {
            sqlx::query(&format!(
                "SELECT {} FROM projects ORDER BY updated_at DESC, name",
                PROJECT_COLUMNS
            ))
            .fetch_all(self.db.pool())
            .await?
        };

        Ok(rows.into_iter().map(row_to_project).collect())
    }

    /// Check if a project exists
    pub async fn exists(&self, id: &str) -> Result<bool> {
        let row: Option<(i32,)> = sqlx::query_as("SELECT 1 FROM projects WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row.is_some())
    }
}

/// Read a project inside an open transaction
pub(crate) async fn fetch_project(conn: &mut SqliteConnection, id: &str) -> Result<Option<Project>> {
    let row = sqlx::query(&format!("SELECT {} FROM projects WHERE id = ?", PROJECT_COLUMNS))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.map(row_to_project))
}

/// Take the write lock for a project and read it
///
/// Touching the row first makes SQLite acquire its write lock before any
/// read, so the rest of the transaction sees no concurrent writer.
pub(crate) async fn lock_project(conn: &mut SqliteConnection, id: &str) -> Result<Project> {
    let touched = sqlx::query("UPDATE projects SET updated_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    if touched == 0 {
        return Err(crate::Error::ProjectNotFound(id.to_string()));
    }

    fetch_project(conn, id)
        .await?
        .ok_or_else(|| crate::Error::ProjectNotFound(id.to_string()))
}

/// A project together with every workflow sub-record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectDetail {
    #[serde(flatten)]
    pub project: Project,
    pub proposal: Option<Stage<ProposalFields>>,
    pub rkb_submission: Option<Stage<RkbFields>>,
    /// Line items in creation order
    pub rkb_items: Vec<RkbItem>,
    pub disbursement: Option<Stage<DisbursementFields>>,
    /// Execution logs, newest first
    pub execution_logs: Vec<ExecutionLog>,
}

impl ProjectDetail {
    /// Progress reported by the most recent execution log
    pub fn current_progress(&self) -> i64 {
        self.execution_logs
            .first()
            .map(|log| log.progress_percentage)
            .unwrap_or(0)
    }
}

// ============================================================================
// Public API functions
// ============================================================================

/// Create a new project and save to database
pub async fn create_project(db: &Database, project: Project) -> Result<Project> {
    if project.name.trim().is_empty() {
        return Err(crate::Error::validation("name", "Project name cannot be empty"));
    }

    ProjectRepository::new(db).create(&project).await?;

    tracing::info!(
        project_id = %project.id,
        project_type = project.project_type.as_str(),
        "Created project"
    );
    Ok(project)
}

/// Get project by ID from database
pub async fn get_project(db: &Database, id: &str) -> Result<Option<Project>> {
    ProjectRepository::new(db).get(id).await
}

/// List projects from database
pub async fn list_projects(db: &Database, project_type: Option<ProjectType>) -> Result<Vec<Project>> {
    ProjectRepository::new(db).list(project_type).await
}

/// Load a project with proposal, RKB, items, disbursement, and execution logs
pub async fn get_full_project_data(db: &Database, id: &str) -> Result<ProjectDetail> {
    let mut conn = db.pool().acquire().await?;

    let project = fetch_project(&mut conn, id)
        .await?
        .ok_or_else(|| crate::Error::ProjectNotFound(id.to_string()))?;

    let proposal = stage::fetch_stage::<ProposalFields>(&mut conn, id).await?;
    let rkb_submission = stage::fetch_stage::<RkbFields>(&mut conn, id).await?;
    let rkb_items = rkb::fetch_items(&mut conn, id).await?;
    let disbursement = stage::fetch_stage::<DisbursementFields>(&mut conn, id).await?;
    let execution_logs = execution::fetch_logs(&mut conn, id).await?;

    tracing::debug!(project_id = %id, items = rkb_items.len(), logs = execution_logs.len(), "Loaded full project data");

    Ok(ProjectDetail {
        project,
        proposal,
        rkb_submission,
        rkb_items,
        disbursement,
        execution_logs,
    })
}
