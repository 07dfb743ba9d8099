//! Error types for Infraflow

use thiserror::Error;

/// Result type alias using Infraflow's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Infraflow error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Entity errors (E001-E099)
    #[error("Project '{0}' not found. Run `infraflow projects list` to see all projects.")]
    ProjectNotFound(String),

    #[error("{stage} for project '{project_id}' not found.")]
    StageNotFound { stage: String, project_id: String },

    #[error("RKB item '{0}' not found.")]
    RkbItemNotFound(String),

    // Workflow errors (E100-E199)
    #[error("Project is not an infrastructure project.")]
    NotInfrastructureProject,

    #[error("Project is already completed and cannot advance to another phase.")]
    AlreadyCompleted,

    #[error("{0} must be approved before the project can advance.")]
    PhaseNotApproved(String),

    #[error("{stage} cannot be changed while the project is in the {current} phase.")]
    WrongPhase { stage: String, current: String },

    #[error("{stage} is {status} and locked for editing.")]
    StageLocked { stage: String, status: String },

    #[error("Cannot {action} {stage} in '{from}' state.")]
    InvalidTransition {
        stage: String,
        from: String,
        action: String,
    },

    #[error("Progress {reported}% is lower than the current {current}%.")]
    ProgressRegression { current: i64, reported: i64 },

    #[error("Execution is at {0}% and must reach 100% before completion.")]
    IncompleteExecution(i64),

    #[error("Project '{0}' was modified concurrently. Reload and try again.")]
    ConcurrentModification(String),

    // Authorization errors (E200-E299)
    #[error("Not authorized to {action}. Only ADMIN or STAFF users may do this.")]
    Unauthorized { action: String },

    // Input errors (E300-E399)
    #[error("Validation error for '{field}': {message}")]
    Validation { field: String, message: String },

    // Database errors (E400-E499)
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::ProjectNotFound(_) => "E001",
            Self::StageNotFound { .. } => "E002",
            Self::RkbItemNotFound(_) => "E003",
            Self::NotInfrastructureProject => "E100",
            Self::AlreadyCompleted => "E101",
            Self::PhaseNotApproved(_) => "E102",
            Self::WrongPhase { .. } => "E103",
            Self::StageLocked { .. } => "E104",
            Self::InvalidTransition { .. } => "E105",
            Self::ProgressRegression { .. } => "E106",
            Self::IncompleteExecution(_) => "E107",
            Self::ConcurrentModification(_) => "E108",
            Self::Unauthorized { .. } => "E200",
            Self::Validation { .. } => "E300",
            Self::DatabaseError(_) => "E400",
            Self::ConfigError(_) => "E600",
            Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::ProjectNotFound(_) => Some("infraflow projects list".to_string()),
            Self::PhaseNotApproved(stage) => Some(format!(
                "Submit and approve the {} before advancing",
                stage
            )),
            Self::StageLocked { .. } => {
                Some("Wait for a decision, or ask an approver to reject it".to_string())
            }
            Self::WrongPhase { .. } => Some("infraflow projects show <id>".to_string()),
            Self::ConcurrentModification(id) => Some(format!("infraflow projects show {}", id)),
            Self::Unauthorized { .. } => Some("Pass --actor-role admin or staff".to_string()),
            _ => None,
        }
    }

    /// Whether this error is a workflow-state rejection rather than a failure
    pub fn is_workflow_error(&self) -> bool {
        matches!(self.code().as_bytes(), [b'E', b'1', _, _])
    }
}
