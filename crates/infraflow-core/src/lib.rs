//! Infraflow Core Library
//!
//! This crate provides the core functionality for Infraflow, including:
//! - Projects (infrastructure and web development)
//! - The infrastructure workflow: phase controller, approvable stages,
//!   budget items and execution logs
//! - Audit trail
//! - Storage (SQLite with versioned migrations)
//! - Configuration

pub mod actor;
pub mod audit;
pub mod commands;
pub mod config;
pub mod error;
pub mod storage;
pub mod workflow;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::actor::{Actor, Role};
    pub use crate::commands::project::{Project, ProjectDetail, ProjectStatus, ProjectType};
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::storage::Database;
    pub use crate::workflow::{ApprovalStatus, InfraPhase, InfraWorkflow, WorkflowPolicy};
}
