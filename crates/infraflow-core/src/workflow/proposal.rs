//! Project proposal stage (gates PROPOSAL -> RKB)

use serde::{Deserialize, Serialize};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use super::engine::InfraWorkflow;
use super::stage::{Stage, StageDecision, StageFields, StageKind, SqliteQuery};
use crate::error::Result;

/// Proposal document fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalFields {
    pub background: Option<String>,
    pub objectives: Option<String>,
    pub scope: Option<String>,
    pub benefits: Option<String>,
    pub risk_analysis: Option<String>,
    pub attachment_url: Option<String>,
}

impl StageFields for ProposalFields {
    const KIND: StageKind = StageKind::Proposal;
    const COLUMNS: &'static [&'static str] = &[
        "background",
        "objectives",
        "scope",
        "benefits",
        "risk_analysis",
        "attachment_url",
    ];

    fn bind_columns<'q>(&'q self, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query
            .bind(&self.background)
            .bind(&self.objectives)
            .bind(&self.scope)
            .bind(&self.benefits)
            .bind(&self.risk_analysis)
            .bind(&self.attachment_url)
    }

    fn from_row(row: &SqliteRow) -> Self {
        Self {
            background: row.get("background"),
            objectives: row.get("objectives"),
            scope: row.get("scope"),
            benefits: row.get("benefits"),
            risk_analysis: row.get("risk_analysis"),
            attachment_url: row.get("attachment_url"),
        }
    }
}

impl<'a> InfraWorkflow<'a> {
    /// Save proposal fields as a draft
    pub async fn save_proposal(&self, project_id: &str, fields: &ProposalFields) -> Result<Stage<ProposalFields>> {
        self.save_stage(project_id, fields).await
    }

    /// Submit the proposal for approval
    pub async fn submit_proposal(&self, project_id: &str) -> Result<Stage<ProposalFields>> {
        self.submit_stage::<ProposalFields>(project_id).await
    }

    /// Approve the proposal and move on to RKB
    pub async fn approve_proposal(&self, project_id: &str) -> Result<StageDecision<ProposalFields>> {
        self.approve_stage::<ProposalFields>(project_id).await
    }

    /// Reject the proposal with a reason
    pub async fn reject_proposal(&self, project_id: &str, reason: &str) -> Result<Stage<ProposalFields>> {
        self.reject_stage::<ProposalFields>(project_id, reason).await
    }

    /// Current proposal, if any
    pub async fn get_proposal(&self, project_id: &str) -> Result<Option<Stage<ProposalFields>>> {
        self.get_stage::<ProposalFields>(project_id).await
    }
}
