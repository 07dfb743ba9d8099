//! Fund disbursement stage (gates DISBURSEMENT -> EXECUTION)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use super::engine::InfraWorkflow;
use super::stage::{Stage, StageDecision, StageFields, StageKind, SqliteQuery};
use crate::error::{Error, Result};

/// Disbursement fields; amounts are whole currency units
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisbursementFields {
    pub approved_budget: Option<i64>,
    pub disbursed_amount: Option<i64>,
    pub disbursement_date: Option<DateTime<Utc>>,
    pub payment_method: Option<String>,
    pub reference_number: Option<String>,
    pub notes: Option<String>,
}

impl StageFields for DisbursementFields {
    const KIND: StageKind = StageKind::Disbursement;
    const COLUMNS: &'static [&'static str] = &[
        "approved_budget",
        "disbursed_amount",
        "disbursement_date",
        "payment_method",
        "reference_number",
        "notes",
    ];

    fn bind_columns<'q>(&'q self, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query
            .bind(self.approved_budget)
            .bind(self.disbursed_amount)
            .bind(self.disbursement_date)
            .bind(&self.payment_method)
            .bind(&self.reference_number)
            .bind(&self.notes)
    }

    fn from_row(row: &SqliteRow) -> Self {
        Self {
            approved_budget: row.get("approved_budget"),
            disbursed_amount: row.get("disbursed_amount"),
            disbursement_date: row.get("disbursement_date"),
            payment_method: row.get("payment_method"),
            reference_number: row.get("reference_number"),
            notes: row.get("notes"),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.approved_budget.is_some_and(|v| v < 0) {
            return Err(Error::validation("approved_budget", "Amount cannot be negative"));
        }
        if self.disbursed_amount.is_some_and(|v| v < 0) {
            return Err(Error::validation("disbursed_amount", "Amount cannot be negative"));
        }
        Ok(())
    }
}

impl<'a> InfraWorkflow<'a> {
    /// Save disbursement fields as a draft
    pub async fn save_disbursement(
        &self,
        project_id: &str,
        fields: &DisbursementFields,
    ) -> Result<Stage<DisbursementFields>> {
        self.save_stage(project_id, fields).await
    }

    /// Submit the disbursement for approval
    pub async fn submit_disbursement(&self, project_id: &str) -> Result<Stage<DisbursementFields>> {
        self.submit_stage::<DisbursementFields>(project_id).await
    }

    /// Approve the disbursement and move on to EXECUTION
    pub async fn approve_disbursement(&self, project_id: &str) -> Result<StageDecision<DisbursementFields>> {
        self.approve_stage::<DisbursementFields>(project_id).await
    }

    /// Reject the disbursement with a reason
    pub async fn reject_disbursement(&self, project_id: &str, reason: &str) -> Result<Stage<DisbursementFields>> {
        self.reject_stage::<DisbursementFields>(project_id, reason).await
    }

    /// Current disbursement, if any
    pub async fn get_disbursement(&self, project_id: &str) -> Result<Option<Stage<DisbursementFields>>> {
        self.get_stage::<DisbursementFields>(project_id).await
    }
}
