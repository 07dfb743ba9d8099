//! RKB (budget plan) stage and its line items
//!
//! The submission's `total_budget` is derived: every item change recomputes
//! it from the item totals in the same transaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use tracing::{debug, info};
use uuid::Uuid;

use super::engine::InfraWorkflow;
use super::events::WorkflowEvent;
use super::stage::{self, Stage, StageDecision, StageFields, StageKind, SqliteQuery};
use crate::commands::project;
use crate::error::{Error, Result};

/// RKB submission fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RkbFields {
    pub submission_number: Option<String>,
    pub justification: Option<String>,
    /// Sum of item totals; ignored on save
    #[serde(default)]
    pub total_budget: i64,
}

impl StageFields for RkbFields {
    const KIND: StageKind = StageKind::Rkb;
    const COLUMNS: &'static [&'static str] = &["submission_number", "justification"];
    const DERIVED_COLUMNS: &'static [&'static str] = &["total_budget"];

    fn bind_columns<'q>(&'q self, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query.bind(&self.submission_number).bind(&self.justification)
    }

    fn from_row(row: &SqliteRow) -> Self {
        Self {
            submission_number: row.get("submission_number"),
            justification: row.get("justification"),
            total_budget: row.get("total_budget"),
        }
    }
}

/// A budget line item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RkbItem {
    pub id: String,
    pub project_id: String,
    pub item_name: String,
    pub specification: Option<String>,
    pub quantity: i64,
    pub unit: String,
    pub unit_price: i64,
    /// quantity x unit_price
    pub total_price: i64,
    pub vendor: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for a new line item
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRkbItem {
    pub item_name: String,
    pub specification: Option<String>,
    pub quantity: i64,
    pub unit: String,
    pub unit_price: i64,
    pub vendor: Option<String>,
    pub notes: Option<String>,
}

impl NewRkbItem {
    /// Item with the required fields; vendor and specification unset
    pub fn new(item_name: impl Into<String>, quantity: i64, unit: impl Into<String>, unit_price: i64) -> Self {
        Self {
            item_name: item_name.into(),
            quantity,
            unit: unit.into(),
            unit_price,
            ..Default::default()
        }
    }

    /// Set the supplier
    pub fn with_vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = Some(vendor.into());
        self
    }

    /// Set the technical specification
    pub fn with_specification(mut self, specification: impl Into<String>) -> Self {
        self.specification = Some(specification.into());
        self
    }

    /// Check name, unit, quantity and unit price
    pub fn validate(&self) -> Result<()> {
        if self.item_name.trim().is_empty() {
            return Err(Error::validation("item_name", "Item name cannot be empty"));
        }
        if self.unit.trim().is_empty() {
            return Err(Error::validation("unit", "Unit cannot be empty"));
        }
        if self.quantity < 1 {
            return Err(Error::validation("quantity", "Quantity must be at least 1"));
        }
        if self.unit_price < 0 {
            return Err(Error::validation("unit_price", "Unit price cannot be negative"));
        }
        Ok(())
    }

    /// quantity x unit_price, failing on overflow
    pub fn total_price(&self) -> Result<i64> {
        self.quantity
            .checked_mul(self.unit_price)
            .ok_or_else(|| Error::validation("unit_price", "Item total exceeds the supported range"))
    }
}

/// Result of an item mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RkbItemChange {
    pub item: RkbItem,
    /// Submission total after the change
    pub total_budget: i64,
}

const ITEM_COLUMNS: &str =
    "id, project_id, item_name, specification, quantity, unit, unit_price, total_price, vendor, notes, created_at";

fn row_to_item(row: SqliteRow) -> RkbItem {
    RkbItem {
        id: row.get("id"),
        project_id: row.get("project_id"),
        item_name: row.get("item_name"),
        specification: row.get("specification"),
        quantity: row.get("quantity"),
        unit: row.get("unit"),
        unit_price: row.get("unit_price"),
        total_price: row.get("total_price"),
        vendor: row.get("vendor"),
        notes: row.get("notes"),
        created_at: row.get("created_at"),
    }
}

/// A project's items in creation order
pub(crate) async fn fetch_items(conn: &mut SqliteConnection, project_id: &str) -> Result<Vec<RkbItem>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM rkb_items WHERE project_id = ? ORDER BY created_at ASC, rowid ASC",
        ITEM_COLUMNS
    ))
    .bind(project_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(row_to_item).collect())
}

async fn fetch_item(conn: &mut SqliteConnection, item_id: &str) -> Result<Option<RkbItem>> {
    let row = sqlx::query(&format!("SELECT {} FROM rkb_items WHERE id = ?", ITEM_COLUMNS))
        .bind(item_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.map(row_to_item))
}

fn budget_overflow() -> Error {
    Error::validation("unit_price", "Total budget exceeds the supported range")
}

/// Sum of a project's item totals, checked for overflow
async fn sum_item_totals(conn: &mut SqliteConnection, project_id: &str) -> Result<i64> {
    let totals: Vec<(i64,)> = sqlx::query_as("SELECT total_price FROM rkb_items WHERE project_id = ?")
        .bind(project_id)
        .fetch_all(&mut *conn)
        .await?;

    totals
        .into_iter()
        .try_fold(0i64, |acc, (price,)| acc.checked_add(price))
        .ok_or_else(budget_overflow)
}

/// Recompute `total_budget` from the items, creating a DRAFT submission if needed
async fn recalculate_total(conn: &mut SqliteConnection, project_id: &str) -> Result<i64> {
    let total = sum_item_totals(conn, project_id).await?;

    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO rkb_submissions (id, project_id, total_budget, approval_status, created_at, updated_at)
        VALUES (?, ?, ?, 'draft', ?, ?)
        ON CONFLICT(project_id) DO UPDATE SET
            total_budget = excluded.total_budget,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(project_id)
    .bind(total)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    debug!(project_id = %project_id, total_budget = total, "Recalculated RKB total");
    Ok(total)
}

impl<'a> InfraWorkflow<'a> {
    /// Save the RKB header fields as a draft
    pub async fn save_rkb(&self, project_id: &str, fields: &RkbFields) -> Result<Stage<RkbFields>> {
        self.save_stage(project_id, fields).await
    }

    /// Submit the RKB for approval
    pub async fn submit_rkb(&self, project_id: &str) -> Result<Stage<RkbFields>> {
        self.submit_stage::<RkbFields>(project_id).await
    }

    /// Approve the RKB and move on to DISBURSEMENT
    pub async fn approve_rkb(&self, project_id: &str) -> Result<StageDecision<RkbFields>> {
        self.approve_stage::<RkbFields>(project_id).await
    }

    /// Reject the RKB with a reason
    pub async fn reject_rkb(&self, project_id: &str, reason: &str) -> Result<Stage<RkbFields>> {
        self.reject_stage::<RkbFields>(project_id, reason).await
    }

    /// Current RKB submission, if any
    pub async fn get_rkb(&self, project_id: &str) -> Result<Option<Stage<RkbFields>>> {
        self.get_stage::<RkbFields>(project_id).await
    }

    /// Add a line item and recompute the submission total
    pub async fn add_rkb_item(&self, project_id: &str, item: &NewRkbItem) -> Result<RkbItemChange> {
        item.validate()?;
        let total_price = item.total_price()?;

        let mut tx = self.db().begin().await?;
        let project = project::lock_project(&mut tx, project_id).await?;
        self.check_phase(&project, StageKind::Rkb.phase(), StageKind::Rkb.label())?;
        if let Some(status) = stage::fetch_status(&mut tx, StageKind::Rkb, project_id).await? {
            self.check_editable(StageKind::Rkb, status)?;
        }
        sum_item_totals(&mut tx, project_id)
            .await?
            .checked_add(total_price)
            .ok_or_else(budget_overflow)?;

        let item_id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO rkb_items (id, project_id, item_name, specification, quantity, unit, unit_price, total_price, vendor, notes, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&item_id)
        .bind(project_id)
        .bind(item.item_name.trim())
        .bind(&item.specification)
        .bind(item.quantity)
        .bind(item.unit.trim())
        .bind(item.unit_price)
        .bind(total_price)
        .bind(&item.vendor)
        .bind(&item.notes)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        let total_budget = recalculate_total(&mut tx, project_id).await?;
        let created = fetch_item(&mut tx, &item_id)
            .await?
            .ok_or_else(|| Error::RkbItemNotFound(item_id.clone()))?;
        tx.commit().await?;

        info!(project_id = %project_id, item_id = %item_id, total_price, total_budget, "Added RKB item");
        self.record(&[WorkflowEvent::RkbItemAdded {
            project_id: project_id.to_string(),
            item_id,
            total_budget,
        }])
        .await;

        Ok(RkbItemChange {
            item: created,
            total_budget,
        })
    }

    /// Remove a line item and recompute its project's total
    pub async fn remove_rkb_item(&self, item_id: &str) -> Result<RkbItemChange> {
        let owner: Option<(String,)> = sqlx::query_as("SELECT project_id FROM rkb_items WHERE id = ?")
            .bind(item_id)
            .fetch_optional(self.db().pool())
            .await?;
        let (project_id,) = owner.ok_or_else(|| Error::RkbItemNotFound(item_id.to_string()))?;

        let mut tx = self.db().begin().await?;
        let project = project::lock_project(&mut tx, &project_id).await?;
        self.check_phase(&project, StageKind::Rkb.phase(), StageKind::Rkb.label())?;
        if let Some(status) = stage::fetch_status(&mut tx, StageKind::Rkb, &project_id).await? {
            self.check_editable(StageKind::Rkb, status)?;
        }

        // Re-read under the lock; a concurrent removal may have won
        let removed = fetch_item(&mut tx, item_id)
            .await?
            .ok_or_else(|| Error::RkbItemNotFound(item_id.to_string()))?;

        sqlx::query("DELETE FROM rkb_items WHERE id = ?")
            .bind(item_id)
            .execute(&mut *tx)
            .await?;

        let total_budget = recalculate_total(&mut tx, &project_id).await?;
        tx.commit().await?;

        info!(project_id = %project_id, item_id = %item_id, total_budget, "Removed RKB item");
        self.record(&[WorkflowEvent::RkbItemRemoved {
            project_id: project_id.clone(),
            item_id: item_id.to_string(),
            total_budget,
        }])
        .await;

        Ok(RkbItemChange {
            item: removed,
            total_budget,
        })
    }

    /// A project's items in creation order
    pub async fn rkb_items(&self, project_id: &str) -> Result<Vec<RkbItem>> {
        let mut conn = self.db().pool().acquire().await?;
        fetch_items(&mut conn, project_id).await
    }
}
