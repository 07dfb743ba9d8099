//! Audit trail
//!
//! Workflow actions are recorded after their transaction commits. Recording
//! is best effort: a failing sink never fails the action that was audited.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use tracing::warn;
use uuid::Uuid;

use crate::error::Result;
use crate::storage::Database;

/// One audit log record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    /// Action name, e.g. `APPROVE_RKB`
    pub action: String,
    pub entity: String,
    pub entity_id: String,
    /// JSON payload
    pub details: Option<String>,
    pub user_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        action: impl Into<String>,
        entity: impl Into<String>,
        entity_id: impl Into<String>,
        details: Option<String>,
        user_id: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            action: action.into(),
            entity: entity.into(),
            entity_id: entity_id.into(),
            details,
            user_id,
            timestamp: Utc::now(),
        }
    }
}

/// Destination for audit entries
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: &AuditEntry) -> Result<()>;
}

/// Sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAuditSink;

#[async_trait]
impl AuditSink for NoopAuditSink {
    async fn record(&self, _entry: &AuditEntry) -> Result<()> {
        Ok(())
    }
}

/// Sink writing to the `audit_logs` table
#[derive(Debug, Clone)]
pub struct SqliteAuditSink {
    db: Database,
}

impl SqliteAuditSink {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Most recent entries, optionally for a single project
    pub async fn recent(&self, entity_id: Option<&str>, limit: u32) -> Result<Vec<AuditEntry>> {
        let rows = match entity_id {
            Some(id) => {
                sqlx::query(
                    "SELECT id, action, entity, entity_id, details, user_id, timestamp FROM audit_logs \
                     WHERE entity_id = ? ORDER BY timestamp DESC, rowid DESC LIMIT ?",
                )
                .bind(id)
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, action, entity, entity_id, details, user_id, timestamp FROM audit_logs \
                     ORDER BY timestamp DESC, rowid DESC LIMIT ?",
                )
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
        };

        Ok(rows
            .into_iter()
            .map(|row| AuditEntry {
                id: row.get("id"),
                action: row.get("action"),
                entity: row.get("entity"),
                entity_id: row.get("entity_id"),
                details: row.get("details"),
                user_id: row.get("user_id"),
                timestamp: row.get("timestamp"),
            })
            .collect())
    }
}

#[async_trait]
impl AuditSink for SqliteAuditSink {
    async fn record(&self, entry: &AuditEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO audit_logs (id, action, entity, entity_id, details, user_id, timestamp) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.id)
        .bind(&entry.action)
        .bind(&entry.entity)
        .bind(&entry.entity_id)
        .bind(&entry.details)
        .bind(&entry.user_id)
        .bind(entry.timestamp)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }
}

/// Record an entry, logging instead of failing
pub async fn record_best_effort(sink: &dyn AuditSink, entry: &AuditEntry) {
    if let Err(e) = sink.record(entry).await {
        warn!(action = %entry.action, entity_id = %entry.entity_id, error = %e, "Failed to write audit entry");
    }
}
