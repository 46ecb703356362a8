// ==========================================
// 通关阶段时效监控系统 - 差异出站队列
// ==========================================
// 职责: 将被标记单号的判定结果写入 discrepancy_outbox，供外部集成消费
// 规则: 每个单号至多一条 PENDING 记录，重复发布刷新载荷
// 重试: mark_failed 累加重试次数，未达上限回到 PENDING
// ==========================================

use crate::engine::events::{DiscrepancyEvent, DiscrepancyPublisher};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::error::Error;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// 出站记录状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxStatus {
    /// 等待发送
    Pending,
    /// 已发送
    Sent,
    /// 失败（已达最大重试次数）
    Failed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &str {
        match self {
            OutboxStatus::Pending => "PENDING",
            OutboxStatus::Sent => "SENT",
            OutboxStatus::Failed => "FAILED",
        }
    }

    pub fn from_db(s: &str) -> Self {
        match s {
            "PENDING" => OutboxStatus::Pending,
            "SENT" => OutboxStatus::Sent,
            _ => OutboxStatus::Failed,
        }
    }
}

/// 出站记录
#[derive(Debug, Clone)]
pub struct OutboxRecord {
    pub outbox_id: String,
    pub reference: String,
    pub event_type: String,
    pub payload_json: String,
    pub status: OutboxStatus,
    pub retry_count: i32,
    pub max_retries: i32,
    pub created_at: String,
    pub updated_at: String,
    pub sent_at: Option<String>,
    pub error_message: Option<String>,
}

impl OutboxRecord {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let status: String = row.get(4)?;
        Ok(Self {
            outbox_id: row.get(0)?,
            reference: row.get(1)?,
            event_type: row.get(2)?,
            payload_json: row.get(3)?,
            status: OutboxStatus::from_db(&status),
            retry_count: row.get(5)?,
            max_retries: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
            sent_at: row.get(9)?,
            error_message: row.get(10)?,
        })
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT outbox_id, reference, event_type, payload_json, status,
           retry_count, max_retries, created_at, updated_at, sent_at, error_message
    FROM discrepancy_outbox
"#;

// ==========================================
// DiscrepancyOutbox
// ==========================================
pub struct DiscrepancyOutbox {
    conn: Arc<Mutex<Connection>>,
    max_retries: i32,
}

impl DiscrepancyOutbox {
    pub fn new(conn: Arc<Mutex<Connection>>, max_retries: i32) -> Self {
        Self {
            conn,
            max_retries: max_retries.max(0),
        }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 写入出站记录，返回 outbox_id
    ///
    /// 单号已有 PENDING 记录时刷新载荷并沿用原 id
    pub fn enqueue(&self, event: &DiscrepancyEvent) -> RepositoryResult<String> {
        let payload_json = serde_json::to_string(&event.result)?;
        let now = Utc::now().to_rfc3339();
        let conn = self.get_conn()?;

        let existing: Option<String> = conn
            .query_row(
                "SELECT outbox_id FROM discrepancy_outbox WHERE reference = ?1 AND status = 'PENDING'",
                params![event.reference()],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(outbox_id) = existing {
            conn.execute(
                r#"
                UPDATE discrepancy_outbox
                SET event_type = ?1, payload_json = ?2, updated_at = ?3
                WHERE outbox_id = ?4
                "#,
                params![event.event_type.as_str(), payload_json, now, outbox_id],
            )?;
            tracing::debug!(outbox_id = %outbox_id, reference = event.reference(), "出站记录已刷新");
            return Ok(outbox_id);
        }

        let outbox_id = Uuid::new_v4().to_string();
        conn.execute(
            r#"
            INSERT INTO discrepancy_outbox (
                outbox_id, reference, event_type, payload_json, status,
                retry_count, max_retries, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, 'PENDING', 0, ?5, ?6, ?6)
            "#,
            params![
                outbox_id,
                event.reference(),
                event.event_type.as_str(),
                payload_json,
                self.max_retries,
                now,
            ],
        )?;

        tracing::info!(
            outbox_id = %outbox_id,
            reference = event.reference(),
            event_type = event.event_type.as_str(),
            "差异已加入出站队列"
        );
        Ok(outbox_id)
    }

    /// 按创建时间读取待发送记录
    pub fn fetch_pending(&self, limit: usize) -> RepositoryResult<Vec<OutboxRecord>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "{} WHERE status = 'PENDING' ORDER BY created_at ASC, rowid ASC LIMIT ?1",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit as i64], OutboxRecord::from_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    pub fn find(&self, outbox_id: &str) -> RepositoryResult<Option<OutboxRecord>> {
        let conn = self.get_conn()?;
        let sql = format!("{} WHERE outbox_id = ?1", SELECT_COLUMNS);
        Ok(conn
            .query_row(&sql, params![outbox_id], OutboxRecord::from_row)
            .optional()?)
    }

    /// 标记为已发送
    pub fn mark_sent(&self, outbox_id: &str) -> RepositoryResult<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.get_conn()?;
        let updated = conn.execute(
            r#"
            UPDATE discrepancy_outbox
            SET status = 'SENT', sent_at = ?1, updated_at = ?1, error_message = NULL
            WHERE outbox_id = ?2 AND status = 'PENDING'
            "#,
            params![now, outbox_id],
        )?;

        if updated == 0 {
            return Err(RepositoryError::NotFound {
                entity: "discrepancy_outbox(PENDING)".to_string(),
                id: outbox_id.to_string(),
            });
        }
        Ok(())
    }

    /// 记录发送失败，返回更新后的状态
    pub fn mark_failed(&self, outbox_id: &str, error: &str) -> RepositoryResult<OutboxStatus> {
        let now = Utc::now().to_rfc3339();
        let conn = self.get_conn()?;

        let current: Option<(i32, i32, String)> = conn
            .query_row(
                "SELECT retry_count, max_retries, status FROM discrepancy_outbox WHERE outbox_id = ?1",
                params![outbox_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let (retry_count, max_retries, status) = current.ok_or_else(|| RepositoryError::NotFound {
            entity: "discrepancy_outbox".to_string(),
            id: outbox_id.to_string(),
        })?;

        if OutboxStatus::from_db(&status) != OutboxStatus::Pending {
            return Err(RepositoryError::InvalidStateTransition {
                from: status,
                to: OutboxStatus::Failed.as_str().to_string(),
            });
        }

        let retry_count = retry_count + 1;
        let next = if retry_count < max_retries {
            OutboxStatus::Pending
        } else {
            OutboxStatus::Failed
        };

        conn.execute(
            r#"
            UPDATE discrepancy_outbox
            SET status = ?1, retry_count = ?2, error_message = ?3, updated_at = ?4
            WHERE outbox_id = ?5
            "#,
            params![next.as_str(), retry_count, error, now, outbox_id],
        )?;

        if next == OutboxStatus::Failed {
            tracing::error!(outbox_id, retry_count, error, "出站记录发送失败，达到最大重试次数");
        } else {
            tracing::warn!(outbox_id, retry_count, error, "出站记录发送失败，将重试");
        }
        Ok(next)
    }

    pub fn count_by_status(&self, status: OutboxStatus) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM discrepancy_outbox WHERE status = ?1",
            params![status.as_str()],
            |row| row.get(0),
        )?)
    }
}

// ==========================================
// OutboxPublisher - DiscrepancyPublisher 适配器
// ==========================================
/// 仅写入带差异的判定结果；无差异结果跳过并返回空 id
pub struct OutboxPublisher {
    outbox: Arc<DiscrepancyOutbox>,
}

impl OutboxPublisher {
    pub fn new(outbox: Arc<DiscrepancyOutbox>) -> Self {
        Self { outbox }
    }
}

impl DiscrepancyPublisher for OutboxPublisher {
    fn publish(&self, event: DiscrepancyEvent) -> Result<String, Box<dyn Error + Send + Sync>> {
        if !event.result.has_errors() {
            tracing::debug!(reference = event.reference(), "无差异，跳过出站");
            return Ok(String::new());
        }
        Ok(self.outbox.enqueue(&event)?)
    }
}
