// ==========================================
// 通关阶段时效监控系统 - SQLite 记录系统
// ==========================================
// 职责: 以 customs_reference / phase_event 表充当权威记录系统
// 并发: 最后写入者胜出 (ON CONFLICT DO UPDATE)
// ==========================================

use crate::domain::reference::{PhaseEvent, PhaseWriteRequest, Reference};
use crate::domain::types::PhaseCode;
use crate::remote::{PhaseRemote, RemoteError, RemoteResult};
use crate::repository::error::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard};

/// phase_event 原始行
struct PhaseEventRow {
    phase_code: String,
    event_ts: String,
    recorded_by: String,
    exception_code: Option<String>,
    updated_at: String,
}

impl PhaseEventRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            phase_code: row.get(0)?,
            event_ts: row.get(1)?,
            recorded_by: row.get(2)?,
            exception_code: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }

    /// 未知阶段代码的行跳过；未知例外代码保留原文，由评估按字段上报
    fn into_event(self, reference: &str) -> Option<PhaseEvent> {
        let phase = match self.phase_code.parse::<PhaseCode>() {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(reference, error = %e, "记录系统存在未知阶段，已跳过");
                return None;
            }
        };
        let mut event = PhaseEvent::new(phase, self.event_ts, self.recorded_by)
            .with_raw_exception(self.exception_code.as_deref());
        if let Some(code) = &event.unknown_exception_code {
            tracing::warn!(reference, phase = %phase, code = %code, "记录系统存在未知例外代码");
        }
        event.updated_at = Some(self.updated_at);
        Some(event)
    }
}

// ==========================================
// SqlitePhaseRemote
// ==========================================
pub struct SqlitePhaseRemote {
    conn: Arc<Mutex<Connection>>,
}

impl SqlitePhaseRemote {
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RemoteResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RemoteError::Transport(format!("锁获取失败: {}", e)))
    }

    /// 登记报关单号（外部系统创建单号时调用，已存在则忽略）
    pub fn register_reference(&self, reference: &Reference) -> RepositoryResult<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        conn.execute(
            r#"
            INSERT OR IGNORE INTO customs_reference (reference, customs_office, patent)
            VALUES (?1, ?2, ?3)
            "#,
            params![reference.reference, reference.customs_office, reference.patent],
        )?;
        Ok(())
    }

    pub fn find_reference(&self, reference: &str) -> RepositoryResult<Option<Reference>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        let found = conn
            .query_row(
                "SELECT reference, customs_office, patent FROM customs_reference WHERE reference = ?1",
                params![reference],
                |row| Ok(Reference::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?)),
            )
            .optional()?;
        Ok(found)
    }

    fn write_phase_sync(&self, request: &PhaseWriteRequest) -> RemoteResult<PhaseEvent> {
        let conn = self.get_conn()?;

        let exists = conn
            .query_row(
                "SELECT 1 FROM customs_reference WHERE reference = ?1",
                params![request.reference],
                |_row| Ok(()),
            )
            .optional()?
            .is_some();
        if !exists {
            return Err(RemoteError::Rejected(format!(
                "报关单号未登记: {}",
                request.reference
            )));
        }

        conn.execute(
            r#"
            INSERT INTO phase_event (reference, phase_code, event_ts, recorded_by, exception_code, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, strftime('%Y-%m-%dT%H:%M:%f', 'now'))
            ON CONFLICT(reference, phase_code) DO UPDATE SET
                event_ts = excluded.event_ts,
                recorded_by = excluded.recorded_by,
                exception_code = excluded.exception_code,
                updated_at = excluded.updated_at
            "#,
            params![
                request.reference,
                request.phase.as_code(),
                request.timestamp.trim(),
                request.acting_user,
                request.exception_code.map(|c| c.as_code()),
            ],
        )?;

        let row = conn.query_row(
            r#"
            SELECT phase_code, event_ts, recorded_by, exception_code, updated_at
            FROM phase_event WHERE reference = ?1 AND phase_code = ?2
            "#,
            params![request.reference, request.phase.as_code()],
            PhaseEventRow::from_row,
        )?;

        row.into_event(&request.reference).ok_or_else(|| {
            RemoteError::Transport(format!("写入后无法读取阶段 {}", request.phase))
        })
    }

    fn read_phases_sync(&self, reference: &str) -> RemoteResult<Vec<PhaseEvent>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT phase_code, event_ts, recorded_by, exception_code, updated_at
            FROM phase_event WHERE reference = ?1
            "#,
        )?;
        let rows = stmt.query_map(params![reference], PhaseEventRow::from_row)?;

        let mut events = Vec::new();
        for row in rows {
            if let Some(event) = row?.into_event(reference) {
                events.push(event);
            }
        }
        events.sort_by_key(|e| e.phase);
        Ok(events)
    }
}

#[async_trait]
impl PhaseRemote for SqlitePhaseRemote {
    async fn write_phase(&self, request: &PhaseWriteRequest) -> RemoteResult<PhaseEvent> {
        self.write_phase_sync(request)
    }

    async fn read_phases(&self, reference: &str) -> RemoteResult<Vec<PhaseEvent>> {
        self.read_phases_sync(reference)
    }
}
