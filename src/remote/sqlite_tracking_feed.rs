// ==========================================
// 通关阶段时效监控系统 - SQLite 跟踪报表推送流
// ==========================================
// 职责: 按查询区间分页读取 phase_event，经 mpsc 通道逐条推送
// 消息顺序: Start → Data* → Done（查询失败时 Error）
// 分页查询在 spawn_blocking 中执行，不占用异步工作线程
// 取消: 接收端被丢弃后生产任务在下一次发送/翻页时退出
// ==========================================

use crate::domain::tracking::{FeedMessage, QueryRange};
use crate::remote::{RemoteError, RemoteResult, TrackingFeed};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use serde_json::json;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// 默认分页大小
pub const DEFAULT_PAGE_SIZE: usize = 500;
/// 默认通道容量
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// 分页游标 (event_ts, reference, phase_code)
type PageCursor = (String, String, String);

pub struct SqliteTrackingFeed {
    conn: Arc<Mutex<Connection>>,
    page_size: usize,
    channel_capacity: usize,
}

impl SqliteTrackingFeed {
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            conn,
            page_size: DEFAULT_PAGE_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }
}

/// 读取一页，返回 (游标, JSON 载荷)
fn fetch_page(
    conn: &Mutex<Connection>,
    range: &QueryRange,
    after: Option<&PageCursor>,
    page_size: usize,
) -> RemoteResult<Vec<(PageCursor, String)>> {
    let conn = conn
        .lock()
        .map_err(|e| RemoteError::Transport(format!("锁获取失败: {}", e)))?;

    let mut stmt = conn.prepare(
        r#"
        SELECT p.event_ts, p.reference, p.phase_code, p.recorded_by, p.exception_code,
               r.customs_office, r.patent
        FROM phase_event p
        JOIN customs_reference r ON r.reference = p.reference
        WHERE substr(p.event_ts, 1, 10) BETWEEN ?1 AND ?2
          AND (?3 IS NULL OR r.customs_office = ?3)
          AND (?4 IS NULL OR (p.event_ts, p.reference, p.phase_code) > (?4, ?5, ?6))
        ORDER BY p.event_ts, p.reference, p.phase_code
        LIMIT ?7
        "#,
    )?;

    let (after_ts, after_ref, after_phase) = match after {
        Some((ts, r, p)) => (Some(ts.as_str()), Some(r.as_str()), Some(p.as_str())),
        None => (None, None, None),
    };

    let rows = stmt.query_map(
        params![
            range.from.to_string(),
            range.to.to_string(),
            range.customs_office,
            after_ts,
            after_ref,
            after_phase,
            page_size as i64,
        ],
        |row| {
            let event_ts: String = row.get(0)?;
            let reference: String = row.get(1)?;
            let phase_code: String = row.get(2)?;
            let payload = json!({
                "reference": reference,
                "customs_office": row.get::<_, String>(5)?,
                "patent": row.get::<_, String>(6)?,
                "phase": phase_code,
                "timestamp": event_ts,
                "recorded_by": row.get::<_, String>(3)?,
                "exception_code": row.get::<_, Option<String>>(4)?,
            });
            Ok(((event_ts, reference, phase_code), payload.to_string()))
        },
    )?;

    let mut page = Vec::new();
    for row in rows {
        page.push(row?);
    }
    Ok(page)
}

#[async_trait]
impl TrackingFeed for SqliteTrackingFeed {
    async fn subscribe(&self, range: &QueryRange) -> RemoteResult<mpsc::Receiver<FeedMessage>> {
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let conn = self.conn.clone();
        let range = range.clone();
        let page_size = self.page_size;

        tokio::spawn(async move {
            if tx.send(FeedMessage::Start).await.is_err() {
                return;
            }

            let mut cursor: Option<PageCursor> = None;
            let mut sent = 0usize;
            loop {
                if tx.is_closed() {
                    tracing::debug!(sent, "订阅已取消，停止推送");
                    return;
                }

                let page = {
                    let conn = conn.clone();
                    let range = range.clone();
                    let after = cursor.clone();
                    tokio::task::spawn_blocking(move || {
                        fetch_page(&conn, &range, after.as_ref(), page_size)
                    })
                    .await
                    .map_err(|e| RemoteError::Transport(format!("分页任务失败: {}", e)))
                    .and_then(|page| page)
                };
                let page = match page {
                    Ok(page) => page,
                    Err(e) => {
                        tracing::warn!(error = %e, "跟踪报表查询失败");
                        let _ = tx.send(FeedMessage::Error(e.to_string())).await;
                        return;
                    }
                };

                if page.is_empty() {
                    tracing::debug!(sent, "跟踪报表推送完成");
                    let _ = tx.send(FeedMessage::Done).await;
                    return;
                }

                for (key, payload) in page {
                    cursor = Some(key);
                    if tx.send(FeedMessage::Data(payload)).await.is_err() {
                        tracing::debug!(sent, "接收端已关闭，停止推送");
                        return;
                    }
                    sent += 1;
                }
            }
        });

        Ok(rx)
    }
}
