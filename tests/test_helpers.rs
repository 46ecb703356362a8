// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 提供测试所需的数据库初始化、报关单与阶段种子数据
// ==========================================

#![allow(dead_code)]

use customs_sla_tracker::db::{ensure_schema, open_sqlite_connection};
use rusqlite::{params, Connection};
use std::error::Error;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file.path().to_str().ok_or("invalid temp path")?.to_string();

    let conn = open_sqlite_connection(&db_path)?;
    ensure_schema(&conn)?;

    Ok((temp_file, db_path))
}

/// 打开测试连接
pub fn open_test_connection(db_path: &str) -> Result<Connection, Box<dyn Error>> {
    Ok(open_sqlite_connection(db_path)?)
}

/// 打开共享测试连接
pub fn shared_connection(db_path: &str) -> Result<Arc<Mutex<Connection>>, Box<dyn Error>> {
    Ok(Arc::new(Mutex::new(open_test_connection(db_path)?)))
}

/// 写入 global 配置
pub fn insert_config(conn: &Connection, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
    conn.execute(
        "INSERT OR REPLACE INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)",
        params![key, value],
    )?;
    Ok(())
}

/// 登记报关单号
pub fn insert_reference(
    conn: &Connection,
    reference: &str,
    customs_office: &str,
    patent: &str,
) -> Result<(), Box<dyn Error>> {
    conn.execute(
        "INSERT OR IGNORE INTO customs_reference (reference, customs_office, patent) VALUES (?1, ?2, ?3)",
        params![reference, customs_office, patent],
    )?;
    Ok(())
}

/// 写入记录系统中的阶段事件
pub fn insert_phase(
    conn: &Connection,
    reference: &str,
    phase_code: &str,
    event_ts: &str,
    exception_code: Option<&str>,
) -> Result<(), Box<dyn Error>> {
    conn.execute(
        r#"
        INSERT OR REPLACE INTO phase_event
            (reference, phase_code, event_ts, recorded_by, exception_code, updated_at)
        VALUES (?1, ?2, ?3, 'seed', ?4, '2025-07-01T00:00:00.000')
        "#,
        params![reference, phase_code, event_ts, exception_code],
    )?;
    Ok(())
}

/// 种子场景
///
/// - PAE251806: 130 → 140 间隔 1 个工作日（时限内）
/// - PAE251807: 130 → 140 间隔 10 个工作日（超时）
/// - PAI242944: 130 已记录，140 待写入
pub fn seed_scenarios(conn: &Connection) -> Result<(), Box<dyn Error>> {
    insert_reference(conn, "PAE251806", "240", "3945")?;
    insert_phase(conn, "PAE251806", "125", "2025-07-01", None)?;
    insert_phase(conn, "PAE251806", "130", "2025-07-02", None)?;
    insert_phase(conn, "PAE251806", "140", "2025-07-03", None)?;

    insert_reference(conn, "PAE251807", "240", "3945")?;
    insert_phase(conn, "PAE251807", "130", "2025-06-20", None)?;
    insert_phase(conn, "PAE251807", "140", "2025-07-04", None)?;

    insert_reference(conn, "PAI242944", "470", "1688")?;
    insert_phase(conn, "PAI242944", "130", "2025-06-20", None)?;
    Ok(())
}
