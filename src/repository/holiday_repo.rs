// ==========================================
// 通关阶段时效监控系统 - 节假日仓储
// ==========================================
// 职责: holiday_calendar 表读写 + CSV 导入
// 红线: Repository 不含业务逻辑
// ==========================================

use crate::engine::calendar::{CalendarError, CalendarResult};
use crate::engine::holidays::HolidayProvider;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDate;
use rusqlite::{params, Connection};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// CSV 行: date,name
#[derive(Debug, Deserialize)]
struct HolidayCsvRow {
    date: String,
    #[serde(default)]
    name: Option<String>,
}

// ==========================================
// HolidayRepository - 节假日仓储
// ==========================================
pub struct HolidayRepository {
    conn: Arc<Mutex<Connection>>,
}

impl HolidayRepository {
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = crate::db::open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 新增或更新单个节假日
    pub fn upsert(&self, locale: &str, date: NaiveDate, name: Option<&str>) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO holiday_calendar (locale, holiday_date, name) VALUES (?1, ?2, ?3)
            ON CONFLICT(locale, holiday_date) DO UPDATE SET name = excluded.name
            "#,
            params![locale, date.to_string(), name],
        )?;
        Ok(())
    }

    pub fn delete(&self, locale: &str, date: NaiveDate) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "DELETE FROM holiday_calendar WHERE locale = ?1 AND holiday_date = ?2",
            params![locale, date.to_string()],
        )?;
        Ok(affected > 0)
    }

    /// 查询地区全部节假日（按日期排序）
    pub fn list(&self, locale: &str) -> RepositoryResult<Vec<(NaiveDate, Option<String>)>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT holiday_date, name FROM holiday_calendar WHERE locale = ?1 ORDER BY holiday_date",
        )?;
        let rows = stmt.query_map(params![locale], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
        })?;

        let mut holidays = Vec::new();
        for row in rows {
            let (raw, name) = row?;
            match NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
                Ok(date) => holidays.push((date, name)),
                Err(_) => tracing::warn!(locale, value = %raw, "节假日日期格式错误，已跳过"),
            }
        }
        Ok(holidays)
    }

    /// 从 CSV 导入（表头 date,name），整批校验通过后在单个事务内写入
    ///
    /// # 返回
    /// - 导入行数
    pub fn import_csv<R: Read>(&self, reader: R, locale: &str) -> RepositoryResult<usize> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut parsed = Vec::new();
        for (idx, row) in csv_reader.deserialize::<HolidayCsvRow>().enumerate() {
            let row = row?;
            let date = NaiveDate::parse_from_str(&row.date, "%Y-%m-%d").map_err(|_| {
                RepositoryError::FieldValueError {
                    field: format!("date (行 {})", idx + 2),
                    message: format!("无法解析日期 '{}'", row.date),
                }
            })?;
            parsed.push((date, row.name.filter(|n| !n.is_empty())));
        }

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        for (date, name) in &parsed {
            tx.execute(
                r#"
                INSERT INTO holiday_calendar (locale, holiday_date, name) VALUES (?1, ?2, ?3)
                ON CONFLICT(locale, holiday_date) DO UPDATE SET name = excluded.name
                "#,
                params![locale, date.to_string(), name],
            )?;
        }
        tx.commit()?;

        tracing::info!(locale, count = parsed.len(), "节假日 CSV 导入完成");
        Ok(parsed.len())
    }

    pub fn import_csv_file(&self, path: impl AsRef<Path>, locale: &str) -> RepositoryResult<usize> {
        let file = std::fs::File::open(path.as_ref())
            .map_err(|e| RepositoryError::FileError(format!("{}: {}", path.as_ref().display(), e)))?;
        self.import_csv(file, locale)
    }
}

/// 表中无该地区数据时视为不支持，交由组合提供者决定
impl HolidayProvider for HolidayRepository {
    fn holidays(&self, locale: &str) -> CalendarResult<BTreeSet<NaiveDate>> {
        let rows = self
            .list(locale)
            .map_err(|e| CalendarError::HolidaySource(e.to_string()))?;
        if rows.is_empty() {
            return Err(CalendarError::UnsupportedLocale(locale.to_string()));
        }
        Ok(rows.into_iter().map(|(date, _)| date).collect())
    }
}
