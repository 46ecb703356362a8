// ==========================================
// 通关阶段时效监控系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::engine_config_trait::{ConfigResult, EngineConfigReader};
use crate::db::open_sqlite_connection;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> ConfigResult<Self> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> ConfigResult<Self> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    fn get_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取 global scope 的配置值（公开方法，供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        self.get_config_value(key)
    }

    /// 写入 global scope 配置
    pub fn set_global_config_value(&self, key: &str, value: &str) -> ConfigResult<()> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            r#"
            INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
            ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')
            "#,
            params![key, value],
        )?;
        Ok(())
    }

    fn get_config_or_default(&self, key: &str, default: &str) -> ConfigResult<String> {
        Ok(self
            .get_config_value(key)?
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| default.to_string()))
    }

    // 数值配置，格式错误时告警并回退默认值
    fn get_parsed_or_default<T>(&self, key: &str, default: T) -> ConfigResult<T>
    where
        T: std::str::FromStr + Copy + std::fmt::Display,
    {
        let raw = match self.get_config_value(key)? {
            Some(v) => v,
            None => return Ok(default),
        };
        Ok(raw.trim().parse::<T>().unwrap_or_else(|_| {
            tracing::warn!(
                config_key = key,
                raw_value = %raw,
                default = %default,
                "配置格式错误，使用默认值"
            );
            default
        }))
    }

    /// 获取所有配置的快照（JSON格式）
    pub fn get_config_snapshot(&self) -> ConfigResult<String> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt = conn.prepare(
            "SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key",
        )?;

        let mut config_map: HashMap<String, String> = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        Ok(serde_json::to_string(&json!(config_map))?)
    }
}

// ==========================================
// EngineConfigReader Trait 实现
// ==========================================
#[async_trait]
impl EngineConfigReader for ConfigManager {
    async fn get_calendar_locale(&self) -> ConfigResult<String> {
        self.get_config_or_default(config_keys::CALENDAR_LOCALE, "es-MX")
    }

    async fn get_holiday_year_range(&self) -> ConfigResult<(i32, i32)> {
        let from = self.get_parsed_or_default(config_keys::HOLIDAY_YEAR_FROM, 2020)?;
        let to = self.get_parsed_or_default(config_keys::HOLIDAY_YEAR_TO, 2035)?;
        if from > to {
            tracing::warn!(from, to, "节假日年份范围倒置，已交换");
            return Ok((to, from));
        }
        Ok((from, to))
    }

    async fn get_message_locale(&self) -> ConfigResult<String> {
        self.get_config_or_default(config_keys::MESSAGE_LOCALE, "es-MX")
    }

    async fn get_remote_write_timeout_ms(&self) -> ConfigResult<u64> {
        self.get_parsed_or_default(config_keys::REMOTE_WRITE_TIMEOUT_MS, 15_000)
    }

    async fn get_stream_channel_capacity(&self) -> ConfigResult<usize> {
        let capacity = self.get_parsed_or_default(config_keys::STREAM_CHANNEL_CAPACITY, 256usize)?;
        Ok(capacity.max(1))
    }

    async fn get_stream_page_size(&self) -> ConfigResult<usize> {
        let size = self.get_parsed_or_default(config_keys::STREAM_PAGE_SIZE, 500usize)?;
        Ok(size.max(1))
    }

    async fn get_outbox_max_retries(&self) -> ConfigResult<i32> {
        let retries = self.get_parsed_or_default(config_keys::OUTBOX_MAX_RETRIES, 3)?;
        Ok(retries.max(0))
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 日历
    pub const CALENDAR_LOCALE: &str = "calendar_locale";
    pub const HOLIDAY_YEAR_FROM: &str = "holiday_year_from";
    pub const HOLIDAY_YEAR_TO: &str = "holiday_year_to";

    // 消息
    pub const MESSAGE_LOCALE: &str = "message_locale";

    // 远端写入
    pub const REMOTE_WRITE_TIMEOUT_MS: &str = "remote_write_timeout_ms";

    // 推送流
    pub const STREAM_CHANNEL_CAPACITY: &str = "stream_channel_capacity";
    pub const STREAM_PAGE_SIZE: &str = "stream_page_size";

    // 出站队列
    pub const OUTBOX_MAX_RETRIES: &str = "outbox_max_retries";
}
