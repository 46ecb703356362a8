// ==========================================
// 通关阶段时效监控系统 - 应用状态
// ==========================================
// 职责: 装配共享资源（连接、日历、目录、判定器、本地状态）与 API 实例
// 红线: 不使用全局缓存，所有组件在此构造后注入
// ==========================================

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::api::{PhaseApi, TrackingApi};
use crate::config::{ConfigManager, EngineConfigReader};
use crate::engine::{
    BusinessDayCalendar, CalendarError, CompositeHolidayProvider, DiscrepancyEvaluator,
    FederalHolidayProvider, HolidayProvider, OptionalPublisher, PhaseCatalog,
};
use crate::remote::{SqlitePhaseRemote, SqliteTrackingFeed};
use crate::repository::{HolidayRepository, PhaseStateStore};
use crate::services::{DiscrepancyOutbox, OptimisticMutationController, OutboxPublisher};

/// 数据库路径环境变量
pub const DB_PATH_ENV: &str = "CUSTOMS_SLA_DB_PATH";

/// 应用状态
///
/// 包含所有API实例和共享资源
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 配置管理器
    pub config_manager: Arc<ConfigManager>,

    /// 自定义节假日仓储
    pub holiday_repo: Arc<HolidayRepository>,

    /// 本地阶段状态
    pub store: Arc<PhaseStateStore>,

    /// 差异判定器（持有日历与阶段目录）
    pub evaluator: Arc<DiscrepancyEvaluator>,

    /// 记录系统（SQLite）
    pub phase_remote: Arc<SqlitePhaseRemote>,

    /// 差异出站队列
    pub outbox: Arc<DiscrepancyOutbox>,

    /// 阶段API
    pub phase_api: Arc<PhaseApi>,

    /// 跟踪报表API
    pub tracking_api: Arc<TrackingApi>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 说明
    /// 该方法会：
    /// 1. 打开共享连接并确保表结构
    /// 2. 读取配置，设置消息语言
    /// 3. 合并法定与自定义节假日构造工作日历
    /// 4. 创建服务与 API 实例
    pub async fn new(db_path: String) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let conn = crate::db::open_sqlite_connection(&db_path)
            .map_err(|e| format!("无法打开数据库: {}", e))?;
        crate::db::ensure_schema(&conn).map_err(|e| format!("数据库结构初始化失败: {}", e))?;
        let conn = Arc::new(Mutex::new(conn));

        Self::from_connection(db_path, conn).await
    }

    /// 基于已有连接装配（连接需已完成 ensure_schema）
    pub async fn from_connection(db_path: String, conn: Arc<Mutex<Connection>>) -> Result<Self, String> {
        // ==========================================
        // 配置
        // ==========================================
        let config_manager = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| format!("无法初始化ConfigManager: {}", e))?,
        );
        let calendar_locale = config_manager
            .get_calendar_locale()
            .await
            .map_err(|e| format!("读取日历地区失败: {}", e))?;
        let message_locale = config_manager
            .get_message_locale()
            .await
            .map_err(|e| format!("读取消息语言失败: {}", e))?;
        let (year_from, year_to) = config_manager
            .get_holiday_year_range()
            .await
            .map_err(|e| format!("读取节假日年份范围失败: {}", e))?;
        let write_timeout_ms = config_manager
            .get_remote_write_timeout_ms()
            .await
            .map_err(|e| format!("读取写入超时失败: {}", e))?;
        let channel_capacity = config_manager
            .get_stream_channel_capacity()
            .await
            .map_err(|e| format!("读取推送通道容量失败: {}", e))?;
        let page_size = config_manager
            .get_stream_page_size()
            .await
            .map_err(|e| format!("读取分页大小失败: {}", e))?;
        let max_retries = config_manager
            .get_outbox_max_retries()
            .await
            .map_err(|e| format!("读取出站重试次数失败: {}", e))?;

        crate::i18n::set_locale(&message_locale);

        // ==========================================
        // 工作日历 + 阶段目录
        // ==========================================
        let holiday_repo = Arc::new(HolidayRepository::from_connection(conn.clone()));
        let provider = CompositeHolidayProvider::new(vec![
            Arc::new(FederalHolidayProvider::new(year_from, year_to)) as Arc<dyn HolidayProvider>,
            holiday_repo.clone() as Arc<dyn HolidayProvider>,
        ]);
        let calendar = match BusinessDayCalendar::from_provider(&provider, &calendar_locale) {
            Ok(calendar) => calendar,
            Err(CalendarError::UnsupportedLocale(locale)) => {
                tracing::warn!(locale = %locale, "无该地区节假日数据，仅排除周末");
                BusinessDayCalendar::new(locale, Vec::new())
            }
            Err(e) => return Err(format!("工作日历加载失败: {}", e)),
        };

        let evaluator = Arc::new(DiscrepancyEvaluator::new(
            Arc::new(calendar),
            Arc::new(PhaseCatalog::standard()),
        ));

        // ==========================================
        // 记录系统 + 服务
        // ==========================================
        let store = Arc::new(PhaseStateStore::new());
        let phase_remote = Arc::new(SqlitePhaseRemote::from_connection(conn.clone()));
        let tracking_feed = Arc::new(
            SqliteTrackingFeed::from_connection(conn.clone())
                .with_page_size(page_size)
                .with_channel_capacity(channel_capacity),
        );

        let controller = Arc::new(
            OptimisticMutationController::new(store.clone(), phase_remote.clone())
                .with_write_timeout_ms(write_timeout_ms),
        );

        let outbox = Arc::new(DiscrepancyOutbox::new(conn.clone(), max_retries));
        let publisher = OptionalPublisher::with_publisher(Arc::new(OutboxPublisher::new(outbox.clone())));

        // ==========================================
        // API
        // ==========================================
        let phase_api = Arc::new(PhaseApi::new(
            store.clone(),
            evaluator.clone(),
            controller,
            phase_remote.clone(),
            publisher.clone(),
        ));
        let tracking_api = Arc::new(TrackingApi::new(tracking_feed, evaluator.clone(), publisher));

        tracing::info!(
            calendar_locale = %calendar_locale,
            message_locale = %message_locale,
            write_timeout_ms,
            "AppState初始化完成"
        );

        Ok(Self {
            db_path,
            config_manager,
            holiday_repo,
            store,
            evaluator,
            phase_remote,
            outbox,
            phase_api,
            tracking_api,
        })
    }
}

/// 默认数据库路径
///
/// 优先使用环境变量 CUSTOMS_SLA_DB_PATH，其次为用户数据目录
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var(DB_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./customs_sla.db");

    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("customs-sla-tracker");
        // 目录创建失败时回退到当前目录
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("customs_sla.db");
        }
    }

    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_default_db_path() {
        let path = get_default_db_path();
        assert!(!path.is_empty());
        assert!(path.ends_with(".db"));
    }
}
