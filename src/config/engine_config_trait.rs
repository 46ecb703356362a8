// ==========================================
// 通关阶段时效监控系统 - 引擎配置读取 Trait
// ==========================================
// 职责: 定义引擎/服务装配所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// 说明: 阶段与时效规则是固定业务常量，不在配置范围内
// ==========================================

use async_trait::async_trait;
use std::error::Error;

pub type ConfigResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

// ==========================================
// EngineConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait EngineConfigReader: Send + Sync {
    // ===== 日历配置 =====

    /// 节假日地区
    ///
    /// # 默认值
    /// - es-MX
    async fn get_calendar_locale(&self) -> ConfigResult<String>;

    /// 法定节假日推算年份范围 (from, to)
    ///
    /// # 默认值
    /// - (2020, 2035)
    async fn get_holiday_year_range(&self) -> ConfigResult<(i32, i32)>;

    // ===== 消息配置 =====

    /// 差异消息语言
    ///
    /// # 默认值
    /// - es-MX
    async fn get_message_locale(&self) -> ConfigResult<String>;

    // ===== 远端写入配置 =====

    /// 远端写入超时（毫秒），0 表示不设超时
    ///
    /// # 默认值
    /// - 15000
    async fn get_remote_write_timeout_ms(&self) -> ConfigResult<u64>;

    // ===== 推送流配置 =====

    /// 推送通道容量
    ///
    /// # 默认值
    /// - 256
    async fn get_stream_channel_capacity(&self) -> ConfigResult<usize>;

    /// 记录系统分页大小
    ///
    /// # 默认值
    /// - 500
    async fn get_stream_page_size(&self) -> ConfigResult<usize>;

    // ===== 出站队列配置 =====

    /// 出站记录最大重试次数
    ///
    /// # 默认值
    /// - 3
    async fn get_outbox_max_retries(&self) -> ConfigResult<i32>;
}
