// ==========================================
// 通关阶段时效监控系统 - 核心库
// ==========================================
// 职责: 报关单阶段事件的工作日时效判定、乐观写入、跟踪报表推送聚合
// 技术栈: Rust + Tokio + SQLite
// 系统定位: 差异判定核心（外部记录系统为权威来源）
// ==========================================

// 初始化国际化系统
rust_i18n::i18n!("locales", fallback = "es-MX");

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 本地状态与节假日
pub mod repository;

// 引擎层 - 工作日历、阶段目录、差异判定
pub mod engine;

// 远端层 - 记录系统与推送流接口
pub mod remote;

// 服务层 - 乐观写入、推送聚合、出站队列
pub mod services;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// 国际化
pub mod i18n;

// API 层 - 业务接口
pub mod api;

// 应用层 - 组件装配
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{DiscrepancyKind, ExceptionCode, MutationState, PhaseCode, StreamState};

// 领域实体
pub use domain::{
    DiscrepancyEntry, DiscrepancyKey, DiscrepancyResult, FeedMessage, PhaseEvent,
    PhaseWriteRequest, QueryRange, Reference, StreamedTrackingRecord, TrackingSnapshot,
};

// 引擎
pub use engine::{BusinessDayCalendar, DiscrepancyEvaluator, PhaseCatalog, SlaRule};

// 服务
pub use services::{OptimisticMutationController, TrackingStreamAggregator};

// API
pub use api::{ApiError, ApiResult, PhaseApi, TrackingApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "Customs SLA Tracker";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
