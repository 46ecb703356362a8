// ==========================================
// 通关阶段时效监控系统 - 配置层
// ==========================================
// 职责: 系统运行参数管理（地区、超时、推送流参数）
// 存储: config_kv 表
// 红线: 阶段词表与时效窗口为固定业务常量，不可配置
// ==========================================

pub mod config_manager;
pub mod engine_config_trait;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager};
pub use engine_config_trait::{ConfigResult, EngineConfigReader};
