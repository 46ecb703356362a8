// ==========================================
// 通关阶段时效监控系统 - API 层
// ==========================================
// 职责: 提供业务 API 接口,供命令行与外部调用方使用
// ==========================================

pub mod error;
pub mod phase_api;
pub mod tracking_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use phase_api::PhaseApi;
pub use tracking_api::TrackingApi;
