// ==========================================
// 通关阶段时效监控系统 - 应用层
// ==========================================
// 职责: 组件装配，连接命令行入口与 API
// ==========================================

pub mod state;

// 重导出
pub use state::{get_default_db_path, AppState, DB_PATH_ENV};
