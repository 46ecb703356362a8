// ==========================================
// 通关阶段时效监控系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 本地阶段状态存储、节假日表访问
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod error;
pub mod holiday_repo;
pub mod phase_state_store;

// 重导出核心仓储
pub use error::{RepositoryError, RepositoryResult};
pub use holiday_repo::HolidayRepository;
pub use phase_state_store::PhaseStateStore;
