// ==========================================
// 通关阶段时效监控系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod discrepancy;
pub mod reference;
pub mod tracking;
pub mod types;

// 重导出核心类型
pub use discrepancy::{DiscrepancyEntry, DiscrepancyKey, DiscrepancyResult};
pub use reference::{PhaseEvent, PhaseWriteRequest, Reference};
pub use tracking::{
    FeedMessage, InvalidRangeError, QueryRange, StreamedTrackingRecord, TrackingSnapshot,
};
pub use types::{
    DiscrepancyKind, ExceptionCode, MutationState, PhaseCode, StreamState, UnknownCodeError,
};
