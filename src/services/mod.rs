// ==========================================
// 通关阶段时效监控系统 - 服务层
// ==========================================
// 职责: 有状态的协作流程（乐观写入、推送聚合、出站队列）
// ==========================================

pub mod optimistic;
pub mod outbox;
pub mod tracking_stream;

pub use optimistic::{MutationError, MutationResult, OptimisticMutationController, PhaseMutation};
pub use outbox::{DiscrepancyOutbox, OutboxPublisher, OutboxRecord, OutboxStatus};
pub use tracking_stream::{StreamError, StreamResult, TrackingStreamAggregator};
