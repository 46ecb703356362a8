// ==========================================
// 通关阶段时效监控系统 - 远端记录系统接口
// ==========================================
// 职责: 定义核心所依赖的外部接口（不含传输细节）
// - PhaseRemote: 阶段写入 / 读取
// - TrackingFeed: 跟踪报表推送流
// 实现者: SqlitePhaseRemote / SqliteTrackingFeed（本地记录系统）
// ==========================================

pub mod sqlite_phase_remote;
pub mod sqlite_tracking_feed;

use crate::domain::reference::{PhaseEvent, PhaseWriteRequest};
use crate::domain::tracking::{FeedMessage, QueryRange};
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

pub use sqlite_phase_remote::SqlitePhaseRemote;
pub use sqlite_tracking_feed::SqliteTrackingFeed;

/// 远端错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("记录系统拒绝写入: {0}")]
    Rejected(String),

    #[error("记录系统响应超时: {0}ms")]
    Timeout(u64),

    #[error("记录系统传输失败: {0}")]
    Transport(String),

    #[error("记录不存在: {0}")]
    NotFound(String),
}

impl From<rusqlite::Error> for RemoteError {
    fn from(err: rusqlite::Error) -> Self {
        RemoteError::Transport(err.to_string())
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

// ==========================================
// PhaseRemote - 阶段记录系统
// ==========================================
#[async_trait]
pub trait PhaseRemote: Send + Sync {
    /// 写入阶段，返回记录系统确认后的权威记录
    async fn write_phase(&self, request: &PhaseWriteRequest) -> RemoteResult<PhaseEvent>;

    /// 读取单号全部当前阶段
    async fn read_phases(&self, reference: &str) -> RemoteResult<Vec<PhaseEvent>>;
}

// ==========================================
// TrackingFeed - 跟踪报表推送流
// ==========================================
#[async_trait]
pub trait TrackingFeed: Send + Sync {
    /// 订阅查询区间的推送流
    ///
    /// 丢弃返回的 Receiver 即取消订阅，生产端随之停止
    async fn subscribe(&self, range: &QueryRange) -> RemoteResult<mpsc::Receiver<FeedMessage>>;
}
