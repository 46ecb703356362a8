// ==========================================
// 通关阶段时效监控系统 - 跟踪报表推送流模型
// ==========================================
// 推送消息: start / data / done / error 四种显式变体
// 数据记录自然键: (报关单号, 阶段代码)
// ==========================================

use crate::domain::reference::{PhaseEvent, Reference};
use crate::domain::types::{PhaseCode, StreamState};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ==========================================
// QueryRange - 查询区间
// ==========================================
#[derive(Debug, Error, PartialEq, Eq)]
#[error("查询区间无效: from={from} 晚于 to={to}")]
pub struct InvalidRangeError {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

/// 闭区间 [from, to]，按阶段日期过滤
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
    #[serde(default)]
    pub customs_office: Option<String>,
}

impl QueryRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, InvalidRangeError> {
        if from > to {
            return Err(InvalidRangeError { from, to });
        }
        Ok(Self {
            from,
            to,
            customs_office: None,
        })
    }

    pub fn with_customs_office(mut self, office: impl Into<String>) -> Self {
        self.customs_office = Some(office.into());
        self
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }
}

// ==========================================
// StreamedTrackingRecord - 推送的跟踪记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamedTrackingRecord {
    /// 到达序号（由聚合器分配，从 1 开始）
    #[serde(default)]
    pub seq: u64,
    #[serde(flatten)]
    pub reference: Reference,
    pub phase: PhaseCode,
    pub timestamp: String,
    #[serde(default)]
    pub recorded_by: String,
    /// 例外代码原文，解析推迟到评估时，未知代码按字段上报
    #[serde(default)]
    pub exception_code: Option<String>,
}

impl StreamedTrackingRecord {
    pub fn natural_key(&self) -> (String, PhaseCode) {
        (self.reference.reference.clone(), self.phase)
    }

    pub fn to_phase_event(&self) -> PhaseEvent {
        PhaseEvent::new(self.phase, self.timestamp.clone(), self.recorded_by.clone())
            .with_raw_exception(self.exception_code.as_deref())
    }
}

// ==========================================
// FeedMessage - 推送消息
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedMessage {
    /// 流开始标记（仅提示）
    Start,
    /// 数据记录（原始 JSON）
    Data(String),
    /// 流结束标记
    Done,
    /// 传输错误
    Error(String),
}

// ==========================================
// TrackingSnapshot - 聚合结果快照
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingSnapshot {
    pub session_id: Option<String>,
    pub state: StreamState,
    pub records: Vec<StreamedTrackingRecord>,
    /// 流未正常结束（中断/取消）时为 true
    pub incomplete: bool,
    /// 被丢弃的畸形消息数
    pub dropped: usize,
    pub flagged_references: Vec<String>,
    pub abort_reason: Option<String>,
}
