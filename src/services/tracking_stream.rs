// ==========================================
// 通关阶段时效监控系统 - 跟踪报表推送聚合器
// ==========================================
// 职责: 消费推送流，按自然键去重累积记录，并逐单号重新判定差异
// 状态机: Idle → Streaming → Completed | Aborted
// 取消: 丢弃接收端，生产端随之停止；取消后不再处理任何消息
// 断流: 不自动重连，保留已收到的部分结果并标记 incomplete
// ==========================================

use crate::domain::discrepancy::DiscrepancyResult;
use crate::domain::tracking::{
    FeedMessage, InvalidRangeError, QueryRange, StreamedTrackingRecord, TrackingSnapshot,
};
use crate::domain::types::{PhaseCode, StreamState};
use crate::engine::discrepancy::DiscrepancyEvaluator;
use crate::remote::TrackingFeed;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::instrument;
use uuid::Uuid;

/// 取消时记录的中断原因
pub const CANCELLED_REASON: &str = "cancelled";
/// 通道关闭但未收到结束标记
pub const CHANNEL_CLOSED_REASON: &str = "channel closed before done";

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("推送流传输中断: {0}")]
    Transport(String),

    #[error(transparent)]
    InvalidRange(#[from] InvalidRangeError),
}

pub type StreamResult<T> = Result<T, StreamError>;

// ==========================================
// TrackingStreamAggregator
// ==========================================
pub struct TrackingStreamAggregator {
    feed: Arc<dyn TrackingFeed>,
    evaluator: Arc<DiscrepancyEvaluator>,
    state: StreamState,
    session_id: Option<String>,
    range: Option<QueryRange>,
    receiver: Option<mpsc::Receiver<FeedMessage>>,
    records: Vec<StreamedTrackingRecord>,
    /// 单号 → 阶段 → records 下标
    index: HashMap<String, BTreeMap<PhaseCode, usize>>,
    results: BTreeMap<String, DiscrepancyResult>,
    next_seq: u64,
    dropped: usize,
    abort_reason: Option<String>,
}

impl TrackingStreamAggregator {
    pub fn new(feed: Arc<dyn TrackingFeed>, evaluator: Arc<DiscrepancyEvaluator>) -> Self {
        Self {
            feed,
            evaluator,
            state: StreamState::Idle,
            session_id: None,
            range: None,
            receiver: None,
            records: Vec::new(),
            index: HashMap::new(),
            results: BTreeMap::new(),
            next_seq: 0,
            dropped: 0,
            abort_reason: None,
        }
    }

    fn reset(&mut self) {
        self.receiver = None;
        self.state = StreamState::Idle;
        self.session_id = None;
        self.range = None;
        self.records.clear();
        self.index.clear();
        self.results.clear();
        self.next_seq = 0;
        self.dropped = 0;
        self.abort_reason = None;
    }

    /// 开始（或重新开始）订阅；旧会话的记录全部丢弃
    #[instrument(skip(self), fields(from = %range.from, to = %range.to))]
    pub async fn start(&mut self, range: QueryRange) -> StreamResult<()> {
        self.reset();
        let session_id = Uuid::new_v4().to_string();
        self.session_id = Some(session_id.clone());

        match self.feed.subscribe(&range).await {
            Ok(receiver) => {
                self.receiver = Some(receiver);
                self.range = Some(range);
                self.state = StreamState::Streaming;
                tracing::info!(session_id = %session_id, "跟踪报表订阅已开始");
                Ok(())
            }
            Err(e) => {
                self.range = Some(range);
                self.abort(e.to_string());
                Err(StreamError::Transport(e.to_string()))
            }
        }
    }

    fn abort(&mut self, reason: String) {
        self.receiver = None;
        self.state = StreamState::Aborted;
        tracing::warn!(
            session_id = self.session_id.as_deref().unwrap_or("-"),
            received = self.records.len(),
            reason = %reason,
            "跟踪报表推送中断"
        );
        self.abort_reason = Some(reason);
    }

    /// 处理一条消息，返回处理后的状态
    ///
    /// 非 Streaming 状态下的消息一律忽略
    pub fn handle_message(&mut self, message: FeedMessage) -> StreamState {
        if self.state != StreamState::Streaming {
            tracing::debug!(state = %self.state, "非推送状态，忽略消息");
            return self.state;
        }

        match message {
            FeedMessage::Start => {}
            FeedMessage::Data(payload) => self.ingest(&payload),
            FeedMessage::Done => {
                self.receiver = None;
                self.state = StreamState::Completed;
                tracing::info!(
                    session_id = self.session_id.as_deref().unwrap_or("-"),
                    records = self.records.len(),
                    dropped = self.dropped,
                    flagged = self.flagged_references().len(),
                    "跟踪报表推送完成"
                );
            }
            FeedMessage::Error(reason) => self.abort(reason),
        }
        self.state
    }

    fn ingest(&mut self, payload: &str) {
        let mut record: StreamedTrackingRecord = match serde_json::from_str(payload) {
            Ok(record) => record,
            Err(e) => {
                self.dropped += 1;
                tracing::warn!(error = %e, dropped = self.dropped, "畸形推送记录已丢弃");
                return;
            }
        };
        if record.reference.reference.trim().is_empty() {
            self.dropped += 1;
            tracing::warn!(dropped = self.dropped, "推送记录缺少报关单号，已丢弃");
            return;
        }

        let reference = record.reference.reference.clone();
        let phases = self.index.entry(reference.clone()).or_default();
        match phases.get(&record.phase) {
            // 重复投递: 原位替换，保留首次到达的位置与序号
            Some(&position) => {
                record.seq = self.records[position].seq;
                self.records[position] = record;
            }
            None => {
                self.next_seq += 1;
                record.seq = self.next_seq;
                phases.insert(record.phase, self.records.len());
                self.records.push(record);
            }
        }

        self.reevaluate(&reference);
    }

    fn reevaluate(&mut self, reference: &str) {
        let events: Vec<_> = self
            .index
            .get(reference)
            .map(|phases| {
                phases
                    .values()
                    .map(|&i| self.records[i].to_phase_event())
                    .collect()
            })
            .unwrap_or_default();
        let result = self.evaluator.evaluate(reference, &events);
        self.results.insert(reference.to_string(), result);
    }

    /// 等待并处理下一条消息
    ///
    /// 返回 Ok(true) 表示仍在推送；Ok(false) 表示已结束或未开始
    pub async fn pump(&mut self) -> StreamResult<bool> {
        if self.state != StreamState::Streaming {
            return Ok(false);
        }
        let next = match self.receiver.as_mut() {
            Some(receiver) => receiver.recv().await,
            None => return Ok(false),
        };

        let state = match next {
            Some(message) => self.handle_message(message),
            None => {
                self.abort(CHANNEL_CLOSED_REASON.to_string());
                StreamState::Aborted
            }
        };

        match state {
            StreamState::Streaming => Ok(true),
            StreamState::Aborted => Err(StreamError::Transport(
                self.abort_reason.clone().unwrap_or_default(),
            )),
            _ => Ok(false),
        }
    }

    /// 处理到流结束，返回最终快照；中断时返回错误，部分结果仍可通过 snapshot 读取
    pub async fn run_to_end(&mut self) -> StreamResult<TrackingSnapshot> {
        while self.pump().await? {}
        Ok(self.snapshot())
    }

    /// 取消订阅
    pub fn cancel(&mut self) {
        let was_streaming = self.state == StreamState::Streaming;
        self.receiver = None;
        if was_streaming {
            self.state = StreamState::Aborted;
            self.abort_reason = Some(CANCELLED_REASON.to_string());
            tracing::info!(
                session_id = self.session_id.as_deref().unwrap_or("-"),
                received = self.records.len(),
                "跟踪报表订阅已取消"
            );
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn range(&self) -> Option<&QueryRange> {
        self.range.as_ref()
    }

    /// 已接收记录（首次到达顺序）
    pub fn records(&self) -> &[StreamedTrackingRecord] {
        &self.records
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn is_incomplete(&self) -> bool {
        matches!(self.state, StreamState::Streaming | StreamState::Aborted)
    }

    pub fn abort_reason(&self) -> Option<&str> {
        self.abort_reason.as_deref()
    }

    pub fn discrepancies_for(&self, reference: &str) -> Option<&DiscrepancyResult> {
        self.results.get(reference)
    }

    pub fn results(&self) -> impl Iterator<Item = &DiscrepancyResult> {
        self.results.values()
    }

    /// 存在差异的单号（排序）
    pub fn flagged_references(&self) -> Vec<String> {
        self.results
            .values()
            .filter(|r| r.has_errors())
            .map(|r| r.reference.clone())
            .collect()
    }

    pub fn snapshot(&self) -> TrackingSnapshot {
        TrackingSnapshot {
            session_id: self.session_id.clone(),
            state: self.state,
            records: self.records.clone(),
            incomplete: self.is_incomplete(),
            dropped: self.dropped,
            flagged_references: self.flagged_references(),
            abort_reason: self.abort_reason.clone(),
        }
    }
}
