// ==========================================
// 通关阶段时效监控系统 - 跟踪报表 API
// ==========================================
// 职责: 启动跟踪报表推送聚合、汇总结果、发布被标记单号
// ==========================================

use std::sync::Arc;

use crate::api::error::{ApiError, ApiResult};
use crate::domain::tracking::{QueryRange, TrackingSnapshot};
use crate::domain::types::StreamState;
use crate::engine::calendar::parse_phase_date;
use crate::engine::discrepancy::DiscrepancyEvaluator;
use crate::engine::events::{DiscrepancyEvent, DiscrepancyEventType, OptionalPublisher};
use crate::remote::TrackingFeed;
use crate::services::tracking_stream::TrackingStreamAggregator;

pub struct TrackingApi {
    feed: Arc<dyn TrackingFeed>,
    evaluator: Arc<DiscrepancyEvaluator>,
    publisher: OptionalPublisher,
}

impl TrackingApi {
    pub fn new(
        feed: Arc<dyn TrackingFeed>,
        evaluator: Arc<DiscrepancyEvaluator>,
        publisher: OptionalPublisher,
    ) -> Self {
        Self {
            feed,
            evaluator,
            publisher,
        }
    }

    /// 由两个日期文本构造查询区间
    pub fn parse_range(from: &str, to: &str) -> ApiResult<QueryRange> {
        let from = parse_phase_date(from)?;
        let to = parse_phase_date(to)?;
        QueryRange::new(from, to).map_err(|e| ApiError::InvalidInput(e.to_string()))
    }

    /// 启动推送聚合，返回处于 Streaming 状态的聚合器
    ///
    /// 调用方通过 pump / run_to_end 驱动，cancel 取消
    pub async fn stream_tracking(&self, range: QueryRange) -> ApiResult<TrackingStreamAggregator> {
        let mut aggregator = TrackingStreamAggregator::new(self.feed.clone(), self.evaluator.clone());
        aggregator.start(range).await?;
        Ok(aggregator)
    }

    /// 推送到结束并返回快照
    pub async fn run_report(&self, range: QueryRange) -> ApiResult<TrackingSnapshot> {
        let mut aggregator = self.stream_tracking(range).await?;
        Ok(aggregator.run_to_end().await?)
    }

    /// 发布已完成推送中全部被标记单号，返回发布条数
    ///
    /// 未完成的推送不发布，避免以部分结果触发外部流程
    pub fn publish_flagged(&self, aggregator: &TrackingStreamAggregator) -> ApiResult<usize> {
        if aggregator.state() != StreamState::Completed {
            return Err(ApiError::InvalidStateTransition {
                from: aggregator.state().to_string(),
                to: "PUBLISHED".to_string(),
            });
        }
        if !self.publisher.is_configured() {
            return Ok(0);
        }

        let source = aggregator.session_id().map(str::to_string);
        let mut published = 0;
        for result in aggregator.results().filter(|r| r.has_errors()) {
            self.publisher
                .publish(DiscrepancyEvent::new(
                    DiscrepancyEventType::StreamCompleted,
                    source.clone(),
                    result.clone(),
                ))
                .map_err(|e| ApiError::InternalError(e.to_string()))?;
            published += 1;
        }

        tracing::info!(published, session_id = source.as_deref().unwrap_or("-"), "被标记单号已发布");
        Ok(published)
    }
}
