// ==========================================
// 通关阶段时效监控系统 - 阶段 API
// ==========================================
// 职责: 阶段差异查询、阶段写入、从记录系统刷新
// ==========================================

use std::sync::Arc;

use futures::future::join_all;

use crate::api::error::{ApiError, ApiResult};
use crate::domain::discrepancy::DiscrepancyResult;
use crate::domain::reference::{PhaseEvent, PhaseWriteRequest};
use crate::engine::discrepancy::DiscrepancyEvaluator;
use crate::engine::events::{DiscrepancyEvent, DiscrepancyEventType, OptionalPublisher};
use crate::remote::PhaseRemote;
use crate::repository::phase_state_store::PhaseStateStore;
use crate::services::optimistic::OptimisticMutationController;

// ==========================================
// PhaseApi - 阶段 API
// ==========================================

/// 阶段API
///
/// 职责：
/// 1. 单号差异判定（读取本地状态后重新计算）
/// 2. 阶段写入（乐观写入协议，确认后发布差异）
/// 3. 从记录系统刷新本地状态
pub struct PhaseApi {
    store: Arc<PhaseStateStore>,
    evaluator: Arc<DiscrepancyEvaluator>,
    controller: Arc<OptimisticMutationController>,
    remote: Arc<dyn PhaseRemote>,
    publisher: OptionalPublisher,
}

impl PhaseApi {
    pub fn new(
        store: Arc<PhaseStateStore>,
        evaluator: Arc<DiscrepancyEvaluator>,
        controller: Arc<OptimisticMutationController>,
        remote: Arc<dyn PhaseRemote>,
        publisher: OptionalPublisher,
    ) -> Self {
        Self {
            store,
            evaluator,
            controller,
            remote,
            publisher,
        }
    }

    fn check_reference(reference: &str) -> ApiResult<()> {
        if reference.trim().is_empty() {
            return Err(ApiError::InvalidInput("报关单号不能为空".to_string()));
        }
        Ok(())
    }

    /// 查询单号当前阶段（生命周期顺序）
    pub fn phases(&self, reference: &str) -> ApiResult<Vec<PhaseEvent>> {
        Self::check_reference(reference)?;
        Ok(self.store.get(reference)?)
    }

    /// 判定单号差异
    ///
    /// # 返回
    /// - Ok(DiscrepancyResult): 每条已具备两端的时效规则一条条目，外加格式错误字段
    /// - Err(ApiError): 单号为空或本地状态不可读
    pub fn evaluate(&self, reference: &str) -> ApiResult<DiscrepancyResult> {
        let events = self.phases(reference)?;
        Ok(self.evaluator.evaluate(reference, &events))
    }

    /// 判定全部已缓存单号
    pub fn evaluate_all(&self) -> ApiResult<Vec<DiscrepancyResult>> {
        let mut results = Vec::new();
        for reference in self.store.references()? {
            let events = self.store.get(&reference)?;
            results.push(self.evaluator.evaluate(&reference, &events));
        }
        Ok(results)
    }

    /// 写入阶段
    ///
    /// 远端失败时本地已回滚，返回 RemoteWriteFailure；
    /// 确认后若单号存在差异则发布到出站队列（失败仅记录告警）
    pub async fn upsert_phase(&self, request: PhaseWriteRequest) -> ApiResult<Vec<PhaseEvent>> {
        let reference = request.reference.clone();
        let acting_user = request.acting_user.clone();

        let events = self.controller.upsert_phase(request).await?;

        let result = self.evaluator.evaluate(&reference, &events);
        if result.has_errors() {
            self.publisher.publish_best_effort(DiscrepancyEvent::new(
                DiscrepancyEventType::PhaseConfirmed,
                Some(acting_user),
                result,
            ));
        }
        Ok(events)
    }

    /// 以记录系统的权威读取替换本地状态并重新判定
    pub async fn refresh_from_remote(&self, reference: &str) -> ApiResult<DiscrepancyResult> {
        Self::check_reference(reference)?;
        let events = self.remote.read_phases(reference).await?;
        self.store.replace_reference(reference, events)?;
        self.evaluate(reference)
    }

    /// 并发刷新多个单号，结果与输入顺序一致；单个失败不影响其他单号
    pub async fn refresh_many(&self, references: &[String]) -> Vec<(String, ApiResult<DiscrepancyResult>)> {
        let results = join_all(references.iter().map(|r| self.refresh_from_remote(r))).await;
        references.iter().cloned().zip(results).collect()
    }
}
