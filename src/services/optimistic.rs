// ==========================================
// 通关阶段时效监控系统 - 乐观写入控制器
// ==========================================
// 职责: 阶段写入的本地先行 + 远端确认 / 回滚协议
// 状态机: Previous → Optimistic → Confirmed | RolledBack
// 红线: 写入失败后本地状态必须与写入前快照完全一致
// 说明: 同一 (单号, 阶段) 的并发写入不做串行化，由调用方保证
// ==========================================

use crate::domain::reference::{PhaseEvent, PhaseWriteRequest};
use crate::domain::types::{MutationState, PhaseCode};
use crate::engine::calendar::{parse_phase_timestamp, CalendarError};
use crate::remote::{PhaseRemote, RemoteError};
use crate::repository::error::RepositoryError;
use crate::repository::phase_state_store::PhaseStateStore;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

// ==========================================
// MutationError
// ==========================================
#[derive(Debug, Error)]
pub enum MutationError {
    #[error("写入请求无效: {0}")]
    InvalidRequest(String),

    #[error("阶段时间格式错误: {0}")]
    Format(#[from] CalendarError),

    #[error("远端写入失败 (reference={reference}, phase={phase}): {source}")]
    RemoteWriteFailure {
        reference: String,
        phase: PhaseCode,
        #[source]
        source: RemoteError,
    },

    #[error("无效的写入状态转换: from={from} to={to}")]
    InvalidStateTransition {
        from: MutationState,
        to: MutationState,
    },

    #[error(transparent)]
    Store(#[from] RepositoryError),
}

pub type MutationResult<T> = Result<T, MutationError>;

// ==========================================
// PhaseMutation - 单次写入
// ==========================================
#[derive(Debug, Clone)]
pub struct PhaseMutation {
    pub mutation_id: String,
    pub request: PhaseWriteRequest,
    /// 写入前单号的完整快照
    pub previous_snapshot: Vec<PhaseEvent>,
    /// 写入前该阶段的值（None 表示原本不存在）
    pub previous_value: Option<PhaseEvent>,
    pub optimistic: PhaseEvent,
    pub state: MutationState,
}

impl PhaseMutation {
    pub fn reference(&self) -> &str {
        &self.request.reference
    }

    pub fn phase(&self) -> PhaseCode {
        self.request.phase
    }

    fn check_transition(&self, to: MutationState) -> MutationResult<()> {
        if self.state != MutationState::Optimistic {
            return Err(MutationError::InvalidStateTransition {
                from: self.state,
                to,
            });
        }
        Ok(())
    }

    fn transition(&mut self, to: MutationState) -> MutationResult<()> {
        self.check_transition(to)?;
        self.state = to;
        Ok(())
    }
}

// ==========================================
// OptimisticMutationController
// ==========================================
pub struct OptimisticMutationController {
    store: Arc<PhaseStateStore>,
    remote: Arc<dyn PhaseRemote>,
    write_timeout: Option<Duration>,
}

impl OptimisticMutationController {
    pub fn new(store: Arc<PhaseStateStore>, remote: Arc<dyn PhaseRemote>) -> Self {
        Self {
            store,
            remote,
            write_timeout: None,
        }
    }

    /// 远端写入超时（0 表示不设超时）
    pub fn with_write_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.write_timeout = (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms));
        self
    }

    pub fn store(&self) -> &PhaseStateStore {
        &self.store
    }

    fn validate(request: &PhaseWriteRequest) -> MutationResult<()> {
        if request.reference.trim().is_empty() {
            return Err(MutationError::InvalidRequest("报关单号不能为空".to_string()));
        }
        if request.acting_user.trim().is_empty() {
            return Err(MutationError::InvalidRequest("操作人不能为空".to_string()));
        }
        parse_phase_timestamp(&request.timestamp)?;
        Ok(())
    }

    /// 校验请求、记录快照并写入乐观值
    pub fn begin(&self, request: PhaseWriteRequest) -> MutationResult<PhaseMutation> {
        Self::validate(&request)?;

        let previous_snapshot = self.store.get(&request.reference)?;
        let previous_value = previous_snapshot
            .iter()
            .find(|e| e.phase == request.phase)
            .cloned();
        let optimistic = PhaseEvent::from_request(&request);

        let mut mutation = PhaseMutation {
            mutation_id: Uuid::new_v4().to_string(),
            request,
            previous_snapshot,
            previous_value,
            optimistic,
            state: MutationState::Previous,
        };

        self.store.upsert(
            mutation.reference(),
            mutation.phase(),
            mutation.optimistic.clone(),
        )?;
        mutation.state = MutationState::Optimistic;

        tracing::debug!(
            mutation_id = %mutation.mutation_id,
            reference = mutation.reference(),
            phase = %mutation.phase(),
            "乐观值已写入"
        );
        Ok(mutation)
    }

    /// 以权威记录确认；有权威读取结果时整体替换单号状态
    ///
    /// 任一步失败时写入仍停留在 Optimistic，可由调用方回滚
    pub fn confirm(
        &self,
        mutation: &mut PhaseMutation,
        authoritative: PhaseEvent,
        resync: Option<Vec<PhaseEvent>>,
    ) -> MutationResult<Vec<PhaseEvent>> {
        mutation.check_transition(MutationState::Confirmed)?;

        if authoritative.phase != mutation.phase() {
            return Err(MutationError::RemoteWriteFailure {
                reference: mutation.reference().to_string(),
                phase: mutation.phase(),
                source: RemoteError::Rejected(format!(
                    "权威记录阶段不符: 期望 {}, 实际 {}",
                    mutation.phase(),
                    authoritative.phase
                )),
            });
        }

        let reference = mutation.reference().to_string();
        self.store.upsert(&reference, mutation.phase(), authoritative)?;
        if let Some(events) = resync {
            self.store.replace_reference(&reference, events)?;
        }
        mutation.state = MutationState::Confirmed;

        tracing::info!(
            mutation_id = %mutation.mutation_id,
            reference = %reference,
            phase = %mutation.phase(),
            "阶段写入已确认"
        );
        Ok(self.store.get(&reference)?)
    }

    /// 恢复被写入阶段的旧值
    pub fn rollback(&self, mutation: &mut PhaseMutation) -> MutationResult<()> {
        mutation.transition(MutationState::RolledBack)?;

        self.store.restore_phase(
            mutation.reference(),
            mutation.phase(),
            mutation.previous_value.clone(),
        )?;

        tracing::warn!(
            mutation_id = %mutation.mutation_id,
            reference = mutation.reference(),
            phase = %mutation.phase(),
            "阶段写入已回滚"
        );
        Ok(())
    }

    async fn write_remote(&self, request: &PhaseWriteRequest) -> Result<PhaseEvent, RemoteError> {
        match self.write_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.remote.write_phase(request)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(RemoteError::Timeout(limit.as_millis() as u64)),
            },
            None => self.remote.write_phase(request).await,
        }
    }

    /// 完整写入协议: 乐观写入 → 远端写入 → 确认 / 回滚
    #[instrument(skip(self, request), fields(reference = %request.reference, phase = %request.phase))]
    pub async fn upsert_phase(&self, request: PhaseWriteRequest) -> MutationResult<Vec<PhaseEvent>> {
        let mut mutation = self.begin(request)?;

        match self.write_remote(&mutation.request).await {
            Ok(authoritative) => {
                let resync = match self.remote.read_phases(mutation.reference()).await {
                    Ok(events) => Some(events),
                    Err(e) => {
                        tracing::warn!(error = %e, "权威读取失败，仅应用写入结果");
                        None
                    }
                };
                match self.confirm(&mut mutation, authoritative, resync) {
                    Ok(events) => Ok(events),
                    Err(e) => {
                        self.rollback(&mut mutation)?;
                        Err(e)
                    }
                }
            }
            Err(source) => {
                self.rollback(&mut mutation)?;
                Err(MutationError::RemoteWriteFailure {
                    reference: mutation.reference().to_string(),
                    phase: mutation.phase(),
                    source,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::ExceptionCode;
    use crate::remote::RemoteResult;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// 可编排的远端: 预设写入结果，记录写入次数
    struct ScriptedRemote {
        fail_with: Option<RemoteError>,
        delay: Option<Duration>,
        /// 以其他阶段应答写入
        reply_phase: Option<PhaseCode>,
        writes: Mutex<Vec<PhaseWriteRequest>>,
    }

    impl ScriptedRemote {
        fn ok() -> Self {
            Self {
                fail_with: None,
                delay: None,
                reply_phase: None,
                writes: Mutex::new(Vec::new()),
            }
        }

        fn replying_with(phase: PhaseCode) -> Self {
            Self {
                reply_phase: Some(phase),
                ..Self::ok()
            }
        }

        fn failing(err: RemoteError) -> Self {
            Self {
                fail_with: Some(err),
                ..Self::ok()
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::ok()
            }
        }
    }

    #[async_trait]
    impl PhaseRemote for ScriptedRemote {
        async fn write_phase(&self, request: &PhaseWriteRequest) -> RemoteResult<PhaseEvent> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(err) = &self.fail_with {
                return Err(err.clone());
            }
            self.writes.lock().unwrap().push(request.clone());
            let mut event = PhaseEvent::from_request(request);
            event.updated_at = Some("2025-07-03T10:00:00.000".to_string());
            if let Some(phase) = self.reply_phase {
                event.phase = phase;
            }
            Ok(event)
        }

        async fn read_phases(&self, _reference: &str) -> RemoteResult<Vec<PhaseEvent>> {
            Err(RemoteError::Transport("read unavailable".to_string()))
        }
    }

    fn seeded_store() -> Arc<PhaseStateStore> {
        let store = Arc::new(PhaseStateStore::new());
        store
            .upsert(
                "PAI242944",
                PhaseCode::TransportHandoff,
                PhaseEvent::new(PhaseCode::TransportHandoff, "2025-06-20", "jlopez"),
            )
            .unwrap();
        store
            .upsert(
                "PAI242944",
                PhaseCode::CdpDelivery,
                PhaseEvent::new(PhaseCode::CdpDelivery, "2025-06-23", "jlopez"),
            )
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_upsert_confirms_with_authoritative_record() {
        let store = seeded_store();
        let remote = Arc::new(ScriptedRemote::ok());
        let controller = OptimisticMutationController::new(store.clone(), remote.clone());

        let request = PhaseWriteRequest::new("PAI242944", PhaseCode::CdpDelivery, "2025-07-04", "mruiz")
            .with_exception(ExceptionCode::PwAp);
        let events = controller.upsert_phase(request).await.unwrap();

        assert_eq!(events.len(), 2);
        let cdp = store.get_phase("PAI242944", PhaseCode::CdpDelivery).unwrap().unwrap();
        assert_eq!(cdp.timestamp, "2025-07-04");
        assert_eq!(cdp.exception_code, Some(ExceptionCode::PwAp));
        assert!(cdp.is_confirmed());
        assert_eq!(remote.writes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remote_failure_restores_snapshot() {
        let store = seeded_store();
        let before = store.get("PAI242944").unwrap();
        let controller = OptimisticMutationController::new(
            store.clone(),
            Arc::new(ScriptedRemote::failing(RemoteError::Rejected("409".to_string()))),
        );

        let request = PhaseWriteRequest::new("PAI242944", PhaseCode::CdpDelivery, "2025-07-04", "mruiz");
        let err = controller.upsert_phase(request).await.unwrap_err();

        assert!(matches!(
            err,
            MutationError::RemoteWriteFailure { phase: PhaseCode::CdpDelivery, .. }
        ));
        assert_eq!(store.get("PAI242944").unwrap(), before);
    }

    #[tokio::test]
    async fn test_remote_failure_removes_new_phase() {
        let store = seeded_store();
        let before = store.get("PAI242944").unwrap();
        let controller = OptimisticMutationController::new(
            store.clone(),
            Arc::new(ScriptedRemote::failing(RemoteError::Transport("reset".to_string()))),
        );

        let request =
            PhaseWriteRequest::new("PAI242944", PhaseCode::WarehouseDelivery, "2025-07-08", "mruiz");
        assert!(controller.upsert_phase(request).await.is_err());
        assert_eq!(store.get("PAI242944").unwrap(), before);
        assert!(store.get_phase("PAI242944", PhaseCode::WarehouseDelivery).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_timeout_rolls_back() {
        let store = seeded_store();
        let before = store.get("PAI242944").unwrap();
        let controller = OptimisticMutationController::new(
            store.clone(),
            Arc::new(ScriptedRemote::slow(Duration::from_millis(200))),
        )
        .with_write_timeout_ms(20);

        let request = PhaseWriteRequest::new("PAI242944", PhaseCode::CdpDelivery, "2025-07-04", "mruiz");
        let err = controller.upsert_phase(request).await.unwrap_err();

        match err {
            MutationError::RemoteWriteFailure { source, .. } => {
                assert_eq!(source, RemoteError::Timeout(20))
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(store.get("PAI242944").unwrap(), before);
    }

    #[tokio::test]
    async fn test_authoritative_phase_mismatch_rolls_back() {
        let store = seeded_store();
        let before = store.get("PAI242944").unwrap();
        let controller = OptimisticMutationController::new(
            store.clone(),
            Arc::new(ScriptedRemote::replying_with(PhaseCode::WarehouseDelivery)),
        );

        let request = PhaseWriteRequest::new("PAI242944", PhaseCode::CdpDelivery, "2025-07-04", "mruiz");
        let err = controller.upsert_phase(request).await.unwrap_err();

        match err {
            MutationError::RemoteWriteFailure { phase, source, .. } => {
                assert_eq!(phase, PhaseCode::CdpDelivery);
                assert!(matches!(source, RemoteError::Rejected(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(store.get("PAI242944").unwrap(), before);
    }

    #[test]
    fn test_failed_confirm_leaves_mutation_rollbackable() {
        let store = seeded_store();
        let before = store.get("PAI242944").unwrap();
        let controller = OptimisticMutationController::new(store.clone(), Arc::new(ScriptedRemote::ok()));

        let request = PhaseWriteRequest::new("PAI242944", PhaseCode::CdpDelivery, "2025-07-04", "mruiz");
        let mut mutation = controller.begin(request).unwrap();

        let wrong = PhaseEvent::new(PhaseCode::WarehouseDelivery, "2025-07-04", "mruiz");
        assert!(controller.confirm(&mut mutation, wrong, None).is_err());
        assert_eq!(mutation.state, MutationState::Optimistic);

        controller.rollback(&mut mutation).unwrap();
        assert_eq!(mutation.state, MutationState::RolledBack);
        assert_eq!(store.get("PAI242944").unwrap(), before);
    }

    #[test]
    fn test_begin_rejects_malformed_timestamp() {
        let store = seeded_store();
        let before = store.get("PAI242944").unwrap();
        let controller = OptimisticMutationController::new(store.clone(), Arc::new(ScriptedRemote::ok()));

        let request = PhaseWriteRequest::new("PAI242944", PhaseCode::CdpDelivery, "04/07/2025", "mruiz");
        assert!(matches!(controller.begin(request), Err(MutationError::Format(_))));

        let request = PhaseWriteRequest::new("PAI242944", PhaseCode::CdpDelivery, "2025-07-04", " ");
        assert!(matches!(controller.begin(request), Err(MutationError::InvalidRequest(_))));

        assert_eq!(store.get("PAI242944").unwrap(), before);
    }

    #[test]
    fn test_explicit_rollback_and_terminal_states() {
        let store = seeded_store();
        let before = store.get("PAI242944").unwrap();
        let controller = OptimisticMutationController::new(store.clone(), Arc::new(ScriptedRemote::ok()));

        let request = PhaseWriteRequest::new("PAI242944", PhaseCode::CdpDelivery, "2025-07-04", "mruiz");
        let mut mutation = controller.begin(request).unwrap();
        assert_eq!(mutation.state, MutationState::Optimistic);
        assert_eq!(mutation.previous_snapshot, before);
        assert_eq!(
            store.get_phase("PAI242944", PhaseCode::CdpDelivery).unwrap().unwrap().timestamp,
            "2025-07-04"
        );

        controller.rollback(&mut mutation).unwrap();
        assert_eq!(mutation.state, MutationState::RolledBack);
        assert_eq!(store.get("PAI242944").unwrap(), before);

        let authoritative = mutation.optimistic.clone();
        assert!(matches!(
            controller.confirm(&mut mutation, authoritative, None),
            Err(MutationError::InvalidStateTransition { .. })
        ));
    }
}
