// ==========================================
// 通关阶段时效监控系统 - 阶段状态本地存储
// ==========================================
// 职责: 每个报关单号 × 每个阶段保存一条当前事件
// 红线: upsert 替换，不追加重复；无网络调用
// 说明: 乐观写入控制器在远端确认前后操作此存储
// ==========================================

use crate::domain::reference::PhaseEvent;
use crate::domain::types::PhaseCode;
use crate::repository::error::{RepositoryError, RepositoryResult};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

type PhaseMap = BTreeMap<PhaseCode, PhaseEvent>;

// ==========================================
// PhaseStateStore - 阶段状态存储
// ==========================================
/// 单把互斥锁保护全部状态，读者只会看到完整写入后的值
#[derive(Default)]
pub struct PhaseStateStore {
    inner: Mutex<HashMap<String, PhaseMap>>,
}

impl PhaseStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> RepositoryResult<MutexGuard<'_, HashMap<String, PhaseMap>>> {
        self.inner
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn check_reference(reference: &str) -> RepositoryResult<()> {
        if reference.trim().is_empty() {
            return Err(RepositoryError::ValidationError(
                "报关单号不能为空".to_string(),
            ));
        }
        Ok(())
    }

    /// 读取单号的全部当前事件（按生命周期顺序）
    pub fn get(&self, reference: &str) -> RepositoryResult<Vec<PhaseEvent>> {
        let guard = self.lock()?;
        Ok(guard
            .get(reference)
            .map(|phases| phases.values().cloned().collect())
            .unwrap_or_default())
    }

    pub fn get_phase(&self, reference: &str, phase: PhaseCode) -> RepositoryResult<Option<PhaseEvent>> {
        let guard = self.lock()?;
        Ok(guard.get(reference).and_then(|phases| phases.get(&phase)).cloned())
    }

    /// 按阶段代码替换或插入
    pub fn upsert(&self, reference: &str, phase: PhaseCode, event: PhaseEvent) -> RepositoryResult<()> {
        Self::check_reference(reference)?;
        if event.phase != phase {
            return Err(RepositoryError::FieldValueError {
                field: "phase".to_string(),
                message: format!("事件阶段 {} 与目标阶段 {} 不一致", event.phase, phase),
            });
        }

        let mut guard = self.lock()?;
        guard
            .entry(reference.to_string())
            .or_default()
            .insert(phase, event);
        Ok(())
    }

    /// 恢复单个阶段的旧值（None 表示删除），用于回滚
    pub(crate) fn restore_phase(
        &self,
        reference: &str,
        phase: PhaseCode,
        previous: Option<PhaseEvent>,
    ) -> RepositoryResult<()> {
        let mut guard = self.lock()?;
        match previous {
            Some(event) => {
                guard
                    .entry(reference.to_string())
                    .or_default()
                    .insert(phase, event);
            }
            None => {
                if let Some(phases) = guard.get_mut(reference) {
                    phases.remove(&phase);
                    if phases.is_empty() {
                        guard.remove(reference);
                    }
                }
            }
        }
        Ok(())
    }

    /// 以权威读取结果整体替换单号状态
    pub(crate) fn replace_reference(&self, reference: &str, events: Vec<PhaseEvent>) -> RepositoryResult<()> {
        Self::check_reference(reference)?;
        let phases: PhaseMap = events.into_iter().map(|e| (e.phase, e)).collect();

        let mut guard = self.lock()?;
        if phases.is_empty() {
            guard.remove(reference);
        } else {
            guard.insert(reference.to_string(), phases);
        }
        Ok(())
    }

    /// 已缓存的单号列表（排序）
    pub fn references(&self) -> RepositoryResult<Vec<String>> {
        let guard = self.lock()?;
        let mut refs: Vec<String> = guard.keys().cloned().collect();
        refs.sort();
        Ok(refs)
    }
}
