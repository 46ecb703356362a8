// ==========================================
// 通关阶段时效监控系统 - 差异结果
// ==========================================
// 派生对象: 阶段事件 + 时效规则 + 工作日历 的纯函数结果
// 不持久化，每次读取重新计算
// ==========================================

use crate::domain::types::{DiscrepancyKind, ExceptionCode, PhaseCode};
use serde::{Deserialize, Serialize};

/// 差异条目的定位键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscrepancyKey {
    /// 阶段迁移 source → target
    Transition { source: PhaseCode, target: PhaseCode },
    /// 单个阶段字段（时间戳格式错误）
    Field { phase: PhaseCode },
}

/// 单条差异
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscrepancyEntry {
    pub key: DiscrepancyKey,
    pub has_error: bool,
    pub kind: Option<DiscrepancyKind>,
    pub message: Option<String>,
    /// 实际间隔工作日（可计算时）
    pub business_days: Option<i64>,
    pub max_business_days: Option<u32>,
    pub exception_code: Option<ExceptionCode>,
}

impl DiscrepancyEntry {
    pub fn ok(key: DiscrepancyKey) -> Self {
        Self {
            key,
            has_error: false,
            kind: None,
            message: None,
            business_days: None,
            max_business_days: None,
            exception_code: None,
        }
    }

    pub fn error(key: DiscrepancyKey, kind: DiscrepancyKind, message: String) -> Self {
        Self {
            key,
            has_error: true,
            kind: Some(kind),
            message: Some(message),
            business_days: None,
            max_business_days: None,
            exception_code: None,
        }
    }
}

// ==========================================
// DiscrepancyResult - 单号差异结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscrepancyResult {
    pub reference: String,
    pub entries: Vec<DiscrepancyEntry>,
}

impl DiscrepancyResult {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            entries: Vec::new(),
        }
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|e| e.has_error)
    }

    pub fn error_count(&self) -> usize {
        self.entries.iter().filter(|e| e.has_error).count()
    }

    pub fn errors(&self) -> impl Iterator<Item = &DiscrepancyEntry> {
        self.entries.iter().filter(|e| e.has_error)
    }

    pub fn transition(&self, source: PhaseCode, target: PhaseCode) -> Option<&DiscrepancyEntry> {
        let key = DiscrepancyKey::Transition { source, target };
        self.entries.iter().find(|e| e.key == key)
    }

    pub fn field(&self, phase: PhaseCode) -> Option<&DiscrepancyEntry> {
        let key = DiscrepancyKey::Field { phase };
        self.entries.iter().find(|e| e.key == key)
    }
}
