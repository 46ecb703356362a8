// ==========================================
// 通关阶段时效监控系统 - 差异事件发布
// ==========================================
// 职责: 定义差异事件发布 trait，实现依赖倒置
// 说明: Engine 层定义 trait，Services 层实现出站队列适配器
// ==========================================

use crate::domain::discrepancy::DiscrepancyResult;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Arc;

// ==========================================
// 差异事件类型
// ==========================================

/// 差异事件触发类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscrepancyEventType {
    /// 阶段写入已被记录系统确认
    PhaseConfirmed,
    /// 跟踪报表推送流完成
    StreamCompleted,
    /// 手动触发
    ManualTrigger,
}

impl DiscrepancyEventType {
    pub fn as_str(&self) -> &str {
        match self {
            DiscrepancyEventType::PhaseConfirmed => "PhaseConfirmed",
            DiscrepancyEventType::StreamCompleted => "StreamCompleted",
            DiscrepancyEventType::ManualTrigger => "ManualTrigger",
        }
    }
}

/// 差异事件
///
/// 携带被标记单号的完整判定结果，供出站集成队列消费
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscrepancyEvent {
    pub event_type: DiscrepancyEventType,
    /// 事件来源描述
    pub source: Option<String>,
    pub result: DiscrepancyResult,
}

impl DiscrepancyEvent {
    pub fn new(event_type: DiscrepancyEventType, source: Option<String>, result: DiscrepancyResult) -> Self {
        Self {
            event_type,
            source,
            result,
        }
    }

    pub fn reference(&self) -> &str {
        &self.result.reference
    }
}

// ==========================================
// 事件发布 Trait
// ==========================================

/// 差异事件发布者
///
/// # 实现说明
/// - Services 层的 `OutboxPublisher` 将事件写入 discrepancy_outbox 表
pub trait DiscrepancyPublisher: Send + Sync {
    /// 发布差异事件
    ///
    /// # 返回
    /// - `Ok(id)`: 出站记录 ID（如果支持）或空字符串
    /// - `Err`: 发布失败
    fn publish(&self, event: DiscrepancyEvent) -> Result<String, Box<dyn Error + Send + Sync>>;
}

/// 空操作事件发布者
#[derive(Debug, Clone, Default)]
pub struct NoOpPublisher;

impl DiscrepancyPublisher for NoOpPublisher {
    fn publish(&self, event: DiscrepancyEvent) -> Result<String, Box<dyn Error + Send + Sync>> {
        tracing::debug!(
            "NoOpPublisher: 跳过事件发布 - reference={}, event_type={}",
            event.reference(),
            event.event_type.as_str()
        );
        Ok(String::new())
    }
}

/// 可选的事件发布者包装
///
/// 简化 Option<Arc<dyn DiscrepancyPublisher>> 的使用
#[derive(Clone)]
pub struct OptionalPublisher {
    inner: Option<Arc<dyn DiscrepancyPublisher>>,
}

impl OptionalPublisher {
    pub fn with_publisher(publisher: Arc<dyn DiscrepancyPublisher>) -> Self {
        Self {
            inner: Some(publisher),
        }
    }

    pub fn none() -> Self {
        Self { inner: None }
    }

    /// 发布事件（如果有发布者）
    pub fn publish(&self, event: DiscrepancyEvent) -> Result<String, Box<dyn Error + Send + Sync>> {
        match &self.inner {
            Some(publisher) => publisher.publish(event),
            None => {
                tracing::debug!(
                    "OptionalPublisher: 未配置发布者，跳过事件 - reference={}, event_type={}",
                    event.reference(),
                    event.event_type.as_str()
                );
                Ok(String::new())
            }
        }
    }

    /// 发布失败只记录告警，不影响调用方
    pub fn publish_best_effort(&self, event: DiscrepancyEvent) {
        let reference = event.reference().to_string();
        if let Err(e) = self.publish(event) {
            tracing::warn!(reference = %reference, error = %e, "差异事件发布失败");
        }
    }

    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }
}

impl Default for OptionalPublisher {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recording(Mutex<Vec<String>>);

    impl DiscrepancyPublisher for Recording {
        fn publish(&self, event: DiscrepancyEvent) -> Result<String, Box<dyn Error + Send + Sync>> {
            self.0.lock().unwrap().push(event.reference().to_string());
            Ok("OB-1".to_string())
        }
    }

    #[test]
    fn test_noop_publisher() {
        let event = DiscrepancyEvent::new(
            DiscrepancyEventType::ManualTrigger,
            None,
            DiscrepancyResult::new("PAE251807"),
        );
        let result = NoOpPublisher.publish(event);
        assert!(result.unwrap().is_empty());
    }

    #[test]
    fn test_optional_publisher_delegates() {
        let recording = Arc::new(Recording(Mutex::new(Vec::new())));
        let publisher = OptionalPublisher::with_publisher(recording.clone());
        assert!(publisher.is_configured());

        let id = publisher
            .publish(DiscrepancyEvent::new(
                DiscrepancyEventType::PhaseConfirmed,
                Some("test".to_string()),
                DiscrepancyResult::new("PAE251807"),
            ))
            .unwrap();
        assert_eq!(id, "OB-1");
        assert_eq!(recording.0.lock().unwrap().as_slice(), ["PAE251807"]);
    }

    #[test]
    fn test_optional_publisher_none() {
        let publisher = OptionalPublisher::none();
        assert!(!publisher.is_configured());
        publisher.publish_best_effort(DiscrepancyEvent::new(
            DiscrepancyEventType::ManualTrigger,
            None,
            DiscrepancyResult::new("X"),
        ));
    }
}
