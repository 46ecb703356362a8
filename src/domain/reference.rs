// ==========================================
// 通关阶段时效监控系统 - 报关单号与阶段事件
// ==========================================
// 报关单号 (Reference) 由外部系统创建，本核心只读
// 阶段事件 (PhaseEvent) 每个 (单号, 阶段) 至多一条当前记录
// ==========================================

use crate::domain::types::{ExceptionCode, PhaseCode};
use serde::{Deserialize, Deserializer, Serialize};

// ==========================================
// Reference - 报关单号
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// 报关单号（主键）
    pub reference: String,
    /// 海关关区代码
    #[serde(default)]
    pub customs_office: String,
    /// 报关代理执照号 (patente)
    #[serde(default)]
    pub patent: String,
}

impl Reference {
    pub fn new(
        reference: impl Into<String>,
        customs_office: impl Into<String>,
        patent: impl Into<String>,
    ) -> Self {
        Self {
            reference: reference.into(),
            customs_office: customs_office.into(),
            patent: patent.into(),
        }
    }
}

// ==========================================
// PhaseEvent - 阶段事件
// ==========================================
/// 时间戳保留记录系统的原始文本，格式错误在评估时按字段上报
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseEvent {
    pub phase: PhaseCode,
    pub timestamp: String,
    #[serde(default)]
    pub recorded_by: String,
    #[serde(default, deserialize_with = "deserialize_optional_exception")]
    pub exception_code: Option<ExceptionCode>,
    /// 记录系统中无法识别的例外代码原文，评估时按字段上报
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unknown_exception_code: Option<String>,
    /// 记录系统确认时间（乐观值为 None）
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl PhaseEvent {
    pub fn new(phase: PhaseCode, timestamp: impl Into<String>, recorded_by: impl Into<String>) -> Self {
        Self {
            phase,
            timestamp: timestamp.into(),
            recorded_by: recorded_by.into(),
            exception_code: None,
            unknown_exception_code: None,
            updated_at: None,
        }
    }

    pub fn with_exception(mut self, code: ExceptionCode) -> Self {
        self.exception_code = Some(code);
        self
    }

    /// 按记录系统原文设置例外代码；无法识别的代码保留原文
    pub fn with_raw_exception(mut self, raw: Option<&str>) -> Self {
        match ExceptionCode::parse_optional(raw) {
            Ok(code) => {
                self.exception_code = code;
                self.unknown_exception_code = None;
            }
            Err(_) => {
                self.exception_code = None;
                self.unknown_exception_code = raw.map(|r| r.trim().to_string());
            }
        }
        self
    }

    /// 由写入请求构造乐观值
    pub fn from_request(request: &PhaseWriteRequest) -> Self {
        Self {
            phase: request.phase,
            timestamp: request.timestamp.trim().to_string(),
            recorded_by: request.acting_user.clone(),
            exception_code: request.exception_code,
            unknown_exception_code: None,
            updated_at: None,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.updated_at.is_some()
    }
}

// ==========================================
// PhaseWriteRequest - 阶段写入请求
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseWriteRequest {
    pub reference: String,
    pub phase: PhaseCode,
    pub timestamp: String,
    #[serde(default, deserialize_with = "deserialize_optional_exception")]
    pub exception_code: Option<ExceptionCode>,
    pub acting_user: String,
}

impl PhaseWriteRequest {
    pub fn new(
        reference: impl Into<String>,
        phase: PhaseCode,
        timestamp: impl Into<String>,
        acting_user: impl Into<String>,
    ) -> Self {
        Self {
            reference: reference.into(),
            phase,
            timestamp: timestamp.into(),
            exception_code: None,
            acting_user: acting_user.into(),
        }
    }

    pub fn with_exception(mut self, code: ExceptionCode) -> Self {
        self.exception_code = Some(code);
        self
    }
}

/// 可选例外代码：null / 空字符串 → None，未知代码 → 反序列化失败
fn deserialize_optional_exception<'de, D>(
    deserializer: D,
) -> Result<Option<ExceptionCode>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    ExceptionCode::parse_optional(raw.as_deref()).map_err(serde::de::Error::custom)
}
