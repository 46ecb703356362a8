// ==========================================
// 通关阶段时效监控系统 - 领域类型定义
// ==========================================
// 阶段代码、例外代码均为固定业务常量，不支持运行时配置
// 序列化格式: 业务代码字符串 (与记录系统一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// 未知业务代码
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("未知的{kind}代码: '{code}'")]
pub struct UnknownCodeError {
    pub kind: &'static str,
    pub code: String,
}

// ==========================================
// 阶段代码 (Phase Code)
// ==========================================
// 枚举顺序即通关生命周期顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PhaseCode {
    DocumentReception, // 100 接收文件
    BrokerDelivery,    // 110 交付报关代理
    DutyPayment,       // 120 缴纳报关单税费
    CustomsRelease,    // 125 海关放行
    TransportHandoff,  // 130 交付运输
    CdpDelivery,       // 140 送达配送中心 (CDP)
    WarehouseDelivery, // 150 送达仓库
}

impl PhaseCode {
    pub const ALL: [PhaseCode; 7] = [
        PhaseCode::DocumentReception,
        PhaseCode::BrokerDelivery,
        PhaseCode::DutyPayment,
        PhaseCode::CustomsRelease,
        PhaseCode::TransportHandoff,
        PhaseCode::CdpDelivery,
        PhaseCode::WarehouseDelivery,
    ];

    /// 记录系统中的阶段代码
    pub fn as_code(&self) -> &'static str {
        match self {
            PhaseCode::DocumentReception => "100",
            PhaseCode::BrokerDelivery => "110",
            PhaseCode::DutyPayment => "120",
            PhaseCode::CustomsRelease => "125",
            PhaseCode::TransportHandoff => "130",
            PhaseCode::CdpDelivery => "140",
            PhaseCode::WarehouseDelivery => "150",
        }
    }
}

impl fmt::Display for PhaseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_code())
    }
}

impl FromStr for PhaseCode {
    type Err = UnknownCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim();
        PhaseCode::ALL
            .iter()
            .copied()
            .find(|p| p.as_code() == code)
            .ok_or_else(|| UnknownCodeError {
                kind: "阶段",
                code: code.to_string(),
            })
    }
}

impl TryFrom<String> for PhaseCode {
    type Error = UnknownCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PhaseCode> for String {
    fn from(value: PhaseCode) -> Self {
        value.as_code().to_string()
    }
}

// ==========================================
// 例外代码 (Exception Code)
// ==========================================
// 挂在目标阶段上，豁免该阶段迁移的时效违规
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ExceptionCode {
    PwAp,  // 进口商付款授权待定
    ClDoc, // 客户文件不全
    AdRgo, // 海关查验 (红灯)
    TrInd, // 运输不可用
    FzMy,  // 不可抗力
}

impl ExceptionCode {
    pub const ALL: [ExceptionCode; 5] = [
        ExceptionCode::PwAp,
        ExceptionCode::ClDoc,
        ExceptionCode::AdRgo,
        ExceptionCode::TrInd,
        ExceptionCode::FzMy,
    ];

    pub fn as_code(&self) -> &'static str {
        match self {
            ExceptionCode::PwAp => "PW_AP",
            ExceptionCode::ClDoc => "CL_DOC",
            ExceptionCode::AdRgo => "AD_RGO",
            ExceptionCode::TrInd => "TR_IND",
            ExceptionCode::FzMy => "FZ_MY",
        }
    }

    /// 例外说明（记录系统原文）
    pub fn description(&self) -> &'static str {
        match self {
            ExceptionCode::PwAp => "Pago pendiente de autorización del importador",
            ExceptionCode::ClDoc => "Documentación incompleta del cliente",
            ExceptionCode::AdRgo => "Reconocimiento aduanero",
            ExceptionCode::TrInd => "Transporte no disponible",
            ExceptionCode::FzMy => "Fuerza mayor",
        }
    }

    /// 解析可选例外代码：空字符串视为无例外
    pub fn parse_optional(raw: Option<&str>) -> Result<Option<Self>, UnknownCodeError> {
        match raw.map(str::trim) {
            None | Some("") => Ok(None),
            Some(code) => code.parse().map(Some),
        }
    }
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_code())
    }
}

impl FromStr for ExceptionCode {
    type Err = UnknownCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_uppercase();
        ExceptionCode::ALL
            .iter()
            .copied()
            .find(|c| c.as_code() == code)
            .ok_or(UnknownCodeError {
                kind: "例外",
                code,
            })
    }
}

impl TryFrom<String> for ExceptionCode {
    type Error = UnknownCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ExceptionCode> for String {
    fn from(value: ExceptionCode) -> Self {
        value.as_code().to_string()
    }
}

// ==========================================
// 差异类型 (Discrepancy Kind)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscrepancyKind {
    FormatError,       // 日期无法解析
    SequenceViolation, // 目标阶段早于来源阶段
    SlaViolation,      // 超出工作日时限
}

impl fmt::Display for DiscrepancyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscrepancyKind::FormatError => write!(f, "FORMAT_ERROR"),
            DiscrepancyKind::SequenceViolation => write!(f, "SEQUENCE_VIOLATION"),
            DiscrepancyKind::SlaViolation => write!(f, "SLA_VIOLATION"),
        }
    }
}

// ==========================================
// 乐观写入状态 (Mutation State)
// ==========================================
// 状态机: Previous → Optimistic → Confirmed | RolledBack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MutationState {
    Previous,
    Optimistic,
    Confirmed,
    RolledBack,
}

impl MutationState {
    pub fn as_str(&self) -> &str {
        match self {
            MutationState::Previous => "PREVIOUS",
            MutationState::Optimistic => "OPTIMISTIC",
            MutationState::Confirmed => "CONFIRMED",
            MutationState::RolledBack => "ROLLED_BACK",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, MutationState::Confirmed | MutationState::RolledBack)
    }
}

impl fmt::Display for MutationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 推送流状态 (Stream State)
// ==========================================
// Idle → Streaming → Completed | Aborted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamState {
    Idle,
    Streaming,
    Completed,
    Aborted,
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamState::Idle => write!(f, "IDLE"),
            StreamState::Streaming => write!(f, "STREAMING"),
            StreamState::Completed => write!(f, "COMPLETED"),
            StreamState::Aborted => write!(f, "ABORTED"),
        }
    }
}
