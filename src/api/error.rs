// ==========================================
// 通关阶段时效监控系统 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型，将各层错误转换为调用方可展示的错误
// 说明: 所有错误信息必须包含显式原因
// ==========================================

use crate::domain::types::PhaseCode;
use crate::engine::calendar::CalendarError;
use crate::i18n::t_with_args;
use crate::remote::RemoteError;
use crate::repository::error::RepositoryError;
use crate::services::optimistic::MutationError;
use crate::services::tracking_stream::StreamError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 业务错误
    // ==========================================
    /// 日期无法解析
    #[error("日期格式错误: {0}")]
    FormatError(String),

    /// 远端写入失败（本地已回滚）
    #[error("远端写入失败: reference={reference}, phase={phase}, reason={reason}")]
    RemoteWriteFailure {
        reference: String,
        phase: PhaseCode,
        reason: String,
    },

    /// 推送流中断（部分结果保留）
    #[error("推送流中断: {0}")]
    StreamTransportError(String),

    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("无效的状态转换: from={from} to={to}")]
    InvalidStateTransition { from: String, to: String },

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    /// 面向终端用户的本地化消息
    pub fn localized_message(&self) -> String {
        match self {
            ApiError::RemoteWriteFailure {
                reference, phase, ..
            } => t_with_args(
                "mutation.rolled_back",
                &[("phase", phase.as_code()), ("reference", reference)],
            ),
            ApiError::StreamTransportError(reason) => {
                t_with_args("stream.incomplete", &[("reason", reason)])
            }
            other => other.to_string(),
        }
    }
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::DatabaseConnectionError(msg) => ApiError::DatabaseConnectionError(msg),
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseTransactionError(msg)
            | RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::InvalidInput(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::InvalidInput(format!("外键约束违反: {}", msg))
            }
            RepositoryError::InvalidStateTransition { from, to } => {
                ApiError::InvalidStateTransition { from, to }
            }
            RepositoryError::ValidationError(msg) => ApiError::InvalidInput(msg),
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }
            RepositoryError::FileError(msg) => ApiError::InvalidInput(msg),
            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

impl From<CalendarError> for ApiError {
    fn from(err: CalendarError) -> Self {
        match err {
            e @ CalendarError::InvalidDate { .. } => ApiError::FormatError(e.to_string()),
            other => ApiError::InternalError(other.to_string()),
        }
    }
}

impl From<MutationError> for ApiError {
    fn from(err: MutationError) -> Self {
        match err {
            MutationError::InvalidRequest(msg) => ApiError::InvalidInput(msg),
            MutationError::Format(e) => ApiError::from(e),
            MutationError::RemoteWriteFailure {
                reference,
                phase,
                source,
            } => ApiError::RemoteWriteFailure {
                reference,
                phase,
                reason: source.to_string(),
            },
            MutationError::InvalidStateTransition { from, to } => ApiError::InvalidStateTransition {
                from: from.to_string(),
                to: to.to_string(),
            },
            MutationError::Store(e) => ApiError::from(e),
        }
    }
}

impl From<StreamError> for ApiError {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::Transport(reason) => ApiError::StreamTransportError(reason),
            StreamError::InvalidRange(e) => ApiError::InvalidInput(e.to_string()),
        }
    }
}

impl From<RemoteError> for ApiError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::NotFound(msg) => ApiError::NotFound(msg),
            other => ApiError::DatabaseError(other.to_string()),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_conversion() {
        let repo_err = RepositoryError::NotFound {
            entity: "customs_reference".to_string(),
            id: "PAE251806".to_string(),
        };
        let api_err: ApiError = repo_err.into();
        match api_err {
            ApiError::NotFound(msg) => {
                assert!(msg.contains("customs_reference"));
                assert!(msg.contains("PAE251806"));
            }
            _ => panic!("Expected NotFound"),
        }

        let api_err: ApiError = RepositoryError::LockError("poisoned".to_string()).into();
        assert!(matches!(api_err, ApiError::DatabaseConnectionError(_)));
    }

    #[test]
    fn test_mutation_error_conversion() {
        let err = MutationError::RemoteWriteFailure {
            reference: "PAI242944".to_string(),
            phase: PhaseCode::CdpDelivery,
            source: RemoteError::Timeout(15000),
        };
        match ApiError::from(err) {
            ApiError::RemoteWriteFailure {
                reference,
                phase,
                reason,
            } => {
                assert_eq!(reference, "PAI242944");
                assert_eq!(phase, PhaseCode::CdpDelivery);
                assert!(reason.contains("15000"));
            }
            other => panic!("Expected RemoteWriteFailure, got {other:?}"),
        }

        let err = MutationError::Format(CalendarError::InvalidDate {
            value: "2025-13-01".to_string(),
        });
        assert!(matches!(ApiError::from(err), ApiError::FormatError(_)));
    }

    #[test]
    fn test_stream_error_conversion() {
        let api_err = ApiError::from(StreamError::Transport("connection reset".to_string()));
        match &api_err {
            ApiError::StreamTransportError(reason) => assert_eq!(reason, "connection reset"),
            other => panic!("Expected StreamTransportError, got {other:?}"),
        }
        assert!(api_err.localized_message().contains("connection reset"));
    }
}
