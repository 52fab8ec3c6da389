//! Ingestion 错误类型

use contracts::ContractError;
use thiserror::Error;

/// Adapter 构建错误
///
/// 运行期的拉取失败使用 `contracts::FetchError`，这里只覆盖启动/刷新时
/// 从 `SourceConfig` 构造 adapter 的失败。
#[derive(Debug, Error)]
pub enum IngestionError {
    /// 未注册的 source 类型
    #[error("unknown source type '{source_type}' for source '{source_id}'")]
    UnknownSourceType {
        source_id: String,
        source_type: String,
    },

    /// 凭据环境变量未设置
    #[error("credentials env '{env}' for source '{source_id}' is not set")]
    MissingCredentials { source_id: String, env: String },

    /// 参数非法
    #[error("invalid parameter '{param}' for source '{source_id}': {message}")]
    InvalidParam {
        source_id: String,
        param: String,
        message: String,
    },

    /// HTTP 客户端构建失败
    #[error("failed to build http client for source '{source_id}': {message}")]
    ClientBuild { source_id: String, message: String },
}

impl IngestionError {
    pub fn invalid_param(
        source_id: impl Into<String>,
        param: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidParam {
            source_id: source_id.into(),
            param: param.into(),
            message: message.into(),
        }
    }

    /// 出错的 source ID
    pub fn source_id(&self) -> &str {
        match self {
            Self::UnknownSourceType { source_id, .. }
            | Self::MissingCredentials { source_id, .. }
            | Self::InvalidParam { source_id, .. }
            | Self::ClientBuild { source_id, .. } => source_id,
        }
    }
}

impl From<IngestionError> for ContractError {
    fn from(err: IngestionError) -> Self {
        match err {
            IngestionError::UnknownSourceType {
                source_id,
                source_type,
            } => ContractError::UnknownSourceType {
                source_id,
                source_type,
            },
            IngestionError::MissingCredentials { source_id, env } => {
                ContractError::MissingCredentials {
                    source_id,
                    reference: env,
                }
            }
            other => ContractError::Other(other.to_string()),
        }
    }
}

/// Ingestion Result 类型别名
pub type Result<T> = std::result::Result<T, IngestionError>;
