//! 에러 타입
//!
//! - `ConfigError`: 설정 파일 로드/검증 실패 (시작 시점)
//! - `SignalError`: 시그널 하나의 실패 (코디네이터 밖으로 나가지 않음)
//! - `RetrievalError`: `search()` 호출자에게 보이는 유일한 에러

use std::path::PathBuf;

use crate::model::SignalKind;

/// 설정 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path:?}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file at {path:?}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("{message}")]
    Validation { message: String },
}

impl ConfigError {
    pub fn validation(message: impl Into<String>) -> Self {
        ConfigError::Validation {
            message: message.into(),
        }
    }
}

/// 시그널 실패 (SoftEmpty는 에러가 아니므로 여기 없음)
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SignalError {
    /// 시그널 예산 초과
    #[error("{signal} timed out after {elapsed_ms}ms")]
    Timeout { signal: SignalKind, elapsed_ms: u64 },
    /// 백엔드 연결 불가 또는 잘못된 응답
    #[error("{signal} unavailable: {reason}")]
    Unavailable { signal: SignalKind, reason: String },
}

impl SignalError {
    pub fn signal(&self) -> SignalKind {
        match self {
            SignalError::Timeout { signal, .. } | SignalError::Unavailable { signal, .. } => {
                *signal
            }
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, SignalError::Timeout { .. })
    }
}

/// 검색 에러
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    /// 잘못된 요청 또는 설정 (백엔드 호출 전에 거부)
    #[error("invalid request: {0}")]
    Configuration(String),

    /// 시도한 모든 시그널이 실패
    #[error("all {} attempted signals failed", attempted.len())]
    TotalFailure {
        attempted: Vec<SignalKind>,
        failures: Vec<SignalError>,
    },
}

impl From<ConfigError> for RetrievalError {
    fn from(err: ConfigError) -> Self {
        RetrievalError::Configuration(err.to_string())
    }
}

pub type RetrievalResult<T> = std::result::Result<T, RetrievalError>;
