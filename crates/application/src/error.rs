use domain::{DomainError, RepositoryError};
use thiserror::Error;

use crate::rate_limiter::RateLimitError;

/// 用例层错误。
///
/// `Forbidden` 不携带原因：会话不存在与无权访问对调用方不可区分，具体原因只写日志。
#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("authentication required")]
    Unauthenticated,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("forbidden")]
    Forbidden,
    #[error("rate limited: {0}")]
    RateLimited(RateLimitError),
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl ApplicationError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        ApplicationError::InvalidInput(message.into())
    }
}

impl From<DomainError> for ApplicationError {
    fn from(value: DomainError) -> Self {
        ApplicationError::InvalidInput(value.to_string())
    }
}

impl From<RateLimitError> for ApplicationError {
    fn from(value: RateLimitError) -> Self {
        match value {
            RateLimitError::Backend(message) => ApplicationError::Infrastructure(message),
            exceeded => ApplicationError::RateLimited(exceeded),
        }
    }
}
