use application::{ApplicationError, RateLimitError};
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use domain::RepositoryError;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
    retry_after_secs: Option<u64>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code,
                message: message.into(),
            },
            retry_after_secs: None,
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHENTICATED", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_INPUT", message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.body.code
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        match error {
            ApplicationError::Unauthenticated => ApiError::unauthorized("authentication required"),
            ApplicationError::InvalidInput(message) => ApiError::bad_request(message),
            // 拒绝原因只写日志，不返回给调用方
            ApplicationError::Forbidden => {
                ApiError::new(StatusCode::FORBIDDEN, "FORBIDDEN", "forbidden")
            }
            ApplicationError::RateLimited(err) => {
                let retry_after_secs = match &err {
                    RateLimitError::RateLimitExceeded {
                        retry_after_secs, ..
                    } => Some(*retry_after_secs),
                    RateLimitError::Backend(_) => None,
                };
                let mut api_error =
                    ApiError::new(StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED", err.to_string());
                api_error.retry_after_secs = retry_after_secs;
                api_error
            }
            ApplicationError::Repository(RepositoryError::NotFound) => ApiError::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                "requested resource not found",
            ),
            ApplicationError::Repository(RepositoryError::Conflict) => {
                ApiError::new(StatusCode::CONFLICT, "CONFLICT", "resource already exists")
            }
            ApplicationError::Repository(RepositoryError::Storage { message }) => {
                tracing::error!(error = %message, "存储层错误");
                ApiError::internal_server_error("storage error")
            }
            ApplicationError::Infrastructure(message) => {
                tracing::error!(error = %message, "基础设施错误");
                ApiError::internal_server_error("infrastructure error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.body)).into_response();
        if let Some(secs) = self.retry_after_secs {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_maps_to_429() {
        let err = ApiError::from(ApplicationError::RateLimited(
            RateLimitError::RateLimitExceeded {
                current: 6,
                max: 6,
                window_secs: 30,
                retry_after_secs: 12,
            },
        ));
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);

        let response = err.into_response();
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).unwrap(),
            &HeaderValue::from(12u64)
        );
    }

    #[test]
    fn storage_details_are_not_exposed() {
        let err = ApiError::from(ApplicationError::Repository(RepositoryError::storage(
            "connection refused at 10.0.0.3",
        )));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.body.message, "storage error");
    }
}
