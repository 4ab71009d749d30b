//! JWT 凭证校验
//!
//! 会话签发由上游负责，这里只把 bearer token 解析成调用者身份。

use application::{ApplicationError, IdentityResolver};
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use config::JwtConfig;
use domain::{Caller, UserId};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

/// JWT Claims 结构
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: Uuid,
    pub exp: i64, // 过期时间 (Unix timestamp)
}

#[derive(Clone)]
pub struct JwtService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_ref());
        let decoding_key = DecodingKey::from_secret(config.secret.as_ref());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// 生成 JWT token，供上游签发服务和测试使用
    pub fn generate_token(&self, user_id: UserId) -> Result<String, ApiError> {
        let exp = chrono::Utc::now() + chrono::Duration::hours(self.config.expiration_hours);
        let claims = Claims {
            user_id: user_id.into(),
            exp: exp.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|err| ApiError::internal_server_error(format!("token generation failed: {err}")))
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|token_data| token_data.claims)
    }
}

impl IdentityResolver for JwtService {
    fn resolve(&self, credential: Option<&str>) -> Result<Caller, ApplicationError> {
        let token = credential.ok_or(ApplicationError::Unauthenticated)?;
        let claims = self.verify_token(token).map_err(|err| {
            tracing::debug!(error = %err, "凭证校验失败");
            ApplicationError::Unauthenticated
        })?;
        Ok(Caller::new(UserId::from(claims.user_id)))
    }
}

/// 从 `Authorization: Bearer <token>` 头中取出 token
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// 已认证的调用者
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub Caller);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let caller = state.identity.resolve(bearer_token(&parts.headers))?;
        Ok(CurrentUser(caller))
    }
}
