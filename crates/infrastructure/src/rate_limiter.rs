//! 基于 Redis 有序集合的滑动窗口限流，多节点共享同一份计数。

use std::time::Duration;

use application::{RateLimitError, SendRateLimiter};
use async_trait::async_trait;
use domain::UserId;
use redis::aio::ConnectionManager;
use redis::{Client, Script};
use uuid::Uuid;

const KEY_PREFIX: &str = "chat:rate:";

// 返回 {是否放行, 窗口内计数, 需等待的毫秒数}；被拒绝的尝试不计入窗口
const SLIDING_WINDOW_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local max = tonumber(ARGV[3])

redis.call('ZREMRANGEBYSCORE', key, '-inf', now - window)
local count = redis.call('ZCARD', key)
if count >= max then
    local retry = window
    local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
    if oldest[2] then
        retry = tonumber(oldest[2]) + window - now
    end
    return {0, count, retry}
end

redis.call('ZADD', key, now, ARGV[4])
redis.call('PEXPIRE', key, window)
return {1, count + 1, 0}
"#;

pub struct RedisRateLimiter {
    connection: ConnectionManager,
    script: Script,
    max_messages: u32,
    window: Duration,
}

impl RedisRateLimiter {
    pub async fn connect(
        client: &Client,
        max_messages: u32,
        window: Duration,
    ) -> redis::RedisResult<Self> {
        let connection = client.get_connection_manager().await?;
        Ok(Self {
            connection,
            script: Script::new(SLIDING_WINDOW_SCRIPT),
            max_messages,
            window,
        })
    }

    fn key(user_id: UserId) -> String {
        format!("{KEY_PREFIX}{user_id}")
    }
}

#[async_trait]
impl SendRateLimiter for RedisRateLimiter {
    async fn check_message_rate(&self, user_id: UserId) -> Result<(), RateLimitError> {
        let mut conn = self.connection.clone();
        let window_ms = i64::try_from(self.window.as_millis()).unwrap_or(i64::MAX);
        let result: Vec<i64> = self
            .script
            .key(Self::key(user_id))
            .arg(chrono::Utc::now().timestamp_millis())
            .arg(window_ms)
            .arg(self.max_messages)
            .arg(Uuid::new_v4().to_string())
            .invoke_async(&mut conn)
            .await
            .map_err(|err| RateLimitError::Backend(err.to_string()))?;

        match result.as_slice() {
            [1, _, _] => Ok(()),
            [0, count, retry_ms] => Err(RateLimitError::RateLimitExceeded {
                current: u32::try_from(*count).unwrap_or(u32::MAX),
                max: self.max_messages,
                window_secs: self.window.as_secs(),
                retry_after_secs: (u64::try_from(*retry_ms).unwrap_or(0) / 1000).max(1),
            }),
            other => Err(RateLimitError::Backend(format!(
                "unexpected rate limit script reply: {other:?}"
            ))),
        }
    }
}
