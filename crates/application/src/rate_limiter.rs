use async_trait::async_trait;
use domain::UserId;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// 限流错误类型
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    #[error("Rate limit exceeded: {current}/{max} messages per {window_secs}s, retry in {retry_after_secs}s")]
    RateLimitExceeded {
        current: u32,
        max: u32,
        window_secs: u64,
        retry_after_secs: u64,
    },

    /// 限流存储不可用（例如 Redis 断开）
    #[error("Rate limiter backend error: {0}")]
    Backend(String),
}

/// 发送频率检查接口，内存实现和 Redis 实现共用
#[async_trait]
pub trait SendRateLimiter: Send + Sync {
    /// 检查并记录一次发送；超限时不记录
    async fn check_message_rate(&self, user_id: UserId) -> Result<(), RateLimitError>;
}

/// 消息限流器
///
/// 每个用户保留窗口内的发送时间戳，窗口是滑动的：超过窗口长度的时间戳在每次检查时剔除。
/// 距上次清扫满一个窗口后，检查时顺带移除所有已无记录的用户。
pub struct MessageRateLimiter {
    /// 窗口内最大消息数
    max_messages: u32,
    /// 窗口长度
    window_duration: Duration,
    /// 用户发送记录
    user_sends: Arc<RwLock<SendHistory>>,
}

struct SendHistory {
    by_user: HashMap<UserId, VecDeque<Instant>>,
    last_sweep: Instant,
}

impl MessageRateLimiter {
    pub fn new(max_messages: u32, window_duration: Duration) -> Self {
        Self {
            max_messages,
            window_duration,
            user_sends: Arc::new(RwLock::new(SendHistory {
                by_user: HashMap::new(),
                last_sweep: Instant::now(),
            })),
        }
    }

    pub fn from_config(config: &config::RateLimitConfig) -> Self {
        Self::new(config.max_messages, config.window())
    }

    /// 检查用户是否可以发送消息
    pub fn check(&self, user_id: UserId) -> Result<(), RateLimitError> {
        let mut sends = self
            .user_sends
            .write()
            .map_err(|_| RateLimitError::Backend("rate limiter lock poisoned".to_string()))?;

        let now = Instant::now();
        if now.duration_since(sends.last_sweep) >= self.window_duration {
            Self::sweep(&mut sends.by_user, now, self.window_duration);
            sends.last_sweep = now;
        }

        let history = sends.by_user.entry(user_id).or_default();
        prune(history, now, self.window_duration);

        if history.len() >= self.max_messages as usize {
            let retry_after = history
                .front()
                .map(|oldest| self.window_duration.saturating_sub(now.duration_since(*oldest)))
                .unwrap_or_default();
            return Err(RateLimitError::RateLimitExceeded {
                current: history.len() as u32,
                max: self.max_messages,
                window_secs: self.window_duration.as_secs(),
                retry_after_secs: retry_after.as_secs().max(1),
            });
        }

        history.push_back(now);
        Ok(())
    }

    /// 清理窗口外的记录（防止内存泄漏）
    fn sweep(by_user: &mut HashMap<UserId, VecDeque<Instant>>, now: Instant, window: Duration) {
        let before = by_user.len();
        by_user.retain(|_, history| {
            prune(history, now, window);
            !history.is_empty()
        });
        let removed = before - by_user.len();
        if removed > 0 {
            tracing::debug!(removed, remaining = by_user.len(), "清理过期限流记录");
        }
    }
}

fn prune(history: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = history.front() {
        if now.duration_since(*oldest) >= window {
            history.pop_front();
        } else {
            break;
        }
    }
}

impl Default for MessageRateLimiter {
    fn default() -> Self {
        Self::new(6, Duration::from_secs(30)) // 默认每30秒6条消息
    }
}

#[async_trait]
impl SendRateLimiter for MessageRateLimiter {
    async fn check_message_rate(&self, user_id: UserId) -> Result<(), RateLimitError> {
        self.check(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_rate_limiting() {
        let limiter = MessageRateLimiter::default();
        let user_id = UserId::from(Uuid::new_v4());

        // 发送6条消息应该成功
        for i in 0..6 {
            let result = limiter.check(user_id);
            assert!(result.is_ok(), "Message {} should be allowed", i + 1);
        }

        // 第7条消息应该被限流
        let result = limiter.check(user_id);
        if let Err(RateLimitError::RateLimitExceeded {
            current,
            max,
            window_secs,
            ..
        }) = result
        {
            assert_eq!(current, 6);
            assert_eq!(max, 6);
            assert_eq!(window_secs, 30);
        } else {
            panic!("Expected RateLimitExceeded error");
        }

        // 其他用户不受影响
        assert!(limiter.check(UserId::from(Uuid::new_v4())).is_ok());
    }

    #[test]
    fn test_window_slides() {
        let limiter = MessageRateLimiter::new(2, Duration::from_millis(200));
        let user_id = UserId::from(Uuid::new_v4());

        assert!(limiter.check(user_id).is_ok());
        std::thread::sleep(Duration::from_millis(120));
        assert!(limiter.check(user_id).is_ok());

        // 第3条消息应该被限流
        assert!(limiter.check(user_id).is_err());

        // 第一条记录滑出窗口后只释放一个名额
        std::thread::sleep(Duration::from_millis(100));
        assert!(limiter.check(user_id).is_ok());
        assert!(limiter.check(user_id).is_err());
    }

    fn recorded(limiter: &MessageRateLimiter, user_id: UserId) -> usize {
        let sends = limiter.user_sends.read().unwrap();
        sends.by_user.get(&user_id).map(VecDeque::len).unwrap_or(0)
    }

    #[test]
    fn test_rejected_attempts_are_not_recorded() {
        let limiter = MessageRateLimiter::new(1, Duration::from_secs(30));
        let user_id = UserId::from(Uuid::new_v4());

        limiter.check(user_id).unwrap();
        for _ in 0..3 {
            assert!(limiter.check(user_id).is_err());
        }
        assert_eq!(recorded(&limiter, user_id), 1);
    }

    #[test]
    fn test_idle_senders_are_dropped_after_window() {
        let limiter = MessageRateLimiter::new(1, Duration::from_millis(20));
        for _ in 0..1000 {
            limiter.check(UserId::from(Uuid::new_v4())).unwrap();
        }
        assert_eq!(limiter.user_sends.read().unwrap().by_user.len(), 1000);

        std::thread::sleep(Duration::from_millis(50));
        let active = UserId::from(Uuid::new_v4());
        limiter.check(active).unwrap();

        let sends = limiter.user_sends.read().unwrap();
        assert_eq!(sends.by_user.len(), 1);
        assert!(sends.by_user.contains_key(&active));
    }
}
