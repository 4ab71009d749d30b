//! 授权守卫
//!
//! 所有检查都在写入之前执行。拒绝原因只记录在 debug 日志里，调用方统一看到 `Forbidden`。

use std::sync::Arc;

use domain::{Roster, RosterRepository, UserId};

use crate::error::ApplicationError;
use crate::rate_limiter::SendRateLimiter;

pub struct AuthorizationGuard {
    rosters: Arc<dyn RosterRepository>,
    rate_limiter: Arc<dyn SendRateLimiter>,
}

impl AuthorizationGuard {
    pub fn new(rosters: Arc<dyn RosterRepository>, rate_limiter: Arc<dyn SendRateLimiter>) -> Self {
        Self {
            rosters,
            rate_limiter,
        }
    }

    /// 读取名册，从未写入过的用户视为空名册
    pub async fn roster_of(&self, user_id: UserId) -> Result<Roster, ApplicationError> {
        Ok(self
            .rosters
            .find(user_id)
            .await?
            .unwrap_or_else(|| Roster::empty(user_id)))
    }

    /// 双方都在对方的好友集合里
    pub async fn is_mutual_buddy(&self, a: UserId, b: UserId) -> Result<bool, ApplicationError> {
        if a == b {
            return Ok(false);
        }
        let roster_a = self.roster_of(a).await?;
        if !roster_a.is_buddy(b) {
            return Ok(false);
        }
        let roster_b = self.roster_of(b).await?;
        Ok(roster_b.is_buddy(a))
    }

    /// 任一方向存在拉黑即拒绝
    pub async fn assert_not_blocked(&self, a: UserId, b: UserId) -> Result<(), ApplicationError> {
        let roster_a = self.roster_of(a).await?;
        let roster_b = self.roster_of(b).await?;
        Self::check_pair(&roster_a, &roster_b)
    }

    /// 发送者与每一个其他成员之间都不能存在拉黑
    pub async fn assert_not_blocked_with_any(
        &self,
        sender: UserId,
        others: impl IntoIterator<Item = UserId>,
    ) -> Result<(), ApplicationError> {
        let sender_roster = self.roster_of(sender).await?;
        for other in others {
            if sender_roster.has_blocked(other) {
                tracing::debug!(user_id = %sender, target_id = %other, "发送者拉黑了会话成员");
                return Err(ApplicationError::Forbidden);
            }
            let other_roster = self.roster_of(other).await?;
            Self::check_pair(&sender_roster, &other_roster)?;
        }
        Ok(())
    }

    pub async fn guard_rate_limit(&self, sender: UserId) -> Result<(), ApplicationError> {
        self.rate_limiter
            .check_message_rate(sender)
            .await
            .map_err(|err| {
                tracing::debug!(user_id = %sender, error = %err, "发送频率超限");
                ApplicationError::from(err)
            })
    }

    fn check_pair(a: &Roster, b: &Roster) -> Result<(), ApplicationError> {
        if a.has_blocked(b.user_id) || b.has_blocked(a.user_id) {
            tracing::debug!(user_id = %a.user_id, target_id = %b.user_id, "双方之间存在拉黑");
            return Err(ApplicationError::Forbidden);
        }
        Ok(())
    }
}
