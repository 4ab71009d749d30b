//! 好友名册操作
//!
//! 双方名册各自是一次原子写入，两次写入之间可能部分成功；所有写入都是集合的增删，
//! 重试会把状态补全。

use domain::{Caller, Roster, RosterSet, RosterUpdate, UserId};

use super::{reject_self, ChatService};
use crate::error::ApplicationError;

impl ChatService {
    pub async fn get_roster(&self, caller: Caller) -> Result<Roster, ApplicationError> {
        self.guard.roster_of(caller.user_id()).await
    }

    /// 发送好友请求；已是好友或请求已挂起时不做任何事
    pub async fn request_buddy(&self, caller: Caller, to: UserId) -> Result<bool, ApplicationError> {
        reject_self(caller, to, "request")?;
        let from = caller.user_id();

        let from_roster = self.guard.roster_of(from).await?;
        let to_roster = self.guard.roster_of(to).await?;
        if from_roster.has_blocked(to) || to_roster.has_blocked(from) {
            tracing::debug!(user_id = %from, target_id = %to, "好友请求被拉黑关系拒绝");
            return Err(ApplicationError::Forbidden);
        }

        if from_roster.is_buddy(to) && to_roster.is_buddy(from) {
            return Ok(true);
        }
        if from_roster.requests_out.contains(&to) && to_roster.requests_in.contains(&from) {
            return Ok(true);
        }

        // 只剩单侧的好友记录视为失效，重新走请求流程
        self.deps
            .roster_repository
            .apply(
                from,
                &RosterUpdate::new()
                    .remove(RosterSet::Buddies, to)
                    .add(RosterSet::RequestsOut, to),
            )
            .await?;
        self.deps
            .roster_repository
            .apply(
                to,
                &RosterUpdate::new()
                    .remove(RosterSet::Buddies, from)
                    .add(RosterSet::RequestsIn, from),
            )
            .await?;

        tracing::info!(user_id = %from, target_id = %to, "已发送好友请求");
        Ok(true)
    }

    /// 接受好友请求。
    ///
    /// 需要有请求存在的证据：对方在自己的 `requests_in` 中，或自己在对方的 `requests_out` 中。
    /// 任一侧的请求记录缺失都可以，两侧都直接写成完成状态；已经是好友时重复接受无副作用。
    pub async fn accept_buddy(
        &self,
        caller: Caller,
        requester: UserId,
    ) -> Result<bool, ApplicationError> {
        reject_self(caller, requester, "accept")?;
        let user_id = caller.user_id();

        let own = self.guard.roster_of(user_id).await?;
        let theirs = self.guard.roster_of(requester).await?;
        if own.has_blocked(requester) || theirs.has_blocked(user_id) {
            tracing::debug!(user_id = %user_id, target_id = %requester, "接受好友被拉黑关系拒绝");
            return Err(ApplicationError::Forbidden);
        }

        if own.is_buddy(requester) && theirs.is_buddy(user_id) {
            return Ok(true);
        }
        let requested =
            own.requests_in.contains(&requester) || theirs.requests_out.contains(&user_id);
        if !requested {
            tracing::debug!(user_id = %user_id, target_id = %requester, "没有待接受的好友请求");
            return Err(ApplicationError::Forbidden);
        }

        self.link_buddies(user_id, requester).await?;
        Ok(true)
    }

    /// 双方互相加为好友，并清掉双方之间的挂起请求。
    ///
    /// 检查之后写入之前可能有拉黑提交：写入后任一侧名册出现拉黑，就撤销双方的好友记录。
    async fn link_buddies(&self, a: UserId, b: UserId) -> Result<(), ApplicationError> {
        let roster_a = self
            .deps
            .roster_repository
            .apply(a, &RosterUpdate::new().strip(b).add(RosterSet::Buddies, b))
            .await?;
        if roster_a.has_blocked(b) {
            return self.unlink_after_block(a, b).await;
        }
        let roster_b = self
            .deps
            .roster_repository
            .apply(b, &RosterUpdate::new().strip(a).add(RosterSet::Buddies, a))
            .await?;
        if roster_b.has_blocked(a) {
            return self.unlink_after_block(a, b).await;
        }

        tracing::info!(user_id = %a, target_id = %b, "已成为好友");
        Ok(())
    }

    async fn unlink_after_block(&self, a: UserId, b: UserId) -> Result<(), ApplicationError> {
        self.deps
            .roster_repository
            .apply(a, &RosterUpdate::new().remove(RosterSet::Buddies, b))
            .await?;
        self.deps
            .roster_repository
            .apply(b, &RosterUpdate::new().remove(RosterSet::Buddies, a))
            .await?;
        tracing::debug!(user_id = %a, target_id = %b, "建立好友时出现拉黑，已撤销");
        Err(ApplicationError::Forbidden)
    }

    /// 拒绝好友请求，双方的挂起请求都会被移除
    pub async fn decline_buddy(
        &self,
        caller: Caller,
        requester: UserId,
    ) -> Result<bool, ApplicationError> {
        reject_self(caller, requester, "decline")?;
        let user_id = caller.user_id();

        self.deps
            .roster_repository
            .apply(
                user_id,
                &RosterUpdate::new().remove(RosterSet::RequestsIn, requester),
            )
            .await?;
        self.deps
            .roster_repository
            .apply(
                requester,
                &RosterUpdate::new().remove(RosterSet::RequestsOut, user_id),
            )
            .await?;

        tracing::info!(user_id = %user_id, target_id = %requester, "已拒绝好友请求");
        Ok(true)
    }

    /// 解除好友关系，不拉黑
    pub async fn remove_buddy(&self, caller: Caller, other: UserId) -> Result<bool, ApplicationError> {
        reject_self(caller, other, "remove")?;
        let user_id = caller.user_id();

        self.deps
            .roster_repository
            .apply(user_id, &RosterUpdate::new().strip(other))
            .await?;
        self.deps
            .roster_repository
            .apply(other, &RosterUpdate::new().strip(user_id))
            .await?;

        tracing::info!(user_id = %user_id, target_id = %other, "已解除好友关系");
        Ok(true)
    }

    pub async fn block_user(&self, caller: Caller, target: UserId) -> Result<bool, ApplicationError> {
        reject_self(caller, target, "block")?;
        let user_id = caller.user_id();

        self.deps
            .roster_repository
            .apply(
                user_id,
                &RosterUpdate::new()
                    .strip(target)
                    .add(RosterSet::Blocked, target),
            )
            .await?;
        self.deps
            .roster_repository
            .apply(target, &RosterUpdate::new().strip(user_id))
            .await?;

        tracing::info!(user_id = %user_id, target_id = %target, "已拉黑用户");
        Ok(true)
    }

    /// 只移除拉黑，不恢复之前的好友关系
    pub async fn unblock_user(
        &self,
        caller: Caller,
        target: UserId,
    ) -> Result<bool, ApplicationError> {
        reject_self(caller, target, "unblock")?;
        let user_id = caller.user_id();

        self.deps
            .roster_repository
            .apply(user_id, &RosterUpdate::new().remove(RosterSet::Blocked, target))
            .await?;

        tracing::info!(user_id = %user_id, target_id = %target, "已取消拉黑");
        Ok(true)
    }
}
