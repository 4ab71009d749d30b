use domain::{Caller, Conversation, ConversationId, PostId, UserId};
use uuid::Uuid;

use super::{reject_self, ChatService};
use crate::error::ApplicationError;

impl ChatService {
    /// 获取或创建与对方的私聊，要求双方互为好友且没有拉黑
    pub async fn ensure_direct(
        &self,
        caller: Caller,
        other: UserId,
    ) -> Result<Conversation, ApplicationError> {
        reject_self(caller, other, "message")?;
        let user_id = caller.user_id();

        if !self.guard.is_mutual_buddy(user_id, other).await? {
            tracing::debug!(user_id = %user_id, target_id = %other, "私聊需要双方互为好友");
            return Err(ApplicationError::Forbidden);
        }
        self.guard.assert_not_blocked(user_id, other).await?;

        let candidate = Conversation::new_direct(
            ConversationId::new(Uuid::new_v4()),
            user_id,
            other,
            self.deps.clock.now(),
        )?;
        let conversation = self
            .deps
            .conversation_repository
            .find_or_create_direct(&candidate)
            .await?;

        if conversation.id == candidate.id {
            tracing::info!(conversation_id = %conversation.id, user_id = %user_id, target_id = %other, "已创建私聊");
        }
        Ok(conversation)
    }

    /// 创建帖子群聊；帖子已有群聊时合并成员后返回
    pub async fn create_room(
        &self,
        caller: Caller,
        post_id: PostId,
        member_ids: Vec<UserId>,
    ) -> Result<Conversation, ApplicationError> {
        let user_id = caller.user_id();
        let candidate = Conversation::new_room(
            ConversationId::new(Uuid::new_v4()),
            post_id,
            user_id,
            member_ids,
            self.deps.clock.now(),
        );

        let conversation = self.deps.conversation_repository.merge_room(&candidate).await?;
        tracing::info!(
            conversation_id = %conversation.id,
            post_id = %post_id,
            members = conversation.member_ids.len(),
            "群聊已就绪"
        );
        Ok(conversation)
    }

    /// 调用者参与的会话，最近有消息的在前
    pub async fn get_my_conversations(
        &self,
        caller: Caller,
    ) -> Result<Vec<Conversation>, ApplicationError> {
        Ok(self
            .deps
            .conversation_repository
            .list_for_member(caller.user_id(), self.deps.settings.conversation_list_limit)
            .await?)
    }
}
