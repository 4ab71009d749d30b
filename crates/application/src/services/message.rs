use domain::{Caller, ChatEvent, ConversationId, Message, MessageBody, MessageId, Timestamp};
use uuid::Uuid;

use super::{effective_limit, ChatService};
use crate::error::ApplicationError;

impl ChatService {
    /// 发送消息。
    ///
    /// 检查顺序：正文 -> 频率 -> 成员资格 -> 与每个其他成员之间的拉黑关系，全部通过后才写入。
    pub async fn send(
        &self,
        caller: Caller,
        conversation_id: ConversationId,
        body: &str,
    ) -> Result<Message, ApplicationError> {
        let user_id = caller.user_id();
        let body = MessageBody::parse(body)?;

        self.guard.guard_rate_limit(user_id).await?;

        let conversation = self.member_conversation(caller, conversation_id).await?;
        self.guard
            .assert_not_blocked_with_any(user_id, conversation.other_members(user_id))
            .await?;

        let message = Message::new(
            MessageId::new(Uuid::new_v4()),
            conversation_id,
            user_id,
            body,
            self.deps.clock.now(),
        );
        let stored = self.deps.message_repository.create(&message).await?;
        self.deps
            .conversation_repository
            .touch_last_message(conversation_id, stored.created_at)
            .await?;

        tracing::info!(
            conversation_id = %conversation_id,
            message_id = %stored.id,
            user_id = %user_id,
            "消息已保存"
        );

        self.fanout
            .publish_to_conversation(conversation_id, ChatEvent::MessageAdded(stored.clone()))
            .await;
        Ok(stored)
    }

    /// 会话历史，升序
    pub async fn get_messages(
        &self,
        caller: Caller,
        conversation_id: ConversationId,
        after: Option<Timestamp>,
        limit: Option<usize>,
    ) -> Result<Vec<Message>, ApplicationError> {
        self.member_conversation(caller, conversation_id).await?;
        let settings = &self.deps.settings;
        let limit = effective_limit(limit, settings.history_default_limit, settings.history_max_limit);

        Ok(self
            .deps
            .message_repository
            .list(conversation_id, after, limit)
            .await?)
    }

    /// 在调用者参与的会话里搜索消息，空白查询直接返回空
    pub async fn search_messages(
        &self,
        caller: Caller,
        query: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Message>, ApplicationError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let conversation_ids: Vec<ConversationId> = self
            .deps
            .conversation_repository
            .list_for_member(caller.user_id(), usize::MAX)
            .await?
            .into_iter()
            .map(|conversation| conversation.id)
            .collect();
        if conversation_ids.is_empty() {
            return Ok(Vec::new());
        }

        let settings = &self.deps.settings;
        let limit = effective_limit(limit, settings.history_default_limit, settings.search_max_limit);
        Ok(self
            .deps
            .message_repository
            .search(&conversation_ids, query, limit)
            .await?)
    }
}
