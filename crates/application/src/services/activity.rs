//! 输入状态与已读回执

use domain::{Caller, ChatEvent, ConversationId, MessageId, Receipt, TypingUpdate};

use super::ChatService;
use crate::error::ApplicationError;

impl ChatService {
    /// 推送输入状态，不落库；接收方在 `until` 之后自行清除提示
    pub async fn set_typing(
        &self,
        caller: Caller,
        conversation_id: ConversationId,
        is_typing: bool,
    ) -> Result<bool, ApplicationError> {
        self.member_conversation(caller, conversation_id).await?;

        let update = TypingUpdate {
            conversation_id,
            user_id: caller.user_id(),
            is_typing,
            until: self.deps.clock.now() + self.deps.settings.typing_window,
        };
        self.fanout
            .publish_to_conversation(conversation_id, ChatEvent::TypingUpdated(update))
            .await;
        Ok(true)
    }

    /// 记录已读位置。较旧的消息 ID 同样接受，以最后一次写入为准
    pub async fn mark_read(
        &self,
        caller: Caller,
        conversation_id: ConversationId,
        last_seen_message_id: MessageId,
    ) -> Result<Receipt, ApplicationError> {
        let user_id = caller.user_id();
        self.member_conversation(caller, conversation_id).await?;

        let belongs = self
            .deps
            .message_repository
            .find_by_id(last_seen_message_id)
            .await?
            .is_some_and(|message| message.conversation_id == conversation_id);
        if !belongs {
            return Err(ApplicationError::invalid_input(
                "last_seen_message_id does not belong to this conversation",
            ));
        }

        let receipt = Receipt {
            conversation_id,
            user_id,
            last_seen_message_id,
            last_seen_at: self.deps.clock.now(),
        };
        let stored = self.deps.receipt_repository.upsert(&receipt).await?;

        tracing::debug!(
            conversation_id = %conversation_id,
            user_id = %user_id,
            message_id = %last_seen_message_id,
            "已读位置已更新"
        );
        self.fanout
            .publish_to_conversation(conversation_id, ChatEvent::ReceiptUpdated(stored.clone()))
            .await;
        Ok(stored)
    }

    pub async fn get_receipts(
        &self,
        caller: Caller,
        conversation_id: ConversationId,
    ) -> Result<Vec<Receipt>, ApplicationError> {
        self.member_conversation(caller, conversation_id).await?;
        Ok(self.deps.receipt_repository.list(conversation_id).await?)
    }
}
