use serde::{Deserialize, Serialize};

use crate::value_objects::{ConversationId, MessageBody, MessageId, Timestamp, UserId};

/// 聊天消息，创建后不可修改。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub body: MessageBody,
    pub created_at: Timestamp,
}

impl Message {
    pub fn new(
        id: MessageId,
        conversation_id: ConversationId,
        sender_id: UserId,
        body: MessageBody,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            conversation_id,
            sender_id,
            body,
            created_at,
        }
    }
}
