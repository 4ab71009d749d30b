use serde::{Deserialize, Serialize};

use crate::value_objects::{ConversationId, MessageId, Timestamp, UserId};

/// 每个 (会话, 用户) 一条的已读回执。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub conversation_id: ConversationId,
    pub user_id: UserId,
    pub last_seen_message_id: MessageId,
    pub last_seen_at: Timestamp,
}
