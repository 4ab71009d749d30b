//! 推送过滤
//!
//! 在发布时刻根据最新状态计算允许查看者集合并附加到事件上：
//! - 在线状态：本人 ∪ 本人当前的好友，去掉本人拉黑的用户
//! - 消息 / 输入 / 回执：会话当前成员
//!
//! 写入已经提交后发布失败只记录日志，不影响操作结果。

use std::collections::BTreeSet;
use std::sync::Arc;

use domain::{
    ChatEvent, ConversationId, ConversationRepository, FanoutEvent, Presence, RosterRepository,
    UserId,
};

use crate::broadcaster::EventPublisher;
use crate::error::ApplicationError;

pub struct FanoutFilter {
    rosters: Arc<dyn RosterRepository>,
    conversations: Arc<dyn ConversationRepository>,
    publisher: Arc<dyn EventPublisher>,
}

impl FanoutFilter {
    pub fn new(
        rosters: Arc<dyn RosterRepository>,
        conversations: Arc<dyn ConversationRepository>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            rosters,
            conversations,
            publisher,
        }
    }

    pub async fn presence_viewers(&self, subject: UserId) -> Result<BTreeSet<UserId>, ApplicationError> {
        let mut viewers = BTreeSet::from([subject]);
        if let Some(roster) = self.rosters.find(subject).await? {
            viewers.extend(roster.buddies.difference(&roster.blocked).copied());
        }
        Ok(viewers)
    }

    /// 会话不存在时返回空集合
    pub async fn conversation_viewers(
        &self,
        conversation_id: ConversationId,
    ) -> Result<BTreeSet<UserId>, ApplicationError> {
        Ok(self
            .conversations
            .find_by_id(conversation_id)
            .await?
            .map(|conversation| conversation.member_ids)
            .unwrap_or_default())
    }

    pub async fn publish_presence(&self, presence: &Presence) {
        let subject = presence.user_id;
        match self.presence_viewers(subject).await {
            Ok(viewers) => {
                self.publish(FanoutEvent::new(ChatEvent::PresenceUpdated(presence.clone()), viewers))
                    .await
            }
            Err(err) => {
                tracing::warn!(user_id = %subject, error = %err, "计算在线状态可见集合失败，跳过推送");
            }
        }
    }

    /// 推送会话内事件（消息、输入、回执）给当前成员
    pub async fn publish_to_conversation(&self, conversation_id: ConversationId, event: ChatEvent) {
        match self.conversation_viewers(conversation_id).await {
            Ok(viewers) if viewers.is_empty() => {
                tracing::debug!(conversation_id = %conversation_id, "会话没有成员，跳过推送");
            }
            Ok(viewers) => self.publish(FanoutEvent::new(event, viewers)).await,
            Err(err) => {
                tracing::warn!(
                    conversation_id = %conversation_id,
                    error = %err,
                    "读取会话成员失败，跳过推送"
                );
            }
        }
    }

    async fn publish(&self, event: FanoutEvent) {
        let topic = event.topic();
        let viewers = event.allowed_user_ids.len();
        if let Err(err) = self.publisher.publish(event).await {
            tracing::error!(topic = %topic, error = %err, "写入已提交，但事件发布失败");
        } else {
            tracing::debug!(topic = %topic, viewers, "事件已发布");
        }
    }
}
