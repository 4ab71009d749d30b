//! 聊天用例服务
//!
//! `ChatService` 是所有操作的入口，每个操作的第一个参数都是已认证的 [`Caller`]。
//! 按功能拆分在子模块里：名册、在线状态、会话、消息、输入与回执。

mod activity;
mod conversation;
mod message;
mod presence;
mod roster;

use std::sync::Arc;

use domain::{
    Caller, Conversation, ConversationId, ConversationRepository, MessageRepository,
    PresenceRepository, ReceiptRepository, RosterRepository, UserId,
};

use crate::{
    broadcaster::EventPublisher, clock::Clock, error::ApplicationError, fanout::FanoutFilter,
    guard::AuthorizationGuard, memory::MemoryStore, rate_limiter::SendRateLimiter,
};

pub use presence::BuddyEntry;

/// 业务参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSettings {
    pub presence_ttl: chrono::Duration,
    pub typing_window: chrono::Duration,
    pub history_default_limit: usize,
    pub history_max_limit: usize,
    pub conversation_list_limit: usize,
    pub search_max_limit: usize,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            presence_ttl: chrono::Duration::minutes(2),
            typing_window: chrono::Duration::seconds(5),
            history_default_limit: 50,
            history_max_limit: 200,
            conversation_list_limit: 200,
            search_max_limit: 200,
        }
    }
}

impl From<&config::ChatConfig> for ChatSettings {
    fn from(value: &config::ChatConfig) -> Self {
        Self {
            presence_ttl: chrono::Duration::seconds(value.presence_ttl_secs as i64),
            typing_window: chrono::Duration::seconds(value.typing_window_secs as i64),
            history_default_limit: value.history_default_limit,
            history_max_limit: value.history_max_limit,
            conversation_list_limit: value.conversation_list_limit,
            search_max_limit: value.search_max_limit,
        }
    }
}

pub struct ChatServiceDependencies {
    pub roster_repository: Arc<dyn RosterRepository>,
    pub presence_repository: Arc<dyn PresenceRepository>,
    pub conversation_repository: Arc<dyn ConversationRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub receipt_repository: Arc<dyn ReceiptRepository>,
    pub rate_limiter: Arc<dyn SendRateLimiter>,
    pub clock: Arc<dyn Clock>,
    pub publisher: Arc<dyn EventPublisher>,
    pub settings: ChatSettings,
}

impl ChatServiceDependencies {
    /// 所有仓储都由同一个内存存储提供
    pub fn in_memory(
        store: Arc<MemoryStore>,
        rate_limiter: Arc<dyn SendRateLimiter>,
        clock: Arc<dyn Clock>,
        publisher: Arc<dyn EventPublisher>,
        settings: ChatSettings,
    ) -> Self {
        Self {
            roster_repository: store.clone(),
            presence_repository: store.clone(),
            conversation_repository: store.clone(),
            message_repository: store.clone(),
            receipt_repository: store,
            rate_limiter,
            clock,
            publisher,
            settings,
        }
    }
}

pub struct ChatService {
    deps: ChatServiceDependencies,
    guard: AuthorizationGuard,
    fanout: FanoutFilter,
}

impl ChatService {
    pub fn new(deps: ChatServiceDependencies) -> Self {
        let guard = AuthorizationGuard::new(deps.roster_repository.clone(), deps.rate_limiter.clone());
        let fanout = FanoutFilter::new(
            deps.roster_repository.clone(),
            deps.conversation_repository.clone(),
            deps.publisher.clone(),
        );
        Self { deps, guard, fanout }
    }

    pub fn guard(&self) -> &AuthorizationGuard {
        &self.guard
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.deps.settings
    }

    /// 读取调用者所在的会话；不存在和非成员都返回 `Forbidden`
    async fn member_conversation(
        &self,
        caller: Caller,
        conversation_id: ConversationId,
    ) -> Result<Conversation, ApplicationError> {
        let user_id = caller.user_id();
        match self
            .deps
            .conversation_repository
            .find_by_id(conversation_id)
            .await?
        {
            Some(conversation) if conversation.is_member(user_id) => Ok(conversation),
            Some(_) => {
                tracing::debug!(user_id = %user_id, conversation_id = %conversation_id, "调用者不是会话成员");
                Err(ApplicationError::Forbidden)
            }
            None => {
                tracing::debug!(user_id = %user_id, conversation_id = %conversation_id, "会话不存在");
                Err(ApplicationError::Forbidden)
            }
        }
    }
}

/// 不允许以自己为目标的操作
fn reject_self(caller: Caller, target: UserId, action: &str) -> Result<(), ApplicationError> {
    if caller.user_id() == target {
        return Err(ApplicationError::invalid_input(format!("cannot {action} yourself")));
    }
    Ok(())
}

/// 未指定或为 0 时取默认值，超过上限时截断
fn effective_limit(requested: Option<usize>, default: usize, max: usize) -> usize {
    requested
        .filter(|limit| *limit > 0)
        .unwrap_or(default)
        .min(max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_falls_back_to_default_and_is_capped() {
        assert_eq!(effective_limit(None, 50, 200), 50);
        assert_eq!(effective_limit(Some(0), 50, 200), 50);
        assert_eq!(effective_limit(Some(10), 50, 200), 10);
        assert_eq!(effective_limit(Some(1000), 50, 200), 200);
    }

    #[test]
    fn settings_follow_chat_config() {
        let config = config::AppConfig::default();
        assert_eq!(ChatSettings::from(&config.chat), ChatSettings::default());
    }
}
