//! Repository接口定义
//!
//! 定义存储层需要实现的抽象接口。每个写方法都对应一次单文档（单键）原子操作，
//! 上层不会在多个方法调用之间依赖事务。

use async_trait::async_trait;

use crate::entities::{Conversation, Message, Presence, Receipt, Roster, RosterUpdate};
use crate::errors::RepositoryResult;
use crate::value_objects::{ConversationId, MessageId, Timestamp, UserId};

/// 好友名册Repository接口
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait RosterRepository: Send + Sync {
    /// 读取名册，从未写入过时返回 `None`
    async fn find(&self, user_id: UserId) -> RepositoryResult<Option<Roster>>;

    /// 对单份名册原子地应用一次更新，名册不存在时先创建，返回更新后的名册
    async fn apply(&self, user_id: UserId, update: &RosterUpdate) -> RepositoryResult<Roster>;
}

/// 在线状态Repository接口
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait PresenceRepository: Send + Sync {
    /// 按用户整体覆盖写入
    async fn upsert(&self, presence: &Presence) -> RepositoryResult<Presence>;

    /// 返回存储的原始记录，过期判定由调用方负责
    async fn find(&self, user_id: UserId) -> RepositoryResult<Option<Presence>>;

    async fn find_many(&self, user_ids: &[UserId]) -> RepositoryResult<Vec<Presence>>;
}

/// 会话Repository接口
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn find_by_id(&self, id: ConversationId) -> RepositoryResult<Option<Conversation>>;

    /// 按无序成员对查找私聊，不存在时插入候选记录；并发调用必须返回同一条记录
    async fn find_or_create_direct(&self, candidate: &Conversation)
        -> RepositoryResult<Conversation>;

    /// 按帖子合并群聊：已存在时成员取并集，否则插入候选记录
    async fn merge_room(&self, candidate: &Conversation) -> RepositoryResult<Conversation>;

    /// 记录最近一条消息的时间
    async fn touch_last_message(&self, id: ConversationId, at: Timestamp) -> RepositoryResult<()>;

    /// 用户参与的会话，按最近消息时间倒序
    async fn list_for_member(&self, user_id: UserId, limit: usize)
        -> RepositoryResult<Vec<Conversation>>;
}

/// 消息Repository接口
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// 追加消息，同一会话内按创建时间、再按插入顺序排序
    async fn create(&self, message: &Message) -> RepositoryResult<Message>;

    async fn find_by_id(&self, id: MessageId) -> RepositoryResult<Option<Message>>;

    /// 会话历史，升序；给定 `after` 时只返回严格晚于它的消息
    async fn list(
        &self,
        conversation_id: ConversationId,
        after: Option<Timestamp>,
        limit: usize,
    ) -> RepositoryResult<Vec<Message>>;

    /// 在给定会话内做不区分大小写的子串搜索，最新的在前
    async fn search(
        &self,
        conversation_ids: &[ConversationId],
        query: &str,
        limit: usize,
    ) -> RepositoryResult<Vec<Message>>;
}

/// 已读回执Repository接口
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait ReceiptRepository: Send + Sync {
    /// 按 (会话, 用户) 覆盖写入
    async fn upsert(&self, receipt: &Receipt) -> RepositoryResult<Receipt>;

    async fn list(&self, conversation_id: ConversationId) -> RepositoryResult<Vec<Receipt>>;
}
