//! 内存文档存储
//!
//! 实现全部仓储接口，每个集合一把 `tokio::sync::RwLock`，每个接口方法在一次加锁内完成，
//! 即一次单文档原子更新。用于单实例部署和测试。

use std::collections::HashMap;

use async_trait::async_trait;
use domain::{
    Conversation, ConversationId, ConversationKind, ConversationRepository, Message, MessageId,
    MessageRepository, PostId, Presence, PresenceRepository, Receipt, ReceiptRepository,
    RepositoryError, RepositoryResult, Roster, RosterRepository, RosterUpdate, Timestamp, UserId,
};
use tokio::sync::RwLock;

#[derive(Default)]
struct ConversationTable {
    by_id: HashMap<ConversationId, Conversation>,
    direct_index: HashMap<String, ConversationId>,
    room_index: HashMap<PostId, ConversationId>,
}

#[derive(Default)]
struct MessageLog {
    by_id: HashMap<MessageId, Message>,
    by_conversation: HashMap<ConversationId, Vec<MessageId>>,
    // 全局插入序号，时间戳相同时用来排序，与 Postgres 的 seq 列一致
    seq: HashMap<MessageId, u64>,
    next_seq: u64,
}

impl MessageLog {
    fn sort_key(&self, message: &Message) -> (Timestamp, u64) {
        (
            message.created_at,
            self.seq.get(&message.id).copied().unwrap_or_default(),
        )
    }

    fn ordered(&self, conversation_id: ConversationId) -> Vec<&Message> {
        let mut messages: Vec<&Message> = self
            .by_conversation
            .get(&conversation_id)
            .map(|ids| ids.iter().filter_map(|id| self.by_id.get(id)).collect())
            .unwrap_or_default();
        messages.sort_by_key(|message| self.sort_key(message));
        messages
    }
}

#[derive(Default)]
pub struct MemoryStore {
    rosters: RwLock<HashMap<UserId, Roster>>,
    presence: RwLock<HashMap<UserId, Presence>>,
    conversations: RwLock<ConversationTable>,
    messages: RwLock<MessageLog>,
    receipts: RwLock<HashMap<(ConversationId, UserId), Receipt>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RosterRepository for MemoryStore {
    async fn find(&self, user_id: UserId) -> RepositoryResult<Option<Roster>> {
        Ok(self.rosters.read().await.get(&user_id).cloned())
    }

    async fn apply(&self, user_id: UserId, update: &RosterUpdate) -> RepositoryResult<Roster> {
        let mut rosters = self.rosters.write().await;
        let roster = rosters
            .entry(user_id)
            .or_insert_with(|| Roster::empty(user_id));
        roster.apply(update);
        Ok(roster.clone())
    }
}

#[async_trait]
impl PresenceRepository for MemoryStore {
    async fn upsert(&self, presence: &Presence) -> RepositoryResult<Presence> {
        self.presence
            .write()
            .await
            .insert(presence.user_id, presence.clone());
        Ok(presence.clone())
    }

    async fn find(&self, user_id: UserId) -> RepositoryResult<Option<Presence>> {
        Ok(self.presence.read().await.get(&user_id).cloned())
    }

    async fn find_many(&self, user_ids: &[UserId]) -> RepositoryResult<Vec<Presence>> {
        let presence = self.presence.read().await;
        Ok(user_ids
            .iter()
            .filter_map(|user_id| presence.get(user_id).cloned())
            .collect())
    }
}

#[async_trait]
impl ConversationRepository for MemoryStore {
    async fn find_by_id(&self, id: ConversationId) -> RepositoryResult<Option<Conversation>> {
        Ok(self.conversations.read().await.by_id.get(&id).cloned())
    }

    async fn find_or_create_direct(
        &self,
        candidate: &Conversation,
    ) -> RepositoryResult<Conversation> {
        let key = candidate.direct_key().ok_or_else(|| {
            RepositoryError::storage("direct conversation requires exactly two members")
        })?;
        let mut table = self.conversations.write().await;
        if let Some(existing) = table
            .direct_index
            .get(&key)
            .and_then(|id| table.by_id.get(id))
        {
            return Ok(existing.clone());
        }
        if table.by_id.contains_key(&candidate.id) {
            return Err(RepositoryError::Conflict);
        }
        table.direct_index.insert(key, candidate.id);
        table.by_id.insert(candidate.id, candidate.clone());
        Ok(candidate.clone())
    }

    async fn merge_room(&self, candidate: &Conversation) -> RepositoryResult<Conversation> {
        let post_id = match (candidate.kind, candidate.post_id) {
            (ConversationKind::Room, Some(post_id)) => post_id,
            _ => return Err(RepositoryError::storage("room requires a post id")),
        };
        let mut table = self.conversations.write().await;
        if let Some(id) = table.room_index.get(&post_id).copied() {
            if let Some(existing) = table.by_id.get_mut(&id) {
                existing.merge_members(candidate.member_ids.iter().copied());
                return Ok(existing.clone());
            }
        }
        if table.by_id.contains_key(&candidate.id) {
            return Err(RepositoryError::Conflict);
        }
        table.room_index.insert(post_id, candidate.id);
        table.by_id.insert(candidate.id, candidate.clone());
        Ok(candidate.clone())
    }

    async fn touch_last_message(&self, id: ConversationId, at: Timestamp) -> RepositoryResult<()> {
        let mut table = self.conversations.write().await;
        let conversation = table.by_id.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        conversation.last_msg_at = Some(at);
        Ok(())
    }

    async fn list_for_member(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> RepositoryResult<Vec<Conversation>> {
        let table = self.conversations.read().await;
        let mut conversations: Vec<Conversation> = table
            .by_id
            .values()
            .filter(|conversation| conversation.is_member(user_id))
            .cloned()
            .collect();
        conversations.sort_by(|a, b| {
            b.last_msg_at
                .cmp(&a.last_msg_at)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        conversations.truncate(limit);
        Ok(conversations)
    }
}

#[async_trait]
impl MessageRepository for MemoryStore {
    async fn create(&self, message: &Message) -> RepositoryResult<Message> {
        let mut log = self.messages.write().await;
        if log.by_id.contains_key(&message.id) {
            return Err(RepositoryError::Conflict);
        }
        log.next_seq += 1;
        let seq = log.next_seq;
        log.seq.insert(message.id, seq);
        log.by_id.insert(message.id, message.clone());
        log.by_conversation
            .entry(message.conversation_id)
            .or_default()
            .push(message.id);
        Ok(message.clone())
    }

    async fn find_by_id(&self, id: MessageId) -> RepositoryResult<Option<Message>> {
        Ok(self.messages.read().await.by_id.get(&id).cloned())
    }

    async fn list(
        &self,
        conversation_id: ConversationId,
        after: Option<Timestamp>,
        limit: usize,
    ) -> RepositoryResult<Vec<Message>> {
        let log = self.messages.read().await;
        Ok(log
            .ordered(conversation_id)
            .into_iter()
            .filter(|message| after.map_or(true, |after| message.created_at > after))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn search(
        &self,
        conversation_ids: &[ConversationId],
        query: &str,
        limit: usize,
    ) -> RepositoryResult<Vec<Message>> {
        let needle = query.to_lowercase();
        let log = self.messages.read().await;
        let mut hits: Vec<&Message> = conversation_ids
            .iter()
            .flat_map(|conversation_id| log.ordered(*conversation_id))
            .filter(|message| message.body.as_str().to_lowercase().contains(&needle))
            .collect();
        // 最新的在前，时间戳相同时后写入的在前
        hits.sort_by_key(|message| std::cmp::Reverse(log.sort_key(message)));
        Ok(hits.into_iter().take(limit).cloned().collect())
    }
}

#[async_trait]
impl ReceiptRepository for MemoryStore {
    async fn upsert(&self, receipt: &Receipt) -> RepositoryResult<Receipt> {
        self.receipts
            .write()
            .await
            .insert((receipt.conversation_id, receipt.user_id), receipt.clone());
        Ok(receipt.clone())
    }

    async fn list(&self, conversation_id: ConversationId) -> RepositoryResult<Vec<Receipt>> {
        let receipts = self.receipts.read().await;
        let mut found: Vec<Receipt> = receipts
            .values()
            .filter(|receipt| receipt.conversation_id == conversation_id)
            .cloned()
            .collect();
        found.sort_by_key(|receipt| receipt.user_id);
        Ok(found)
    }
}
