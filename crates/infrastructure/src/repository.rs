//! Postgres 仓储实现
//!
//! 每个写方法都是一条语句或一个只涉及单个文档的事务：
//! - 名册更新在一个事务内锁住该用户的 `rosters` 行后再修改集合
//! - 私聊去重依赖 `dm_key` 唯一约束，群聊合并依赖 `post_id` 唯一约束

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    Conversation, ConversationId, ConversationKind, ConversationRepository, Message, MessageBody,
    MessageId, MessageRepository, PostId, Presence, PresenceRepository, Receipt,
    ReceiptRepository, RepositoryError, RepositoryResult, Roster, RosterRepository, RosterSet,
    RosterUpdate, StatusText, Timestamp, UserId,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgConnection, PgPool};
use uuid::Uuid;

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    RepositoryError::storage(err.to_string())
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

fn parse_status_text(value: Option<String>) -> RepositoryResult<Option<StatusText>> {
    StatusText::parse(value).map_err(|err| invalid_data(err.to_string()))
}

/// 转换为 SQL LIMIT 参数
fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[derive(Debug, FromRow)]
struct RosterEntryRecord {
    relation: String,
    counterpart_id: Uuid,
}

async fn load_roster(conn: &mut PgConnection, user_id: UserId) -> RepositoryResult<Option<Roster>> {
    let status: Option<(Option<String>,)> =
        sqlx::query_as("SELECT status_text FROM rosters WHERE user_id = $1")
            .bind(Uuid::from(user_id))
            .fetch_optional(&mut *conn)
            .await
            .map_err(map_sqlx_err)?;
    let Some((status_text,)) = status else {
        return Ok(None);
    };

    let entries = sqlx::query_as::<_, RosterEntryRecord>(
        "SELECT relation, counterpart_id FROM roster_entries WHERE owner_id = $1",
    )
    .bind(Uuid::from(user_id))
    .fetch_all(&mut *conn)
    .await
    .map_err(map_sqlx_err)?;

    let mut update = RosterUpdate::new().set_status_text(parse_status_text(status_text)?);
    for entry in entries {
        let set: RosterSet = entry
            .relation
            .parse()
            .map_err(|err: domain::DomainError| invalid_data(err.to_string()))?;
        update = update.add(set, UserId::from(entry.counterpart_id));
    }

    let mut roster = Roster::empty(user_id);
    roster.apply(&update);
    Ok(Some(roster))
}

#[derive(Clone)]
pub struct PgRosterRepository {
    pool: PgPool,
}

impl PgRosterRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RosterRepository for PgRosterRepository {
    async fn find(&self, user_id: UserId) -> RepositoryResult<Option<Roster>> {
        let mut conn = self.pool.acquire().await.map_err(map_sqlx_err)?;
        load_roster(&mut conn, user_id).await
    }

    async fn apply(&self, user_id: UserId, update: &RosterUpdate) -> RepositoryResult<Roster> {
        let owner = Uuid::from(user_id);
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        sqlx::query("INSERT INTO rosters (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(owner)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;
        // 锁住名册行，同一用户的更新串行执行
        sqlx::query("SELECT user_id FROM rosters WHERE user_id = $1 FOR UPDATE")
            .bind(owner)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;

        for (set, counterpart) in &update.remove {
            sqlx::query(
                "DELETE FROM roster_entries WHERE owner_id = $1 AND relation = $2 AND counterpart_id = $3",
            )
            .bind(owner)
            .bind(set.as_str())
            .bind(Uuid::from(*counterpart))
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;
        }
        for (set, counterpart) in &update.add {
            sqlx::query(
                r#"
                INSERT INTO roster_entries (owner_id, relation, counterpart_id)
                VALUES ($1, $2, $3)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(owner)
            .bind(set.as_str())
            .bind(Uuid::from(*counterpart))
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;
        }
        if let Some(status_text) = &update.status_text {
            sqlx::query("UPDATE rosters SET status_text = $2, updated_at = NOW() WHERE user_id = $1")
                .bind(owner)
                .bind(status_text.as_ref().map(|text| text.as_str()))
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_err)?;
        }

        let roster = load_roster(&mut tx, user_id)
            .await?
            .unwrap_or_else(|| Roster::empty(user_id));
        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(roster)
    }
}

#[derive(Debug, FromRow)]
struct PresenceRecord {
    user_id: Uuid,
    state: String,
    status_text: Option<String>,
    updated_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl TryFrom<PresenceRecord> for Presence {
    type Error = RepositoryError;

    fn try_from(value: PresenceRecord) -> Result<Self, Self::Error> {
        Ok(Presence {
            user_id: UserId::from(value.user_id),
            state: value
                .state
                .parse()
                .map_err(|err: domain::DomainError| invalid_data(err.to_string()))?,
            status_text: parse_status_text(value.status_text)?,
            updated_at: value.updated_at,
            expires_at: value.expires_at,
        })
    }
}

#[derive(Clone)]
pub struct PgPresenceRepository {
    pool: PgPool,
}

impl PgPresenceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PresenceRepository for PgPresenceRepository {
    async fn upsert(&self, presence: &Presence) -> RepositoryResult<Presence> {
        let record = sqlx::query_as::<_, PresenceRecord>(
            r#"
            INSERT INTO presence (user_id, state, status_text, updated_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id) DO UPDATE
            SET state = EXCLUDED.state,
                status_text = EXCLUDED.status_text,
                updated_at = EXCLUDED.updated_at,
                expires_at = EXCLUDED.expires_at
            RETURNING user_id, state, status_text, updated_at, expires_at
            "#,
        )
        .bind(Uuid::from(presence.user_id))
        .bind(presence.state.as_str())
        .bind(presence.status_text.as_ref().map(|text| text.as_str()))
        .bind(presence.updated_at)
        .bind(presence.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Presence::try_from(record)
    }

    async fn find(&self, user_id: UserId) -> RepositoryResult<Option<Presence>> {
        let record = sqlx::query_as::<_, PresenceRecord>(
            "SELECT user_id, state, status_text, updated_at, expires_at FROM presence WHERE user_id = $1",
        )
        .bind(Uuid::from(user_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(Presence::try_from).transpose()
    }

    async fn find_many(&self, user_ids: &[UserId]) -> RepositoryResult<Vec<Presence>> {
        let ids: Vec<Uuid> = user_ids.iter().copied().map(Uuid::from).collect();
        let records = sqlx::query_as::<_, PresenceRecord>(
            "SELECT user_id, state, status_text, updated_at, expires_at FROM presence WHERE user_id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(Presence::try_from).collect()
    }
}

const CONVERSATION_COLUMNS: &str =
    "id, kind, member_ids, post_id, created_by, created_at, last_msg_at";

#[derive(Debug, FromRow)]
struct ConversationRecord {
    id: Uuid,
    kind: String,
    member_ids: Vec<Uuid>,
    post_id: Option<Uuid>,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    last_msg_at: Option<DateTime<Utc>>,
}

impl TryFrom<ConversationRecord> for Conversation {
    type Error = RepositoryError;

    fn try_from(value: ConversationRecord) -> Result<Self, Self::Error> {
        let kind: ConversationKind = value
            .kind
            .parse()
            .map_err(|err: domain::DomainError| invalid_data(err.to_string()))?;
        Ok(Conversation {
            id: ConversationId::from(value.id),
            kind,
            member_ids: value.member_ids.into_iter().map(UserId::from).collect::<BTreeSet<_>>(),
            post_id: value.post_id.map(PostId::from),
            created_by: UserId::from(value.created_by),
            created_at: value.created_at,
            last_msg_at: value.last_msg_at,
        })
    }
}

fn member_uuids(conversation: &Conversation) -> Vec<Uuid> {
    conversation.member_ids.iter().copied().map(Uuid::from).collect()
}

#[derive(Clone)]
pub struct PgConversationRepository {
    pool: PgPool,
}

impl PgConversationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationRepository for PgConversationRepository {
    async fn find_by_id(&self, id: ConversationId) -> RepositoryResult<Option<Conversation>> {
        let record = sqlx::query_as::<_, ConversationRecord>(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1"
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(Conversation::try_from).transpose()
    }

    async fn find_or_create_direct(
        &self,
        candidate: &Conversation,
    ) -> RepositoryResult<Conversation> {
        let dm_key = candidate
            .direct_key()
            .ok_or_else(|| invalid_data("direct conversation requires exactly two members"))?;

        // 并发插入时只有一条成功，其余语句等待并跳过，随后读到同一条记录
        sqlx::query(
            r#"
            INSERT INTO conversations (id, kind, member_ids, post_id, dm_key, created_by, created_at, last_msg_at)
            VALUES ($1, 'dm', $2, NULL, $3, $4, $5, NULL)
            ON CONFLICT (dm_key) DO NOTHING
            "#,
        )
        .bind(Uuid::from(candidate.id))
        .bind(member_uuids(candidate))
        .bind(&dm_key)
        .bind(Uuid::from(candidate.created_by))
        .bind(candidate.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let record = sqlx::query_as::<_, ConversationRecord>(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE dm_key = $1"
        ))
        .bind(&dm_key)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Conversation::try_from(record)
    }

    async fn merge_room(&self, candidate: &Conversation) -> RepositoryResult<Conversation> {
        let post_id = candidate
            .post_id
            .ok_or_else(|| invalid_data("room requires a post id"))?;

        let record = sqlx::query_as::<_, ConversationRecord>(&format!(
            r#"
            INSERT INTO conversations (id, kind, member_ids, post_id, dm_key, created_by, created_at, last_msg_at)
            VALUES ($1, 'room', $2, $3, NULL, $4, $5, NULL)
            ON CONFLICT (post_id) DO UPDATE
            SET member_ids = ARRAY(
                SELECT DISTINCT member
                FROM UNNEST(conversations.member_ids || EXCLUDED.member_ids) AS member
                ORDER BY member
            )
            RETURNING {CONVERSATION_COLUMNS}
            "#
        ))
        .bind(Uuid::from(candidate.id))
        .bind(member_uuids(candidate))
        .bind(Uuid::from(post_id))
        .bind(Uuid::from(candidate.created_by))
        .bind(candidate.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Conversation::try_from(record)
    }

    async fn touch_last_message(&self, id: ConversationId, at: Timestamp) -> RepositoryResult<()> {
        let result = sqlx::query("UPDATE conversations SET last_msg_at = $2 WHERE id = $1")
            .bind(Uuid::from(id))
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn list_for_member(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> RepositoryResult<Vec<Conversation>> {
        let records = sqlx::query_as::<_, ConversationRecord>(&format!(
            r#"
            SELECT {CONVERSATION_COLUMNS}
            FROM conversations
            WHERE member_ids @> ARRAY[$1]::uuid[]
            ORDER BY last_msg_at DESC NULLS LAST, created_at DESC
            LIMIT $2
            "#
        ))
        .bind(Uuid::from(user_id))
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(Conversation::try_from).collect()
    }
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: Uuid,
    conversation_id: Uuid,
    sender_id: Uuid,
    body: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRecord> for Message {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        let body = MessageBody::parse(value.body).map_err(|err| invalid_data(err.to_string()))?;
        Ok(Message::new(
            MessageId::from(value.id),
            ConversationId::from(value.conversation_id),
            UserId::from(value.sender_id),
            body,
            value.created_at,
        ))
    }
}

/// 转义 LIKE 模式中的通配符
fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for ch in query.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

#[derive(Clone)]
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn create(&self, message: &Message) -> RepositoryResult<Message> {
        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            INSERT INTO messages (id, conversation_id, sender_id, body, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, conversation_id, sender_id, body, created_at
            "#,
        )
        .bind(Uuid::from(message.id))
        .bind(Uuid::from(message.conversation_id))
        .bind(Uuid::from(message.sender_id))
        .bind(message.body.as_str())
        .bind(message.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::Conflict,
            _ => map_sqlx_err(err),
        })?;

        Message::try_from(record)
    }

    async fn find_by_id(&self, id: MessageId) -> RepositoryResult<Option<Message>> {
        let record = sqlx::query_as::<_, MessageRecord>(
            "SELECT id, conversation_id, sender_id, body, created_at FROM messages WHERE id = $1",
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(Message::try_from).transpose()
    }

    async fn list(
        &self,
        conversation_id: ConversationId,
        after: Option<Timestamp>,
        limit: usize,
    ) -> RepositoryResult<Vec<Message>> {
        let records = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT id, conversation_id, sender_id, body, created_at
            FROM messages
            WHERE conversation_id = $1
              AND ($2::timestamptz IS NULL OR created_at > $2)
            ORDER BY created_at ASC, seq ASC
            LIMIT $3
            "#,
        )
        .bind(Uuid::from(conversation_id))
        .bind(after)
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(Message::try_from).collect()
    }

    async fn search(
        &self,
        conversation_ids: &[ConversationId],
        query: &str,
        limit: usize,
    ) -> RepositoryResult<Vec<Message>> {
        let ids: Vec<Uuid> = conversation_ids.iter().copied().map(Uuid::from).collect();
        let records = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT id, conversation_id, sender_id, body, created_at
            FROM messages
            WHERE conversation_id = ANY($1)
              AND body ILIKE $2 ESCAPE '\'
            ORDER BY created_at DESC, seq DESC
            LIMIT $3
            "#,
        )
        .bind(ids)
        .bind(like_pattern(query))
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(Message::try_from).collect()
    }
}

#[derive(Debug, FromRow)]
struct ReceiptRecord {
    conversation_id: Uuid,
    user_id: Uuid,
    last_seen_message_id: Uuid,
    last_seen_at: DateTime<Utc>,
}

impl From<ReceiptRecord> for Receipt {
    fn from(value: ReceiptRecord) -> Self {
        Receipt {
            conversation_id: ConversationId::from(value.conversation_id),
            user_id: UserId::from(value.user_id),
            last_seen_message_id: MessageId::from(value.last_seen_message_id),
            last_seen_at: value.last_seen_at,
        }
    }
}

#[derive(Clone)]
pub struct PgReceiptRepository {
    pool: PgPool,
}

impl PgReceiptRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReceiptRepository for PgReceiptRepository {
    async fn upsert(&self, receipt: &Receipt) -> RepositoryResult<Receipt> {
        let record = sqlx::query_as::<_, ReceiptRecord>(
            r#"
            INSERT INTO receipts (conversation_id, user_id, last_seen_message_id, last_seen_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (conversation_id, user_id) DO UPDATE
            SET last_seen_message_id = EXCLUDED.last_seen_message_id,
                last_seen_at = EXCLUDED.last_seen_at
            RETURNING conversation_id, user_id, last_seen_message_id, last_seen_at
            "#,
        )
        .bind(Uuid::from(receipt.conversation_id))
        .bind(Uuid::from(receipt.user_id))
        .bind(Uuid::from(receipt.last_seen_message_id))
        .bind(receipt.last_seen_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(Receipt::from(record))
    }

    async fn list(&self, conversation_id: ConversationId) -> RepositoryResult<Vec<Receipt>> {
        let records = sqlx::query_as::<_, ReceiptRecord>(
            r#"
            SELECT conversation_id, user_id, last_seen_message_id, last_seen_at
            FROM receipts
            WHERE conversation_id = $1
            ORDER BY user_id
            "#,
        )
        .bind(Uuid::from(conversation_id))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(records.into_iter().map(Receipt::from).collect())
    }
}

#[derive(Clone)]
pub struct PgStorage {
    pub pool: PgPool,
    pub roster_repository: Arc<PgRosterRepository>,
    pub presence_repository: Arc<PgPresenceRepository>,
    pub conversation_repository: Arc<PgConversationRepository>,
    pub message_repository: Arc<PgMessageRepository>,
    pub receipt_repository: Arc<PgReceiptRepository>,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self {
            roster_repository: Arc::new(PgRosterRepository::new(pool.clone())),
            presence_repository: Arc::new(PgPresenceRepository::new(pool.clone())),
            conversation_repository: Arc::new(PgConversationRepository::new(pool.clone())),
            message_repository: Arc::new(PgMessageRepository::new(pool.clone())),
            receipt_repository: Arc::new(PgReceiptRepository::new(pool.clone())),
            pool,
        }
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("pizza"), "%pizza%");
    }

    #[test]
    fn oversized_limit_is_clamped() {
        assert_eq!(sql_limit(usize::MAX), i64::MAX);
        assert_eq!(sql_limit(200), 200);
    }
}
