//! 会话实体
//!
//! `Dm` 为两人私聊，每对用户最多一个；`Room` 锚定在帖子上，每个帖子最多一个。

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, DomainResult};
use crate::value_objects::{ConversationId, PostId, Timestamp, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    Dm,
    Room,
}

impl ConversationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationKind::Dm => "dm",
            ConversationKind::Room => "room",
        }
    }
}

impl fmt::Display for ConversationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConversationKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dm" => Ok(ConversationKind::Dm),
            "room" => Ok(ConversationKind::Room),
            other => Err(DomainError::invalid_argument(
                "kind",
                format!("unknown conversation kind {other}"),
            )),
        }
    }
}

/// 私聊去重键：与成员顺序无关。
pub fn direct_key(a: UserId, b: UserId) -> String {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    format!("{low}:{high}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub kind: ConversationKind,
    pub member_ids: BTreeSet<UserId>,
    pub post_id: Option<PostId>,
    pub created_by: UserId,
    pub created_at: Timestamp,
    pub last_msg_at: Option<Timestamp>,
}

impl Conversation {
    pub fn new_direct(
        id: ConversationId,
        creator: UserId,
        other: UserId,
        now: Timestamp,
    ) -> DomainResult<Self> {
        if creator == other {
            return Err(DomainError::SelfTarget);
        }
        Ok(Self {
            id,
            kind: ConversationKind::Dm,
            member_ids: BTreeSet::from([creator, other]),
            post_id: None,
            created_by: creator,
            created_at: now,
            last_msg_at: None,
        })
    }

    /// 创建者总是成员之一。
    pub fn new_room(
        id: ConversationId,
        post_id: PostId,
        creator: UserId,
        members: impl IntoIterator<Item = UserId>,
        now: Timestamp,
    ) -> Self {
        let mut member_ids: BTreeSet<UserId> = members.into_iter().collect();
        member_ids.insert(creator);
        Self {
            id,
            kind: ConversationKind::Room,
            member_ids,
            post_id: Some(post_id),
            created_by: creator,
            created_at: now,
            last_msg_at: None,
        }
    }

    pub fn is_member(&self, user_id: UserId) -> bool {
        self.member_ids.contains(&user_id)
    }

    pub fn other_members(&self, user_id: UserId) -> impl Iterator<Item = UserId> + '_ {
        self.member_ids
            .iter()
            .copied()
            .filter(move |member| *member != user_id)
    }

    pub fn direct_key(&self) -> Option<String> {
        if self.kind != ConversationKind::Dm {
            return None;
        }
        let mut members = self.member_ids.iter().copied();
        match (members.next(), members.next()) {
            (Some(a), Some(b)) => Some(direct_key(a, b)),
            _ => None,
        }
    }

    /// 集合并集合并成员，返回新增成员数。
    pub fn merge_members(&mut self, members: impl IntoIterator<Item = UserId>) -> usize {
        let before = self.member_ids.len();
        self.member_ids.extend(members);
        self.member_ids.len() - before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn user() -> UserId {
        UserId::from(Uuid::new_v4())
    }

    #[test]
    fn direct_key_ignores_member_order() {
        let a = user();
        let b = user();
        assert_eq!(direct_key(a, b), direct_key(b, a));
    }

    #[test]
    fn direct_conversation_with_self_is_rejected() {
        let a = user();
        let err = Conversation::new_direct(ConversationId::from(Uuid::new_v4()), a, a, Utc::now())
            .unwrap_err();
        assert_eq!(err, DomainError::SelfTarget);
    }

    #[test]
    fn room_always_contains_creator_and_merges_by_union() {
        let creator = user();
        let guest = user();
        let mut room = Conversation::new_room(
            ConversationId::from(Uuid::new_v4()),
            PostId::from(Uuid::new_v4()),
            creator,
            [guest, guest],
            Utc::now(),
        );
        assert_eq!(room.member_ids.len(), 2);
        assert!(room.is_member(creator));
        assert_eq!(room.direct_key(), None);

        let added = room.merge_members([guest, user()]);
        assert_eq!(added, 1);
        assert_eq!(room.member_ids.len(), 3);
    }

    #[test]
    fn other_members_excludes_the_given_user() {
        let a = user();
        let b = user();
        let dm = Conversation::new_direct(ConversationId::from(Uuid::new_v4()), a, b, Utc::now())
            .unwrap();
        assert_eq!(dm.other_members(a).collect::<Vec<_>>(), vec![b]);
        assert_eq!(dm.direct_key(), Some(direct_key(a, b)));
    }
}
