//! 好友名册实体
//!
//! 每个用户一份名册，记录好友、双向的待处理请求、拉黑列表和状态文本。
//! 名册的所有修改都用 [`RosterUpdate`] 描述，存储层必须把一次更新作为单文档原子操作执行。

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{StatusText, UserId};

/// 名册中的集合字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RosterSet {
    Buddies,
    RequestsOut,
    RequestsIn,
    Blocked,
}

impl RosterSet {
    pub fn as_str(&self) -> &'static str {
        match self {
            RosterSet::Buddies => "buddies",
            RosterSet::RequestsOut => "requests_out",
            RosterSet::RequestsIn => "requests_in",
            RosterSet::Blocked => "blocked",
        }
    }
}

impl fmt::Display for RosterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RosterSet {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buddies" => Ok(RosterSet::Buddies),
            "requests_out" => Ok(RosterSet::RequestsOut),
            "requests_in" => Ok(RosterSet::RequestsIn),
            "blocked" => Ok(RosterSet::Blocked),
            other => Err(DomainError::invalid_argument(
                "roster_set",
                format!("unknown relation {other}"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    pub user_id: UserId,
    pub buddies: BTreeSet<UserId>,
    pub requests_out: BTreeSet<UserId>,
    pub requests_in: BTreeSet<UserId>,
    pub blocked: BTreeSet<UserId>,
    pub status_text: Option<StatusText>,
}

impl Roster {
    /// 尚未写入过的名册，读取缺失文档时使用。
    pub fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            buddies: BTreeSet::new(),
            requests_out: BTreeSet::new(),
            requests_in: BTreeSet::new(),
            blocked: BTreeSet::new(),
            status_text: None,
        }
    }

    pub fn is_buddy(&self, other: UserId) -> bool {
        self.buddies.contains(&other)
    }

    pub fn has_blocked(&self, other: UserId) -> bool {
        self.blocked.contains(&other)
    }

    pub fn has_pending_with(&self, other: UserId) -> bool {
        self.requests_in.contains(&other) || self.requests_out.contains(&other)
    }

    fn set_mut(&mut self, set: RosterSet) -> &mut BTreeSet<UserId> {
        match set {
            RosterSet::Buddies => &mut self.buddies,
            RosterSet::RequestsOut => &mut self.requests_out,
            RosterSet::RequestsIn => &mut self.requests_in,
            RosterSet::Blocked => &mut self.blocked,
        }
    }

    /// 应用一次原子更新：先移除，再添加，最后设置状态文本。
    pub fn apply(&mut self, update: &RosterUpdate) {
        for (set, user_id) in &update.remove {
            self.set_mut(*set).remove(user_id);
        }
        for (set, user_id) in &update.add {
            self.set_mut(*set).insert(*user_id);
        }
        if let Some(status_text) = &update.status_text {
            self.status_text = status_text.clone();
        }
    }
}

/// 单份名册的原子更新描述，对应集合的 add / pull 与字段 set。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterUpdate {
    pub add: Vec<(RosterSet, UserId)>,
    pub remove: Vec<(RosterSet, UserId)>,
    pub status_text: Option<Option<StatusText>>,
}

impl RosterUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, set: RosterSet, user_id: UserId) -> Self {
        self.add.push((set, user_id));
        self
    }

    pub fn remove(mut self, set: RosterSet, user_id: UserId) -> Self {
        self.remove.push((set, user_id));
        self
    }

    /// 从好友和两个请求集合中移除对方。
    pub fn strip(self, user_id: UserId) -> Self {
        self.remove(RosterSet::Buddies, user_id)
            .remove(RosterSet::RequestsIn, user_id)
            .remove(RosterSet::RequestsOut, user_id)
    }

    pub fn set_status_text(mut self, status_text: Option<StatusText>) -> Self {
        self.status_text = Some(status_text);
        self
    }
}
