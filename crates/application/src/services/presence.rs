//! 在线状态
//!
//! 过期只在读取时判定，不存在后台清理任务。

use std::collections::HashMap;

use domain::{Caller, Presence, PresenceState, RosterUpdate, StatusText, Timestamp, UserId};
use serde::Serialize;

use super::ChatService;
use crate::error::ApplicationError;

/// 好友列表中的一项
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuddyEntry {
    pub user_id: UserId,
    pub state: PresenceState,
    /// 优先取在线状态里的文本，没有时取名册里的
    pub status_text: Option<StatusText>,
    pub updated_at: Option<Timestamp>,
}

impl ChatService {
    /// 心跳：刷新在线状态并把状态文本同步到名册，然后推送给本人和好友
    pub async fn heartbeat(
        &self,
        caller: Caller,
        state: Option<PresenceState>,
        status_text: Option<String>,
    ) -> Result<Presence, ApplicationError> {
        let status_text = StatusText::parse(status_text)?;
        self.refresh_presence(caller, state.unwrap_or(PresenceState::Online), status_text)
            .await
    }

    /// 设置状态文本：有文本为离开，没有文本为在线
    pub async fn set_status(
        &self,
        caller: Caller,
        status_text: Option<String>,
    ) -> Result<Presence, ApplicationError> {
        let status_text = StatusText::parse(status_text)?;
        let state = if status_text.is_some() {
            PresenceState::Away
        } else {
            PresenceState::Online
        };
        self.refresh_presence(caller, state, status_text).await
    }

    async fn refresh_presence(
        &self,
        caller: Caller,
        state: PresenceState,
        status_text: Option<StatusText>,
    ) -> Result<Presence, ApplicationError> {
        let user_id = caller.user_id();
        let now = self.deps.clock.now();
        let presence = Presence::refreshed(
            user_id,
            state,
            status_text.clone(),
            now,
            self.deps.settings.presence_ttl,
        );

        let stored = self.deps.presence_repository.upsert(&presence).await?;
        self.deps
            .roster_repository
            .apply(user_id, &RosterUpdate::new().set_status_text(status_text))
            .await?;

        tracing::debug!(user_id = %user_id, state = %stored.state, "在线状态已刷新");
        self.fanout.publish_presence(&stored).await;
        Ok(stored)
    }

    /// 查看单个用户的在线状态，只允许本人或对方的好友查看
    pub async fn get_presence(
        &self,
        caller: Caller,
        subject: UserId,
    ) -> Result<Option<Presence>, ApplicationError> {
        let user_id = caller.user_id();
        if user_id != subject {
            let subject_roster = self.guard.roster_of(subject).await?;
            if !subject_roster.is_buddy(user_id) || subject_roster.has_blocked(user_id) {
                tracing::debug!(user_id = %user_id, target_id = %subject, "无权查看在线状态");
                return Err(ApplicationError::Forbidden);
            }
        }

        let now = self.deps.clock.now();
        Ok(self
            .deps
            .presence_repository
            .find(subject)
            .await?
            .map(|presence| presence.observed_at(now)))
    }

    /// 好友列表及其在线状态
    pub async fn get_buddy_list(&self, caller: Caller) -> Result<Vec<BuddyEntry>, ApplicationError> {
        let roster = self.guard.roster_of(caller.user_id()).await?;
        let buddy_ids: Vec<UserId> = roster.buddies.iter().copied().collect();
        if buddy_ids.is_empty() {
            return Ok(Vec::new());
        }

        let now = self.deps.clock.now();
        let mut presence: HashMap<UserId, Presence> = self
            .deps
            .presence_repository
            .find_many(&buddy_ids)
            .await?
            .into_iter()
            .map(|presence| (presence.user_id, presence.observed_at(now)))
            .collect();

        let mut entries = Vec::with_capacity(buddy_ids.len());
        for buddy_id in buddy_ids {
            let entry = match presence.remove(&buddy_id) {
                Some(Presence {
                    state,
                    status_text: Some(text),
                    updated_at,
                    ..
                }) => BuddyEntry {
                    user_id: buddy_id,
                    state,
                    status_text: Some(text),
                    updated_at: Some(updated_at),
                },
                found => {
                    let buddy_roster = self.guard.roster_of(buddy_id).await?;
                    BuddyEntry {
                        user_id: buddy_id,
                        state: found
                            .as_ref()
                            .map_or(PresenceState::Offline, |presence| presence.state),
                        status_text: buddy_roster.status_text,
                        updated_at: found.map(|presence| presence.updated_at),
                    }
                }
            };
            entries.push(entry);
        }
        Ok(entries)
    }
}
