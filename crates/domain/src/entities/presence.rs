//! 在线状态实体
//!
//! 过期在读取时判定：`now > expires_at` 的记录无论存储的状态是什么都视为离线。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{StatusText, Timestamp, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceState {
    Online,
    Away,
    Offline,
}

impl PresenceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceState::Online => "online",
            PresenceState::Away => "away",
            PresenceState::Offline => "offline",
        }
    }
}

impl fmt::Display for PresenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PresenceState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(PresenceState::Online),
            "away" => Ok(PresenceState::Away),
            "offline" => Ok(PresenceState::Offline),
            other => Err(DomainError::invalid_argument(
                "state",
                format!("unknown presence state {other}"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    pub user_id: UserId,
    pub state: PresenceState,
    pub status_text: Option<StatusText>,
    pub updated_at: Timestamp,
    pub expires_at: Timestamp,
}

impl Presence {
    /// 心跳刷新后的记录，`expires_at = now + ttl`。
    pub fn refreshed(
        user_id: UserId,
        state: PresenceState,
        status_text: Option<StatusText>,
        now: Timestamp,
        ttl: chrono::Duration,
    ) -> Self {
        Self {
            user_id,
            state,
            status_text,
            updated_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        now > self.expires_at
    }

    pub fn effective_state(&self, now: Timestamp) -> PresenceState {
        if self.is_expired(now) {
            PresenceState::Offline
        } else {
            self.state
        }
    }

    /// 返回读者应看到的记录，过期时状态改写为离线。
    pub fn observed_at(mut self, now: Timestamp) -> Self {
        self.state = self.effective_state(now);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    fn sample(now: Timestamp) -> Presence {
        Presence::refreshed(
            UserId::from(Uuid::new_v4()),
            PresenceState::Online,
            None,
            now,
            Duration::minutes(2),
        )
    }

    #[test]
    fn fresh_presence_keeps_its_state() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let presence = sample(now);
        assert_eq!(presence.expires_at, now + Duration::minutes(2));
        assert_eq!(presence.effective_state(now + Duration::minutes(2)), PresenceState::Online);
    }

    #[test]
    fn expired_presence_reads_as_offline() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let later = now + Duration::minutes(2) + Duration::milliseconds(1);
        let presence = sample(now);

        assert!(presence.is_expired(later));
        let observed = presence.clone().observed_at(later);
        assert_eq!(observed.state, PresenceState::Offline);
        assert_eq!(observed.updated_at, presence.updated_at);
    }
}
