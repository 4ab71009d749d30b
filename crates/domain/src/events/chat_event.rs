//! 推送事件
//!
//! 每个事件在发布前都附带允许查看者集合，订阅端只接收集合中包含自己的事件。

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::entities::{Message, Presence, Receipt, TypingUpdate};
use crate::errors::DomainError;
use crate::value_objects::UserId;

/// 推送主题
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    PresenceUpdated,
    MessageAdded,
    TypingUpdated,
    ReceiptUpdated,
}

impl Topic {
    pub const ALL: [Topic; 4] = [
        Topic::PresenceUpdated,
        Topic::MessageAdded,
        Topic::TypingUpdated,
        Topic::ReceiptUpdated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::PresenceUpdated => "presence-updated",
            Topic::MessageAdded => "message-added",
            Topic::TypingUpdated => "typing-updated",
            Topic::ReceiptUpdated => "receipt-updated",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::ALL
            .into_iter()
            .find(|topic| topic.as_str() == s)
            .ok_or_else(|| DomainError::invalid_argument("topic", format!("unknown topic {s}")))
    }
}

/// 聊天推送事件负载
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ChatEvent {
    PresenceUpdated(Presence),
    MessageAdded(Message),
    TypingUpdated(TypingUpdate),
    ReceiptUpdated(Receipt),
}

impl ChatEvent {
    pub fn topic(&self) -> Topic {
        match self {
            ChatEvent::PresenceUpdated(_) => Topic::PresenceUpdated,
            ChatEvent::MessageAdded(_) => Topic::MessageAdded,
            ChatEvent::TypingUpdated(_) => Topic::TypingUpdated,
            ChatEvent::ReceiptUpdated(_) => Topic::ReceiptUpdated,
        }
    }
}

/// 附带允许查看者集合的事件，总线只投递给集合内的订阅者。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanoutEvent {
    pub event: ChatEvent,
    pub allowed_user_ids: BTreeSet<UserId>,
}

impl FanoutEvent {
    pub fn new(event: ChatEvent, allowed_user_ids: BTreeSet<UserId>) -> Self {
        Self {
            event,
            allowed_user_ids,
        }
    }

    pub fn topic(&self) -> Topic {
        self.event.topic()
    }

    pub fn is_visible_to(&self, viewer: UserId) -> bool {
        self.allowed_user_ids.contains(&viewer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::PresenceState;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    #[test]
    fn visibility_follows_allowed_set() {
        let subject = UserId::from(Uuid::new_v4());
        let buddy = UserId::from(Uuid::new_v4());
        let stranger = UserId::from(Uuid::new_v4());
        let presence = Presence::refreshed(
            subject,
            PresenceState::Online,
            None,
            Utc::now(),
            Duration::minutes(2),
        );
        let event = FanoutEvent::new(
            ChatEvent::PresenceUpdated(presence),
            BTreeSet::from([subject, buddy]),
        );

        assert_eq!(event.topic(), Topic::PresenceUpdated);
        assert!(event.is_visible_to(subject));
        assert!(event.is_visible_to(buddy));
        assert!(!event.is_visible_to(stranger));
    }

    #[test]
    fn topic_parses_from_wire_name() {
        assert_eq!("typing-updated".parse::<Topic>().unwrap(), Topic::TypingUpdated);
        assert!("presence".parse::<Topic>().is_err());
    }

    #[test]
    fn envelope_serializes_with_event_tag() {
        let subject = UserId::from(Uuid::new_v4());
        let presence = Presence::refreshed(
            subject,
            PresenceState::Away,
            None,
            Utc::now(),
            Duration::minutes(2),
        );
        let event = FanoutEvent::new(ChatEvent::PresenceUpdated(presence), BTreeSet::from([subject]));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"]["type"], "presence_updated");
        assert_eq!(json["event"]["payload"]["state"], "away");
        assert_eq!(json["allowed_user_ids"][0], subject.to_string());
    }
}
