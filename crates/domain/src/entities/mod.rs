//! 领域实体定义
//!
//! 名册、在线状态、会话、消息、回执与输入状态。

pub mod auth;
pub mod conversation;
pub mod message;
pub mod presence;
pub mod receipt;
pub mod roster;
pub mod typing;

// 重新导出核心实体
pub use auth::Caller;
pub use conversation::{direct_key, Conversation, ConversationKind};
pub use message::Message;
pub use presence::{Presence, PresenceState};
pub use receipt::Receipt;
pub use roster::{Roster, RosterSet, RosterUpdate};
pub use typing::TypingUpdate;
