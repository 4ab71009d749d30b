//! 领域事件定义

pub mod chat_event;

// 重新导出事件类型
pub use chat_event::*;
