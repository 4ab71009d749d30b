//! 在线状态与私信核心领域模型
//!
//! 包含好友名册、在线状态、会话、消息、已读回执等实体，以及存储层需要实现的仓储接口。

pub mod entities;
pub mod errors;
pub mod events;
pub mod repositories;
pub mod value_objects;

// 重新导出常用类型
pub use entities::*;
pub use errors::*;
pub use events::*;
pub use repositories::*;
pub use value_objects::*;
