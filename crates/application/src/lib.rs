//! 应用层实现。
//!
//! 这里提供围绕领域模型的用例服务，负责输入校验、授权检查、
//! 推送可见集合的计算，以及对外部适配器（存储、事件总线、限流）的抽象。

pub mod auth;
pub mod broadcaster;
pub mod clock;
pub mod error;
pub mod fanout;
pub mod guard;
pub mod local_broadcast;
pub mod memory;
pub mod rate_limiter;
pub mod services;

pub use auth::IdentityResolver;
pub use broadcaster::{BroadcastError, EventPublisher};
pub use clock::{Clock, SystemClock};
pub use error::ApplicationError;
pub use fanout::FanoutFilter;
pub use guard::AuthorizationGuard;
pub use local_broadcast::{EventSubscription, LocalEventBus};
pub use memory::MemoryStore;
pub use rate_limiter::{MessageRateLimiter, RateLimitError, SendRateLimiter};
pub use services::{BuddyEntry, ChatService, ChatServiceDependencies, ChatSettings};
