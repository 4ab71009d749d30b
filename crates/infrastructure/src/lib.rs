//! 基础设施层实现。
//!
//! 提供 PostgreSQL 仓储、Redis 事件总线与分布式限流等适配器，实现应用/领域层定义的接口。

pub mod broadcast;
pub mod builder;
pub mod migrations;
pub mod rate_limiter;
pub mod repository;

pub use broadcast::{spawn_relay, RedisEventBus};
pub use builder::{Infrastructure, InfrastructureError, Repositories};
pub use migrations::MIGRATOR;
pub use rate_limiter::RedisRateLimiter;
pub use repository::{
    create_pg_pool, PgConversationRepository, PgMessageRepository, PgPresenceRepository,
    PgReceiptRepository, PgRosterRepository, PgStorage,
};
