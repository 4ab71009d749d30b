use std::sync::Arc;

use application::{
    ChatServiceDependencies, ChatSettings, Clock, EventPublisher, LocalEventBus, MemoryStore,
    MessageRateLimiter, SendRateLimiter,
};
use config::{AppConfig, BusBackend, RateLimitBackend, StorageBackend};
use domain::{
    ConversationRepository, MessageRepository, PresenceRepository, ReceiptRepository,
    RosterRepository,
};
use sqlx::PgPool;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::info;

use crate::{
    broadcast::{spawn_relay, RedisEventBus},
    migrations::MIGRATOR,
    rate_limiter::RedisRateLimiter,
    repository::{create_pg_pool, PgStorage},
};

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("missing setting: {0}")]
    MissingSetting(&'static str),
}

/// 五个仓储接口的具体实现
#[derive(Clone)]
pub struct Repositories {
    pub rosters: Arc<dyn RosterRepository>,
    pub presence: Arc<dyn PresenceRepository>,
    pub conversations: Arc<dyn ConversationRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub receipts: Arc<dyn ReceiptRepository>,
}

impl Repositories {
    fn memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            rosters: store.clone(),
            presence: store.clone(),
            conversations: store.clone(),
            messages: store.clone(),
            receipts: store,
        }
    }

    fn postgres(storage: &PgStorage) -> Self {
        Self {
            rosters: storage.roster_repository.clone(),
            presence: storage.presence_repository.clone(),
            conversations: storage.conversation_repository.clone(),
            messages: storage.message_repository.clone(),
            receipts: storage.receipt_repository.clone(),
        }
    }
}

/// 按配置选出的存储、事件总线和限流实现
pub struct Infrastructure {
    pub repositories: Repositories,
    pub rate_limiter: Arc<dyn SendRateLimiter>,
    pub publisher: Arc<dyn EventPublisher>,
    /// 订阅端总是从本地总线读取；Redis 模式下由中继任务填充
    pub bus: LocalEventBus,
    pub pool: Option<PgPool>,
    relay: Option<JoinHandle<()>>,
}

impl Infrastructure {
    pub async fn connect(config: &AppConfig) -> Result<Self, InfrastructureError> {
        let (repositories, pool) = match config.storage.backend {
            StorageBackend::Memory => {
                info!("使用内存存储");
                (Repositories::memory(), None)
            }
            StorageBackend::Postgres => {
                let database_url = config
                    .storage
                    .database_url
                    .as_deref()
                    .ok_or(InfrastructureError::MissingSetting("storage.database_url"))?;
                let pool = create_pg_pool(database_url, config.storage.max_connections).await?;
                MIGRATOR.run(&pool).await?;
                info!("PostgreSQL 已连接，迁移完成");
                let storage = PgStorage::new(pool.clone());
                (Repositories::postgres(&storage), Some(pool))
            }
        };

        let redis_client = match config.redis_url() {
            Some(url)
                if config.bus.backend == BusBackend::Redis
                    || config.rate_limit.backend == RateLimitBackend::Redis =>
            {
                Some(redis::Client::open(url)?)
            }
            _ => None,
        };
        let redis_client = || {
            redis_client
                .as_ref()
                .ok_or(InfrastructureError::MissingSetting("bus.redis_url"))
        };

        let rate_limiter: Arc<dyn SendRateLimiter> = match config.rate_limit.backend {
            RateLimitBackend::Memory => Arc::new(MessageRateLimiter::from_config(&config.rate_limit)),
            RateLimitBackend::Redis => Arc::new(
                RedisRateLimiter::connect(
                    redis_client()?,
                    config.rate_limit.max_messages,
                    config.rate_limit.window(),
                )
                .await?,
            ),
        };

        let bus = LocalEventBus::new(config.bus.capacity);
        let (publisher, relay): (Arc<dyn EventPublisher>, _) = match config.bus.backend {
            BusBackend::Local => (Arc::new(bus.clone()), None),
            BusBackend::Redis => {
                let client = redis_client()?;
                let publisher = RedisEventBus::connect(client, config.bus.channel.clone()).await?;
                let relay = spawn_relay(client.clone(), config.bus.channel.clone(), bus.clone());
                info!(channel = %config.bus.channel, "使用 Redis 事件总线");
                (Arc::new(publisher), Some(relay))
            }
        };

        Ok(Self {
            repositories,
            rate_limiter,
            publisher,
            bus,
            pool,
            relay,
        })
    }

    pub fn chat_dependencies(
        &self,
        clock: Arc<dyn Clock>,
        settings: ChatSettings,
    ) -> ChatServiceDependencies {
        ChatServiceDependencies {
            roster_repository: self.repositories.rosters.clone(),
            presence_repository: self.repositories.presence.clone(),
            conversation_repository: self.repositories.conversations.clone(),
            message_repository: self.repositories.messages.clone(),
            receipt_repository: self.repositories.receipts.clone(),
            rate_limiter: self.rate_limiter.clone(),
            clock,
            publisher: self.publisher.clone(),
            settings,
        }
    }

    /// 停止 Redis 中继任务
    pub fn shutdown(&self) {
        if let Some(relay) = &self.relay {
            relay.abort();
        }
    }
}
