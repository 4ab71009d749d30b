//! 统一配置中心
//!
//! 配置按以下优先级合并：
//! - 内置默认值（仅适合开发环境）
//! - 配置文件（`CHAT_CONFIG_FILE`，默认 `config/chat.toml`，不存在时跳过）
//! - `CHAT_` 前缀的环境变量，嵌套字段用 `__` 分隔，如 `CHAT_SERVER__PORT=9000`

use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "config/chat.toml";
const DEV_JWT_SECRET: &str = "dev-secret-key-not-for-production-use-minimum-32-chars";

/// 全局应用配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
    pub bus: BusConfig,
    pub chat: ChatConfig,
    pub rate_limit: RateLimitConfig,
}

/// 服务器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// JWT配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub expiration_hours: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Postgres,
}

/// 存储配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub database_url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusBackend {
    Local,
    Redis,
}

/// 事件总线配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusConfig {
    pub backend: BusBackend,
    pub capacity: usize,
    pub redis_url: Option<String>,
    pub channel: String,
}

/// 聊天业务参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatConfig {
    pub presence_ttl_secs: u64,
    pub typing_window_secs: u64,
    pub history_default_limit: usize,
    pub history_max_limit: usize,
    pub conversation_list_limit: usize,
    pub search_max_limit: usize,
}

impl ChatConfig {
    pub fn presence_ttl(&self) -> Duration {
        Duration::from_secs(self.presence_ttl_secs)
    }

    pub fn typing_window(&self) -> Duration {
        Duration::from_secs(self.typing_window_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitBackend {
    Memory,
    Redis,
}

/// 发送频率限制：`window_secs` 滑动窗口内最多 `max_messages` 条
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub backend: RateLimitBackend,
    pub max_messages: u32,
    pub window_secs: u64,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for AppConfig {
    /// 默认配置使用开发环境版本：内存存储、本地总线
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            jwt: JwtConfig {
                secret: DEV_JWT_SECRET.to_string(),
                expiration_hours: 24,
            },
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                database_url: None,
                max_connections: 5,
            },
            bus: BusConfig {
                backend: BusBackend::Local,
                capacity: 1024,
                redis_url: None,
                channel: "chat:events".to_string(),
            },
            chat: ChatConfig {
                presence_ttl_secs: 120,
                typing_window_secs: 5,
                history_default_limit: 50,
                history_max_limit: 200,
                conversation_list_limit: 200,
                search_max_limit: 200,
            },
            rate_limit: RateLimitConfig {
                backend: RateLimitBackend::Memory,
                max_messages: 6,
                window_secs: 30,
            },
        }
    }
}

impl AppConfig {
    /// 按 默认值 -> 配置文件 -> 环境变量 的顺序加载并验证
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("CHAT_CONFIG_FILE").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let config: AppConfig = Self::figment(&path).extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    /// 加载开发配置，不做生产环境安全检查
    pub fn from_env_with_defaults() -> Result<Self, ConfigError> {
        let config: AppConfig = Self::figment(DEFAULT_CONFIG_FILE)
            .extract()
            .map_err(Box::new)?;
        Ok(config)
    }

    fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("CHAT_").ignore(&["config_file"]).split("__"))
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        // JWT密钥至少256位
        if self.jwt.secret.len() < 32 {
            return Err(ConfigError::InvalidJwtSecret(
                "JWT secret must be at least 32 characters long".to_string(),
            ));
        }
        if self.jwt.secret == DEV_JWT_SECRET {
            return Err(ConfigError::InvalidJwtSecret(
                "Cannot use development JWT secret in production".to_string(),
            ));
        }
        if self.jwt.expiration_hours <= 0 {
            return Err(ConfigError::InvalidJwtSecret(
                "expiration_hours must be positive".to_string(),
            ));
        }

        if self.storage.backend == StorageBackend::Postgres
            && self.storage.database_url.as_deref().map_or(true, str::is_empty)
        {
            return Err(ConfigError::InvalidStorageConfig(
                "database_url is required for the postgres backend".to_string(),
            ));
        }
        if self.storage.max_connections == 0 {
            return Err(ConfigError::InvalidStorageConfig(
                "Max connections must be greater than 0".to_string(),
            ));
        }

        let needs_redis = self.bus.backend == BusBackend::Redis
            || self.rate_limit.backend == RateLimitBackend::Redis;
        if needs_redis && self.bus.redis_url.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::InvalidBusConfig(
                "bus.redis_url is required when a redis backend is selected".to_string(),
            ));
        }
        if self.bus.capacity == 0 {
            return Err(ConfigError::InvalidBusConfig(
                "capacity must be greater than 0".to_string(),
            ));
        }

        let chat = &self.chat;
        if chat.presence_ttl_secs == 0 || chat.typing_window_secs == 0 {
            return Err(ConfigError::InvalidChatConfig(
                "presence ttl and typing window must be positive".to_string(),
            ));
        }
        if chat.history_default_limit == 0
            || chat.history_default_limit > chat.history_max_limit
            || chat.conversation_list_limit == 0
            || chat.search_max_limit == 0
        {
            return Err(ConfigError::InvalidChatConfig(
                "query limits must be positive and default <= max".to_string(),
            ));
        }

        if self.rate_limit.max_messages == 0 || self.rate_limit.window_secs == 0 {
            return Err(ConfigError::InvalidRateLimitConfig(
                "max_messages and window_secs must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Redis 连接地址，总线和限流共用
    pub fn redis_url(&self) -> Option<&str> {
        self.bus.redis_url.as_deref()
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("Invalid JWT secret: {0}")]
    InvalidJwtSecret(String),
    #[error("Invalid storage configuration: {0}")]
    InvalidStorageConfig(String),
    #[error("Invalid bus configuration: {0}")]
    InvalidBusConfig(String),
    #[error("Invalid chat configuration: {0}")]
    InvalidChatConfig(String),
    #[error("Invalid rate limit configuration: {0}")]
    InvalidRateLimitConfig(String),
}
