use async_trait::async_trait;
use domain::FanoutEvent;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("broadcast failed: {0}")]
    Failed(String),
}

impl BroadcastError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// 发布/订阅总线的发布端。
///
/// 事件必须已经附带允许查看者集合，总线不做任何授权判断，只负责投递。
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: FanoutEvent) -> Result<(), BroadcastError>;
}
