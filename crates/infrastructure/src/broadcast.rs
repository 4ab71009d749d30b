//! Redis 事件总线
//!
//! 发布端把 [`FanoutEvent`] 序列化为 JSON 后 PUBLISH 到一个频道；每个节点启动一个中继任务订阅该频道，
//! 把收到的事件投递给本节点的 [`LocalEventBus`]。可见集合随事件一起传输，过滤仍在订阅端完成。

use std::time::Duration;

use application::{BroadcastError, EventPublisher, LocalEventBus};
use async_trait::async_trait;
use domain::FanoutEvent;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const RECONNECT_DELAY: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct RedisEventBus {
    connection: ConnectionManager,
    channel: String,
}

impl RedisEventBus {
    pub async fn connect(client: &Client, channel: impl Into<String>) -> redis::RedisResult<Self> {
        let connection = client.get_connection_manager().await?;
        Ok(Self {
            connection,
            channel: channel.into(),
        })
    }
}

#[async_trait]
impl EventPublisher for RedisEventBus {
    async fn publish(&self, event: FanoutEvent) -> Result<(), BroadcastError> {
        let payload =
            serde_json::to_string(&event).map_err(|err| BroadcastError::failed(err.to_string()))?;
        let mut conn = self.connection.clone();
        let receivers: i64 = conn
            .publish(&self.channel, payload)
            .await
            .map_err(|err| BroadcastError::failed(err.to_string()))?;
        debug!(channel = %self.channel, receivers, topic = %event.topic(), "事件已发布到 Redis");
        Ok(())
    }
}

/// 启动中继任务：订阅频道并转发到本地总线，连接断开后自动重连
pub fn spawn_relay(client: Client, channel: String, local: LocalEventBus) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match relay_once(&client, &channel, &local).await {
                Ok(()) => warn!(%channel, "Redis 订阅流已结束，准备重连"),
                Err(err) => warn!(%channel, error = %err, "Redis 订阅失败，准备重连"),
            }
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    })
}

async fn relay_once(client: &Client, channel: &str, local: &LocalEventBus) -> redis::RedisResult<()> {
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.subscribe(channel).await?;
    info!(%channel, "已订阅 Redis 事件频道");

    let mut messages = Box::pin(pubsub.on_message());
    while let Some(msg) = messages.next().await {
        let payload: String = match msg.get_payload() {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "无法读取 Redis 消息内容");
                continue;
            }
        };
        match serde_json::from_str::<FanoutEvent>(&payload) {
            Ok(event) => {
                let delivered = local.deliver(event);
                debug!(delivered, "Redis 事件已转发到本地总线");
            }
            Err(err) => warn!(error = %err, "丢弃无法解析的 Redis 事件"),
        }
    }
    Ok(())
}
