// 进程内事件总线
use crate::broadcaster::{BroadcastError, EventPublisher};
use async_trait::async_trait;
use domain::{FanoutEvent, Topic, UserId};
use futures_util::Stream;
use std::collections::HashSet;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct LocalEventBus {
    sender: broadcast::Sender<FanoutEvent>,
}

impl LocalEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// 以某个用户身份订阅指定主题，只会收到允许该用户查看的事件
    pub fn subscribe(&self, viewer: UserId, topics: impl IntoIterator<Item = Topic>) -> EventSubscription {
        EventSubscription::new(self.sender.subscribe(), viewer, topics)
    }

    /// 直接投递到本地订阅者，Redis 中继也走这里
    pub fn deliver(&self, event: FanoutEvent) -> usize {
        // 没有订阅者时 send 返回错误，此时事件直接丢弃
        self.sender.send(event).unwrap_or(0)
    }
}

impl Default for LocalEventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl EventPublisher for LocalEventBus {
    async fn publish(&self, event: FanoutEvent) -> Result<(), BroadcastError> {
        let delivered = self.deliver(event);
        tracing::trace!(delivered, "本地总线已投递事件");
        Ok(())
    }
}

/// 单个订阅者的事件流，按主题和允许查看者集合过滤
pub struct EventSubscription {
    receiver: broadcast::Receiver<FanoutEvent>,
    viewer: UserId,
    topics: HashSet<Topic>,
}

impl EventSubscription {
    pub fn new(
        receiver: broadcast::Receiver<FanoutEvent>,
        viewer: UserId,
        topics: impl IntoIterator<Item = Topic>,
    ) -> Self {
        Self {
            receiver,
            viewer,
            topics: topics.into_iter().collect(),
        }
    }

    pub fn viewer(&self) -> UserId {
        self.viewer
    }

    /// 等待下一条可见事件，总线关闭时返回 `None`
    pub async fn recv(&mut self) -> Option<FanoutEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.topics.contains(&event.topic()) && event.is_visible_to(self.viewer) {
                        return Some(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(viewer = %self.viewer, skipped, "订阅者消费过慢，丢弃了部分事件");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = FanoutEvent> + Send {
        futures_util::stream::unfold(self, |mut subscription| async move {
            subscription.recv().await.map(|event| (event, subscription))
        })
    }
}
