//! 集成测试共用的装配代码
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use application::{
    ChatService, ChatServiceDependencies, ChatSettings, Clock, EventPublisher, EventSubscription,
    LocalEventBus, MemoryStore, MessageRateLimiter,
};
use chrono::TimeZone;
use domain::{Caller, FanoutEvent, Timestamp, Topic, UserId};
use uuid::Uuid;

/// 手动推进的时钟
pub struct TestClock {
    now: Mutex<Timestamp>,
}

impl TestClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(chrono::Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for TestClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().unwrap()
    }
}

pub struct TestApp {
    pub service: Arc<ChatService>,
    pub store: Arc<MemoryStore>,
    pub bus: LocalEventBus,
    pub clock: Arc<TestClock>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_rate_limit(MessageRateLimiter::default())
    }

    pub fn with_rate_limit(rate_limiter: MessageRateLimiter) -> Self {
        let bus = LocalEventBus::new(64);
        Self::build(rate_limiter, bus.clone(), Arc::new(bus))
    }

    pub fn with_publisher(publisher: Arc<dyn EventPublisher>) -> Self {
        Self::build(MessageRateLimiter::default(), LocalEventBus::new(64), publisher)
    }

    fn build(
        rate_limiter: MessageRateLimiter,
        bus: LocalEventBus,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(TestClock::new());
        let service = ChatService::new(ChatServiceDependencies::in_memory(
            store.clone(),
            Arc::new(rate_limiter),
            clock.clone(),
            publisher,
            ChatSettings::default(),
        ));
        Self {
            service: Arc::new(service),
            store,
            bus,
            clock,
        }
    }

    pub async fn befriend(&self, a: UserId, b: UserId) {
        self.service.request_buddy(caller(a), b).await.unwrap();
        self.service.accept_buddy(caller(b), a).await.unwrap();
    }

    pub fn subscribe(&self, viewer: UserId, topic: Topic) -> EventSubscription {
        self.bus.subscribe(viewer, [topic])
    }
}

pub fn user() -> UserId {
    UserId::from(Uuid::new_v4())
}

pub fn caller(user_id: UserId) -> Caller {
    Caller::new(user_id)
}

/// 在短时间内等待下一条可见事件，超时返回 `None`
pub async fn next_event(subscription: &mut EventSubscription) -> Option<FanoutEvent> {
    tokio::time::timeout(Duration::from_millis(100), subscription.recv())
        .await
        .ok()
        .flatten()
}
