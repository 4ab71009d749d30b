use std::sync::Arc;

use application::{ChatService, IdentityResolver, LocalEventBus};

#[derive(Clone)]
pub struct AppState {
    pub chat_service: Arc<ChatService>,
    pub identity: Arc<dyn IdentityResolver>,
    /// 订阅端读取的本地总线
    pub bus: LocalEventBus,
}

impl AppState {
    pub fn new(
        chat_service: Arc<ChatService>,
        identity: Arc<dyn IdentityResolver>,
        bus: LocalEventBus,
    ) -> Self {
        Self {
            chat_service,
            identity,
            bus,
        }
    }
}
