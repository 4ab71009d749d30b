//! WebSocket 推送订阅
//!
//! 每个连接订阅一个主题，只转发允许查看者集合包含该调用者的事件。
//! 下发的帧只含事件本身，不含可见集合。

use application::EventSubscription;
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use domain::{DomainError, FanoutEvent, Topic};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;

use crate::{auth::bearer_token, error::ApiError, state::AppState};

#[derive(Debug, Deserialize)]
pub(crate) struct SubscriptionQuery {
    token: Option<String>,
}

/// 浏览器的 WebSocket 不能带自定义头，因此也接受 `?token=`
pub(crate) async fn subscribe(
    State(state): State<AppState>,
    Path(topic): Path<String>,
    Query(query): Query<SubscriptionQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let topic: Topic = topic
        .parse()
        .map_err(|err: DomainError| ApiError::bad_request(err.to_string()))?;
    let credential = query.token.as_deref().or_else(|| bearer_token(&headers));
    let caller = state.identity.resolve(credential)?;

    // 升级前订阅，握手期间产生的事件也不会丢
    let subscription = state.bus.subscribe(caller.user_id(), [topic]);
    Ok(ws.on_upgrade(move |socket| forward_events(socket, subscription)))
}

fn event_frame(event: &FanoutEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(&event.event)
}

async fn forward_events(socket: WebSocket, mut subscription: EventSubscription) {
    let viewer = subscription.viewer();
    tracing::info!(user_id = %viewer, "订阅连接已建立");

    let (mut sender, mut incoming) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = subscription.recv().await {
            let payload = match event_frame(&event) {
                Ok(json) => json,
                Err(err) => {
                    tracing::warn!(error = %err, "事件序列化失败");
                    continue;
                }
            };
            if sender.send(WsMessage::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = incoming.next().await {
            if matches!(message, WsMessage::Close(_)) {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
    tracing::info!(user_id = %viewer, "订阅连接已关闭");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::{ChatEvent, ConversationId, TypingUpdate, UserId};
    use std::collections::BTreeSet;
    use uuid::Uuid;

    #[test]
    fn frame_omits_the_allowed_viewer_set() {
        let user = UserId::from(Uuid::new_v4());
        let event = FanoutEvent::new(
            ChatEvent::TypingUpdated(TypingUpdate {
                conversation_id: ConversationId::from(Uuid::new_v4()),
                user_id: user,
                is_typing: true,
                until: Utc::now(),
            }),
            BTreeSet::from([user]),
        );

        let frame: serde_json::Value = serde_json::from_str(&event_frame(&event).unwrap()).unwrap();
        assert_eq!(frame["type"], "typing_updated");
        assert!(frame.get("allowed_user_ids").is_none());
        assert_eq!(frame["payload"]["is_typing"], true);
    }
}
