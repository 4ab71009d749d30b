//! 消息、输入状态与已读回执

mod support;

use std::sync::Arc;
use std::time::Duration;

use application::{ApplicationError, BroadcastError, Clock, EventPublisher, MessageRateLimiter};
use async_trait::async_trait;
use domain::{ChatEvent, ConversationId, FanoutEvent, MessageId, PostId, Topic};
use support::{caller, next_event, user, TestApp};
use uuid::Uuid;

struct FailingPublisher;

#[async_trait]
impl EventPublisher for FailingPublisher {
    async fn publish(&self, _event: FanoutEvent) -> Result<(), BroadcastError> {
        Err(BroadcastError::failed("bus unavailable"))
    }
}

#[tokio::test]
async fn test_send_trims_body_and_updates_last_activity() {
    let app = TestApp::new();
    let (alice, bob) = (user(), user());
    app.befriend(alice, bob).await;
    let dm = app.service.ensure_direct(caller(alice), bob).await.unwrap();

    let message = app.service.send(caller(alice), dm.id, "  hi bob \n").await.unwrap();
    assert_eq!(message.body.as_str(), "hi bob");
    assert_eq!(message.sender_id, alice);

    let conversations = app.service.get_my_conversations(caller(bob)).await.unwrap();
    assert_eq!(conversations[0].last_msg_at, Some(message.created_at));
}

#[tokio::test]
async fn test_blank_body_is_rejected_before_rate_limit() {
    let app = TestApp::with_rate_limit(MessageRateLimiter::new(1, Duration::from_secs(30)));
    let (alice, bob) = (user(), user());
    app.befriend(alice, bob).await;
    let dm = app.service.ensure_direct(caller(alice), bob).await.unwrap();

    for _ in 0..3 {
        assert!(matches!(
            app.service.send(caller(alice), dm.id, "   ").await,
            Err(ApplicationError::InvalidInput(_))
        ));
    }
    // 空白消息没有消耗配额
    assert!(app.service.send(caller(alice), dm.id, "hello").await.is_ok());
}

#[tokio::test]
async fn test_send_is_rate_limited() {
    let app = TestApp::new();
    let (alice, bob) = (user(), user());
    app.befriend(alice, bob).await;
    let dm = app.service.ensure_direct(caller(alice), bob).await.unwrap();

    for i in 0..6 {
        app.service
            .send(caller(alice), dm.id, &format!("message {i}"))
            .await
            .unwrap();
    }
    assert!(matches!(
        app.service.send(caller(alice), dm.id, "one too many").await,
        Err(ApplicationError::RateLimited(_))
    ));
    // 限流按发送者计算
    assert!(app.service.send(caller(bob), dm.id, "still fine").await.is_ok());
}

#[tokio::test]
async fn test_non_member_and_missing_conversation_look_the_same() {
    let app = TestApp::new();
    let (alice, bob, mallory) = (user(), user(), user());
    app.befriend(alice, bob).await;
    let dm = app.service.ensure_direct(caller(alice), bob).await.unwrap();

    assert!(matches!(
        app.service.send(caller(mallory), dm.id, "let me in").await,
        Err(ApplicationError::Forbidden)
    ));
    assert!(matches!(
        app.service
            .send(caller(alice), ConversationId::from(Uuid::new_v4()), "anyone?")
            .await,
        Err(ApplicationError::Forbidden)
    ));
    assert!(matches!(
        app.service.get_messages(caller(mallory), dm.id, None, None).await,
        Err(ApplicationError::Forbidden)
    ));
}

#[tokio::test]
async fn test_send_forbidden_when_any_member_is_blocked() {
    let app = TestApp::new();
    let (alice, bob, carol) = (user(), user(), user());
    let room = app
        .service
        .create_room(caller(alice), PostId::from(Uuid::new_v4()), vec![bob, carol])
        .await
        .unwrap();

    app.service.send(caller(alice), room.id, "welcome").await.unwrap();

    // carol 拉黑了发送者
    app.service.block_user(caller(carol), alice).await.unwrap();
    assert!(matches!(
        app.service.send(caller(alice), room.id, "hello?").await,
        Err(ApplicationError::Forbidden)
    ));

    // 发送者拉黑了某个成员
    app.service.block_user(caller(bob), carol).await.unwrap();
    assert!(matches!(
        app.service.send(caller(bob), room.id, "hi").await,
        Err(ApplicationError::Forbidden)
    ));

    let history = app
        .service
        .get_messages(caller(bob), room.id, None, None)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn test_message_event_reaches_current_members_only() {
    let app = TestApp::new();
    let (alice, bob, outsider) = (user(), user(), user());
    app.befriend(alice, bob).await;
    let dm = app.service.ensure_direct(caller(alice), bob).await.unwrap();

    let mut inbox = app.subscribe(bob, Topic::MessageAdded);
    let mut snooper = app.subscribe(outsider, Topic::MessageAdded);

    let sent = app.service.send(caller(alice), dm.id, "secret").await.unwrap();

    let event = next_event(&mut inbox).await.expect("member should receive message");
    assert_eq!(event.event, ChatEvent::MessageAdded(sent));
    assert!(next_event(&mut snooper).await.is_none());
}

#[tokio::test]
async fn test_typing_carries_short_expiry() {
    let app = TestApp::new();
    let (alice, bob) = (user(), user());
    app.befriend(alice, bob).await;
    let dm = app.service.ensure_direct(caller(alice), bob).await.unwrap();
    let mut watcher = app.subscribe(bob, Topic::TypingUpdated);

    assert!(app.service.set_typing(caller(alice), dm.id, true).await.unwrap());

    match next_event(&mut watcher).await.map(|event| event.event) {
        Some(ChatEvent::TypingUpdated(update)) => {
            assert!(update.is_typing);
            assert_eq!(update.user_id, alice);
            assert_eq!(update.until, app.clock.now() + chrono::Duration::seconds(5));
        }
        other => panic!("unexpected event {other:?}"),
    }

    assert!(matches!(
        app.service.set_typing(caller(user()), dm.id, true).await,
        Err(ApplicationError::Forbidden)
    ));
}

#[tokio::test]
async fn test_read_receipt_records_sent_message() {
    let app = TestApp::new();
    let (alice, bob) = (user(), user());
    app.befriend(alice, bob).await;
    let dm = app.service.ensure_direct(caller(alice), bob).await.unwrap();
    let mut watcher = app.subscribe(alice, Topic::ReceiptUpdated);

    let message = app.service.send(caller(alice), dm.id, "did you see this?").await.unwrap();
    let receipt = app.service.mark_read(caller(bob), dm.id, message.id).await.unwrap();

    assert_eq!(receipt.last_seen_message_id, message.id);
    assert_eq!(receipt.user_id, bob);

    let receipts = app.service.get_receipts(caller(alice), dm.id).await.unwrap();
    assert_eq!(receipts, vec![receipt.clone()]);
    assert_eq!(
        next_event(&mut watcher).await.map(|event| event.event),
        Some(ChatEvent::ReceiptUpdated(receipt))
    );
}

#[tokio::test]
async fn test_mark_read_accepts_older_message() {
    let app = TestApp::new();
    let (alice, bob) = (user(), user());
    app.befriend(alice, bob).await;
    let dm = app.service.ensure_direct(caller(alice), bob).await.unwrap();

    let older = app.service.send(caller(alice), dm.id, "one").await.unwrap();
    let newer = app.service.send(caller(alice), dm.id, "two").await.unwrap();

    app.service.mark_read(caller(bob), dm.id, newer.id).await.unwrap();
    let receipt = app.service.mark_read(caller(bob), dm.id, older.id).await.unwrap();
    assert_eq!(receipt.last_seen_message_id, older.id);
}

#[tokio::test]
async fn test_mark_read_rejects_foreign_message() {
    let app = TestApp::new();
    let (alice, bob) = (user(), user());
    let post = PostId::from(Uuid::new_v4());
    let room = app.service.create_room(caller(alice), post, vec![bob]).await.unwrap();
    let other = app
        .service
        .create_room(caller(alice), PostId::from(Uuid::new_v4()), vec![])
        .await
        .unwrap();
    let elsewhere = app.service.send(caller(alice), other.id, "elsewhere").await.unwrap();

    assert!(matches!(
        app.service.mark_read(caller(bob), room.id, elsewhere.id).await,
        Err(ApplicationError::InvalidInput(_))
    ));
    assert!(matches!(
        app.service
            .mark_read(caller(bob), room.id, MessageId::from(Uuid::new_v4()))
            .await,
        Err(ApplicationError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_history_is_ascending_and_respects_after() {
    let app = TestApp::new();
    let (alice, bob) = (user(), user());
    app.befriend(alice, bob).await;
    let dm = app.service.ensure_direct(caller(alice), bob).await.unwrap();

    let mut sent = Vec::new();
    for body in ["a", "b", "c"] {
        sent.push(app.service.send(caller(alice), dm.id, body).await.unwrap());
        app.clock.advance(chrono::Duration::seconds(1));
    }

    let all = app.service.get_messages(caller(bob), dm.id, None, None).await.unwrap();
    assert_eq!(all, sent);

    let tail = app
        .service
        .get_messages(caller(bob), dm.id, Some(sent[0].created_at), None)
        .await
        .unwrap();
    assert_eq!(tail, sent[1..].to_vec());

    let first = app
        .service
        .get_messages(caller(bob), dm.id, None, Some(1))
        .await
        .unwrap();
    assert_eq!(first, sent[..1].to_vec());
}

#[tokio::test]
async fn test_search_is_scoped_to_own_conversations() {
    let app = TestApp::new();
    let (alice, bob, carol) = (user(), user(), user());
    let shared = app
        .service
        .create_room(caller(alice), PostId::from(Uuid::new_v4()), vec![bob])
        .await
        .unwrap();
    let private = app
        .service
        .create_room(caller(carol), PostId::from(Uuid::new_v4()), vec![])
        .await
        .unwrap();

    app.service.send(caller(alice), shared.id, "Pizza tonight?").await.unwrap();
    app.service.send(caller(carol), private.id, "pizza for one").await.unwrap();

    let hits = app.service.search_messages(caller(bob), "PIZZA", None).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].conversation_id, shared.id);

    assert!(app.service.search_messages(caller(bob), "   ", None).await.unwrap().is_empty());
    assert!(app
        .service
        .search_messages(caller(user()), "pizza", None)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_publish_failure_does_not_fail_committed_send() {
    let app = TestApp::with_publisher(Arc::new(FailingPublisher));
    let (alice, bob) = (user(), user());
    app.befriend(alice, bob).await;
    let dm = app.service.ensure_direct(caller(alice), bob).await.unwrap();

    let message = app.service.send(caller(alice), dm.id, "still stored").await.unwrap();
    let history = app.service.get_messages(caller(bob), dm.id, None, None).await.unwrap();
    assert_eq!(history, vec![message]);
    assert!(app.service.heartbeat(caller(alice), None, None).await.is_ok());
}
