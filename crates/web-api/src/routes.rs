use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use uuid::Uuid;
use validator::Validate;

use application::BuddyEntry;
use domain::{
    Conversation, ConversationId, Message, MessageId, PostId, Presence, PresenceState, Receipt,
    Roster, Timestamp, UserId,
};

use crate::{
    auth::CurrentUser, error::ApiError, state::AppState, subscriptions::subscribe,
    validation::validate,
};

#[derive(Debug, Serialize)]
struct OkResponse {
    ok: bool,
}

impl From<bool> for OkResponse {
    fn from(ok: bool) -> Self {
        Self { ok }
    }
}

#[derive(Debug, Default, Deserialize)]
struct HeartbeatPayload {
    state: Option<PresenceState>,
    status_text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StatusPayload {
    status_text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DirectPayload {
    other_user_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
struct CreateRoomPayload {
    post_id: Uuid,
    #[serde(default)]
    #[validate(length(max = 500))]
    member_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
struct SendMessagePayload {
    body: String,
}

#[derive(Debug, Deserialize)]
struct TypingPayload {
    is_typing: bool,
}

#[derive(Debug, Deserialize)]
struct MarkReadPayload {
    last_seen_message_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
struct HistoryQuery {
    after: Option<Timestamp>,
    #[validate(range(min = 1))]
    limit: Option<usize>,
}

#[derive(Debug, Deserialize, Validate)]
struct SearchQuery {
    #[serde(default)]
    #[validate(length(max = 200))]
    q: String,
    #[validate(range(min = 1))]
    limit: Option<usize>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/roster", get(get_roster))
        .route("/buddies", get(get_buddy_list))
        .route("/buddies/{user_id}", delete(remove_buddy))
        .route("/buddies/{user_id}/request", post(request_buddy))
        .route("/buddies/{user_id}/accept", post(accept_buddy))
        .route("/buddies/{user_id}/decline", post(decline_buddy))
        .route("/blocks/{user_id}", post(block_user).delete(unblock_user))
        .route("/presence/heartbeat", post(heartbeat))
        .route("/presence/status", put(set_status))
        .route("/presence/{user_id}", get(get_presence))
        .route("/conversations", get(get_my_conversations))
        .route("/conversations/direct", post(ensure_direct))
        .route("/conversations/rooms", post(create_room))
        .route(
            "/conversations/{conversation_id}/messages",
            post(send_message).get(get_messages),
        )
        .route("/conversations/{conversation_id}/typing", post(set_typing))
        .route("/conversations/{conversation_id}/read", post(mark_read))
        .route("/conversations/{conversation_id}/receipts", get(get_receipts))
        .route("/messages/search", get(search_messages))
        .route("/subscriptions/{topic}", get(subscribe))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn get_roster(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
) -> Result<Json<Roster>, ApiError> {
    Ok(Json(state.chat_service.get_roster(caller).await?))
}

async fn get_buddy_list(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
) -> Result<Json<Vec<BuddyEntry>>, ApiError> {
    Ok(Json(state.chat_service.get_buddy_list(caller).await?))
}

async fn request_buddy(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<OkResponse>, ApiError> {
    let ok = state
        .chat_service
        .request_buddy(caller, UserId::from(user_id))
        .await?;
    Ok(Json(ok.into()))
}

async fn accept_buddy(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<OkResponse>, ApiError> {
    let ok = state
        .chat_service
        .accept_buddy(caller, UserId::from(user_id))
        .await?;
    Ok(Json(ok.into()))
}

async fn decline_buddy(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<OkResponse>, ApiError> {
    let ok = state
        .chat_service
        .decline_buddy(caller, UserId::from(user_id))
        .await?;
    Ok(Json(ok.into()))
}

async fn remove_buddy(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<OkResponse>, ApiError> {
    let ok = state
        .chat_service
        .remove_buddy(caller, UserId::from(user_id))
        .await?;
    Ok(Json(ok.into()))
}

async fn block_user(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<OkResponse>, ApiError> {
    let ok = state
        .chat_service
        .block_user(caller, UserId::from(user_id))
        .await?;
    Ok(Json(ok.into()))
}

async fn unblock_user(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<OkResponse>, ApiError> {
    let ok = state
        .chat_service
        .unblock_user(caller, UserId::from(user_id))
        .await?;
    Ok(Json(ok.into()))
}

async fn heartbeat(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    payload: Option<Json<HeartbeatPayload>>,
) -> Result<Json<Presence>, ApiError> {
    let Json(payload) = payload.unwrap_or_default();
    let presence = state
        .chat_service
        .heartbeat(caller, payload.state, payload.status_text)
        .await?;
    Ok(Json(presence))
}

async fn set_status(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Json(payload): Json<StatusPayload>,
) -> Result<Json<Presence>, ApiError> {
    let presence = state
        .chat_service
        .set_status(caller, payload.status_text)
        .await?;
    Ok(Json(presence))
}

async fn get_presence(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Option<Presence>>, ApiError> {
    let presence = state
        .chat_service
        .get_presence(caller, UserId::from(user_id))
        .await?;
    Ok(Json(presence))
}

async fn get_my_conversations(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
) -> Result<Json<Vec<Conversation>>, ApiError> {
    Ok(Json(state.chat_service.get_my_conversations(caller).await?))
}

async fn ensure_direct(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Json(payload): Json<DirectPayload>,
) -> Result<Json<Conversation>, ApiError> {
    let conversation = state
        .chat_service
        .ensure_direct(caller, UserId::from(payload.other_user_id))
        .await?;
    Ok(Json(conversation))
}

async fn create_room(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Json(payload): Json<CreateRoomPayload>,
) -> Result<(StatusCode, Json<Conversation>), ApiError> {
    validate(&payload)?;
    let members = payload.member_ids.into_iter().map(UserId::from).collect();
    let conversation = state
        .chat_service
        .create_room(caller, PostId::from(payload.post_id), members)
        .await?;
    Ok((StatusCode::CREATED, Json(conversation)))
}

async fn send_message(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(conversation_id): Path<Uuid>,
    Json(payload): Json<SendMessagePayload>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let message = state
        .chat_service
        .send(caller, ConversationId::from(conversation_id), &payload.body)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn get_messages(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<Message>>, ApiError> {
    validate(&query)?;
    let messages = state
        .chat_service
        .get_messages(
            caller,
            ConversationId::from(conversation_id),
            query.after,
            query.limit,
        )
        .await?;
    Ok(Json(messages))
}

async fn set_typing(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(conversation_id): Path<Uuid>,
    Json(payload): Json<TypingPayload>,
) -> Result<Json<OkResponse>, ApiError> {
    let ok = state
        .chat_service
        .set_typing(caller, ConversationId::from(conversation_id), payload.is_typing)
        .await?;
    Ok(Json(ok.into()))
}

async fn mark_read(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(conversation_id): Path<Uuid>,
    Json(payload): Json<MarkReadPayload>,
) -> Result<Json<Receipt>, ApiError> {
    let receipt = state
        .chat_service
        .mark_read(
            caller,
            ConversationId::from(conversation_id),
            MessageId::from(payload.last_seen_message_id),
        )
        .await?;
    Ok(Json(receipt))
}

async fn get_receipts(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<Vec<Receipt>>, ApiError> {
    let receipts = state
        .chat_service
        .get_receipts(caller, ConversationId::from(conversation_id))
        .await?;
    Ok(Json(receipts))
}

async fn search_messages(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Message>>, ApiError> {
    validate(&query)?;
    let messages = state
        .chat_service
        .search_messages(caller, &query.q, query.limit)
        .await?;
    Ok(Json(messages))
}
