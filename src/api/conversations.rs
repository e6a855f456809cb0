//! Conversation CRUD endpoints, mapping 1:1 onto the store.

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use ts_rs::TS;

use crate::db::models::{Conversation, ConversationDetail, NewMessage, StoredMessage};
use crate::db::repos::conversations as store;
use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Deserialize, TS)]
#[ts(export)]
pub struct CreateConversationRequest {
    pub title: Option<String>,
}

#[derive(Debug, Deserialize, TS)]
#[ts(export)]
pub struct RenameConversationRequest {
    pub title: String,
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Conversation>>, AppError> {
    Ok(Json(store::list(&state.db)?))
}

pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<CreateConversationRequest>,
) -> Result<Json<Conversation>, AppError> {
    let conversation = store::create(&state.db, request.title.as_deref())?;
    tracing::info!(id = conversation.id, "Created conversation");
    Ok(Json(conversation))
}

pub async fn get_detail(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ConversationDetail>, AppError> {
    Ok(Json(store::get_with_messages(&state.db, id)?))
}

pub async fn rename(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<RenameConversationRequest>,
) -> Result<Json<Conversation>, AppError> {
    let title = request.title.trim();
    if title.is_empty() {
        return Err(AppError::Validation("title must not be empty".into()));
    }
    Ok(Json(store::rename(&state.db, id, title)?))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    store::delete(&state.db, id)?;
    tracing::info!(id, "Deleted conversation");
    Ok(Json(json!({ "success": true })))
}

pub async fn append_message(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<NewMessage>,
) -> Result<Json<StoredMessage>, AppError> {
    Ok(Json(store::append_message(&state.db, id, input)?))
}
