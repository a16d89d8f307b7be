use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::embedding::EmbeddingService;
use crate::state::AppState;
use crate::store::{Gift, NewGift};

const DEFAULT_LIST_LIMIT: usize = 12;

pub async fn list_gifts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = params
        .get("limit")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(DEFAULT_LIST_LIMIT);

    let gifts = state.gifts.list_gifts(limit).await?;
    Ok(Json(json!({ "data": gifts })))
}

pub async fn create_gift(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewGift>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name is required".to_string()));
    }

    // A failed embedding is repaired later by the backfill, so the gift is
    // stored either way.
    let embedding = match state.embedder.embed(&gift_embedding_text(&payload)).await {
        Ok(vector) => Some(vector),
        Err(err) => {
            tracing::warn!("Embedding new gift failed, storing without: {}", err);
            None
        }
    };

    let gift = state
        .gifts
        .insert_gift(&payload, embedding.as_deref())
        .await?;
    Ok(Json(json!({ "data": gift })))
}

pub async fn get_gift(
    State(state): State<Arc<AppState>>,
    Path(gift_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let gift = state
        .gifts
        .get_gift(&gift_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Gift not found".to_string()))?;
    Ok(Json(gift))
}

pub async fn delete_gift(
    State(state): State<Arc<AppState>>,
    Path(gift_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state.gifts.delete_gift(&gift_id).await?;
    if !deleted {
        return Err(ApiError::NotFound("Gift not found".to_string()));
    }
    Ok(Json(json!({ "deleted": true })))
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub ids: Vec<String>,
}

/// Resolves a list of gift ids to full records, preserving the requested
/// order and dropping unknown ids.
pub async fn gifts_batch(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<BatchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.ids.is_empty() {
        return Err(ApiError::BadRequest("ids must not be empty".to_string()));
    }

    let gifts = state.gifts.gifts_by_ids(&payload.ids).await?;
    Ok(Json(gifts))
}

#[derive(Debug, Deserialize)]
pub struct RecommendRequest {
    pub message: String,
}

/// Builds the recommendation context for `message` and returns the ranked
/// gift ids resolved into full catalog records.
pub async fn recommend_gifts(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RecommendRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let built = state.recommender.build(&payload.message).await?;

    if built.recommended_gift_ids.is_empty() {
        return Ok(Json(Vec::<Gift>::new()));
    }

    tracing::debug!(ids = ?built.recommended_gift_ids, "Resolving recommended gifts");
    let gifts = state.gifts.gifts_by_ids(&built.recommended_gift_ids).await?;
    Ok(Json(gifts))
}

/// Admin batch job: recomputes the embedding of every stored gift.
///
/// Guarded by the `x-admin-key` header matched against `GIFTWISE_ADMIN_KEY`.
pub async fn backfill_embeddings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    require_admin_key(&headers)?;

    let gifts = state.gifts.list_all_gifts().await?;
    tracing::info!("Backfilling embeddings for {} gifts", gifts.len());

    let mut processed = 0usize;
    let mut errors = 0usize;

    for gift in &gifts {
        let text = stored_gift_embedding_text(gift);
        match state.embedder.embed(&text).await {
            Ok(vector) => match state.gifts.update_gift_embedding(&gift.id, &vector).await {
                Ok(()) => processed += 1,
                Err(err) => {
                    tracing::error!("Failed to store embedding for gift {}: {}", gift.id, err);
                    errors += 1;
                }
            },
            Err(err) => {
                tracing::error!("Failed to embed gift {}: {}", gift.id, err);
                errors += 1;
            }
        }
    }

    Ok(Json(json!({
        "processed": processed,
        "errors": errors,
        "total": gifts.len(),
        "completed_at": chrono::Utc::now().to_rfc3339(),
    })))
}

fn require_admin_key(headers: &HeaderMap) -> Result<(), ApiError> {
    let expected = env::var("GIFTWISE_ADMIN_KEY").map_err(|_| ApiError::Unauthorized)?;
    let provided = headers
        .get("x-admin-key")
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;

    if provided != expected {
        return Err(ApiError::Unauthorized);
    }
    Ok(())
}

/// Textualizes a gift for embedding, skipping absent fields.
fn gift_embedding_text(gift: &NewGift) -> String {
    let mut text = format!("Gift name: {}", gift.name);
    if let Some(description) = &gift.description {
        text.push_str(&format!("\nDescription: {}", description));
    }
    if let Some(category) = &gift.category {
        text.push_str(&format!("\nCategory: {}", category));
    }
    if let Some(price) = gift.price {
        text.push_str(&format!("\nPrice: {}", price));
    }
    text
}

fn stored_gift_embedding_text(gift: &Gift) -> String {
    gift_embedding_text(&NewGift {
        name: gift.name.clone(),
        description: gift.description.clone(),
        category: gift.category.clone(),
        price: gift.price,
        image_url: gift.image_url.clone(),
    })
}
