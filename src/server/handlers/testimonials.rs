use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::embedding::EmbeddingService;
use crate::state::AppState;

const DEFAULT_LIST_LIMIT: usize = 20;

pub async fn list_testimonials(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = params
        .get("limit")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(DEFAULT_LIST_LIMIT);

    let testimonials = state.gifts.list_testimonials(limit).await?;
    Ok(Json(json!({ "data": testimonials })))
}

#[derive(Debug, Deserialize)]
pub struct CreateTestimonialRequest {
    pub gift_name: String,
    pub title: String,
    pub situation: String,
    pub content: String,
}

/// Stores a testimonial, resolving (or creating) its gift by name and
/// indexing it under an embedding of its textualized fields.
///
/// Unlike gift creation, the embedding is required here: an unindexed
/// testimonial would never surface in retrieval, so a failed embedding
/// fails the request.
pub async fn create_testimonial(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateTestimonialRequest>,
) -> Result<impl IntoResponse, ApiError> {
    for (field, value) in [
        ("gift_name", &payload.gift_name),
        ("title", &payload.title),
        ("situation", &payload.situation),
        ("content", &payload.content),
    ] {
        if value.trim().is_empty() {
            return Err(ApiError::BadRequest(format!("{} is required", field)));
        }
    }

    let gift = state.gifts.find_or_create_gift(payload.gift_name.trim()).await?;

    let text = testimonial_embedding_text(
        &payload.title,
        &payload.content,
        &payload.situation,
        &gift.name,
    );
    let embedding = state.embedder.embed(&text).await?;

    let testimonial = state
        .gifts
        .insert_testimonial(
            Some(&gift.id),
            payload.title.trim(),
            payload.content.trim(),
            payload.situation.trim(),
            &embedding,
        )
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": testimonial,
    })))
}

fn testimonial_embedding_text(
    title: &str,
    content: &str,
    situation: &str,
    gift_name: &str,
) -> String {
    format!(
        "Title: {}\nContent: {}\nSituation: {}\nGift: {}",
        title, content, situation, gift_name
    )
}
