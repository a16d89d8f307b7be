//! Catalog and testimonial storage.
//!
//! This module provides:
//! - Record types for gifts, testimonials and their similarity matches
//! - `SimilarityIndex`: abstract trait over the two vector search functions
//! - `SqliteGiftStore`: sqlite-backed implementation in the `sqlite` module

mod sqlite;

pub use sqlite::SqliteGiftStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A catalog gift as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gift {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: Option<f64>,
    pub image_url: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields accepted when creating a gift.
#[derive(Debug, Clone, Deserialize)]
pub struct NewGift {
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: Option<f64>,
    pub image_url: Option<String>,
}

/// A posted testimonial. `gift_name` is resolved from the referenced gift
/// when listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Testimonial {
    pub id: String,
    pub gift_id: Option<String>,
    pub gift_name: Option<String>,
    pub title: String,
    pub content: String,
    pub situation: String,
    pub created_at: String,
}

/// A testimonial scored against a query embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestimonialMatch {
    pub id: String,
    pub gift_id: Option<String>,
    pub title: String,
    pub content: String,
    pub situation: String,
    /// Similarity to the query, 0.0-1.0 (higher = better).
    pub similarity: f32,
}

/// A catalog gift scored against a query embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GiftMatch {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: Option<f64>,
    /// Similarity to the query, 0.0-1.0 (higher = better).
    pub similarity: f32,
}

/// The two logical vector search functions consumed by the context builder.
///
/// Implementations must return records with similarity at or above
/// `threshold`, sorted by descending similarity, at most `count` of them.
#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    async fn match_testimonials(
        &self,
        query_embedding: &[f32],
        threshold: f32,
        count: usize,
    ) -> Result<Vec<TestimonialMatch>, StoreError>;

    async fn match_gifts(
        &self,
        query_embedding: &[f32],
        threshold: f32,
        count: usize,
    ) -> Result<Vec<GiftMatch>, StoreError>;
}
