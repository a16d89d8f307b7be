use serde::{Deserialize, Serialize};

use crate::store::{GiftMatch, TestimonialMatch};

/// A deduplicated recommendation candidate: one gift id with the best
/// similarity observed for it across all sources that mentioned it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub similarity: f32,
}

/// The result of one context build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationContext {
    /// Rendered evidence block for prompt injection. Never empty: either
    /// composed testimonial/catalog sections or the fixed fallback sentence.
    pub context: String,
    /// Unique gift ids, descending similarity, ties in first-seen order.
    pub recommended_gift_ids: Vec<String>,
    /// The testimonial records the context was built from.
    pub testimonials: Vec<TestimonialMatch>,
    /// The catalog records contributed by the fallback search, empty when
    /// the fallback did not fire or found nothing.
    pub gifts: Vec<GiftMatch>,
}
