//! Retrieval-augmented recommendation context building.
//!
//! Turns a free-text user query into a ranked set of candidate gift ids and
//! a text block used to ground a generated reply:
//! 1. Embed the query
//! 2. Search stored testimonials for similar prior experiences
//! 3. If testimonial evidence is thin, search the gift catalog as a fallback
//! 4. Merge both result sets into one deduplicated, similarity-ranked list
//! 5. Render the evidence into a context block, or a fixed fallback sentence
//!    when nothing was found

mod builder;
mod error;
mod merge;
mod render;
mod types;

pub use builder::{ContextBuilder, RetrievalPolicy};
pub use error::RecommendError;
pub use merge::rank_candidates;
pub use render::{render_context, NO_EVIDENCE_FALLBACK};
pub use types::{Candidate, RecommendationContext};
