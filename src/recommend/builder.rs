use std::sync::Arc;

use serde_json::Value;

use super::error::RecommendError;
use super::merge::rank_candidates;
use super::render::render_context;
use super::types::RecommendationContext;
use crate::embedding::EmbeddingService;
use crate::store::SimilarityIndex;

const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.5;
const DEFAULT_MATCH_COUNT: usize = 5;
const DEFAULT_MIN_PRIMARY_MATCHES: usize = 3;

/// Tunable retrieval constants.
///
/// Defaults: similarity threshold 0.5, result cap 5 per search, catalog
/// fallback when fewer than 3 testimonials match.
#[derive(Debug, Clone)]
pub struct RetrievalPolicy {
    /// Minimum similarity for a stored record to count as a match.
    pub similarity_threshold: f32,
    /// Result-count cap per search call.
    pub match_count: usize,
    /// The catalog fallback search runs when the testimonial search
    /// returns fewer matches than this.
    pub min_primary_matches: usize,
}

impl Default for RetrievalPolicy {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            match_count: DEFAULT_MATCH_COUNT,
            min_primary_matches: DEFAULT_MIN_PRIMARY_MATCHES,
        }
    }
}

impl RetrievalPolicy {
    /// Reads the `retrieval` section of the config, falling back to the
    /// documented defaults for missing keys.
    pub fn from_config(config: &Value) -> Self {
        let section = config.get("retrieval");
        let defaults = Self::default();

        let similarity_threshold = section
            .and_then(|s| s.get("similarity_threshold"))
            .and_then(|v| v.as_f64())
            .map(|v| v as f32)
            .unwrap_or(defaults.similarity_threshold);

        let match_count = section
            .and_then(|s| s.get("match_count"))
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(defaults.match_count);

        let min_primary_matches = section
            .and_then(|s| s.get("min_primary_matches"))
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(defaults.min_primary_matches);

        Self {
            similarity_threshold,
            match_count,
            min_primary_matches,
        }
    }
}

/// Builds a recommendation context for one user query.
///
/// Each call is self-contained: no state is carried across invocations, so
/// concurrent builds need no coordination. The three outbound calls form a
/// linear dependency chain and are awaited sequentially; the builder
/// performs no writes, so cancelling it at any await point is safe.
#[derive(Clone)]
pub struct ContextBuilder {
    embedder: Arc<dyn EmbeddingService>,
    index: Arc<dyn SimilarityIndex>,
    policy: RetrievalPolicy,
}

impl ContextBuilder {
    pub fn new(
        embedder: Arc<dyn EmbeddingService>,
        index: Arc<dyn SimilarityIndex>,
        policy: RetrievalPolicy,
    ) -> Self {
        Self {
            embedder,
            index,
            policy,
        }
    }

    pub fn policy(&self) -> &RetrievalPolicy {
        &self.policy
    }

    /// Builds the context for `query_text`.
    ///
    /// Embedding failure is fatal. Either search failing is not: a failed
    /// testimonial search degrades to no evidence (without triggering the
    /// catalog fallback), a failed catalog search degrades to a
    /// testimonial-only context.
    pub async fn build(&self, query_text: &str) -> Result<RecommendationContext, RecommendError> {
        let query = query_text.trim();
        if query.is_empty() {
            return Err(RecommendError::InvalidQuery);
        }

        let embedding = self
            .embedder
            .embed(query)
            .await
            .map_err(RecommendError::Embedding)?;

        let primary = match self
            .index
            .match_testimonials(
                &embedding,
                self.policy.similarity_threshold,
                self.policy.match_count,
            )
            .await
        {
            Ok(matches) => Some(matches),
            Err(err) => {
                tracing::warn!("Testimonial search unavailable: {}", err);
                None
            }
        };

        // The fallback fires on a thin-but-successful primary search only;
        // a failed primary search is not treated as "zero matches".
        let fallback_due = primary
            .as_ref()
            .is_some_and(|matches| matches.len() < self.policy.min_primary_matches);

        let gifts = if fallback_due {
            match self
                .index
                .match_gifts(
                    &embedding,
                    self.policy.similarity_threshold,
                    self.policy.match_count,
                )
                .await
            {
                Ok(matches) => matches,
                Err(err) => {
                    tracing::warn!("Gift search unavailable: {}", err);
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let testimonials = primary.unwrap_or_default();
        tracing::debug!(
            testimonials = testimonials.len(),
            gifts = gifts.len(),
            fallback = fallback_due,
            "Retrieved recommendation evidence"
        );

        let ranked = rank_candidates(&testimonials, &gifts);
        let context = render_context(&testimonials, &gifts);

        Ok(RecommendationContext {
            context,
            recommended_gift_ids: ranked.into_iter().map(|c| c.id).collect(),
            testimonials,
            gifts,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::embedding::EmbeddingError;
    use crate::recommend::render::NO_EVIDENCE_FALLBACK;
    use crate::store::{GiftMatch, StoreError, TestimonialMatch};

    struct MockEmbedder {
        calls: AtomicUsize,
        fail: bool,
    }

    impl MockEmbedder {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: true,
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EmbeddingService for MockEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(EmbeddingError::Malformed("mock failure".to_string()));
            }
            Ok(vec![1.0, 0.0, 0.0])
        }
    }

    struct SpyIndex {
        testimonials: Result<Vec<TestimonialMatch>, String>,
        gifts: Result<Vec<GiftMatch>, String>,
        testimonial_calls: AtomicUsize,
        gift_calls: AtomicUsize,
    }

    impl SpyIndex {
        fn new(
            testimonials: Result<Vec<TestimonialMatch>, String>,
            gifts: Result<Vec<GiftMatch>, String>,
        ) -> Self {
            Self {
                testimonials,
                gifts,
                testimonial_calls: AtomicUsize::new(0),
                gift_calls: AtomicUsize::new(0),
            }
        }

        fn testimonial_call_count(&self) -> usize {
            self.testimonial_calls.load(Ordering::SeqCst)
        }

        fn gift_call_count(&self) -> usize {
            self.gift_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SimilarityIndex for SpyIndex {
        async fn match_testimonials(
            &self,
            _query_embedding: &[f32],
            _threshold: f32,
            _count: usize,
        ) -> Result<Vec<TestimonialMatch>, StoreError> {
            self.testimonial_calls.fetch_add(1, Ordering::SeqCst);
            match &self.testimonials {
                Ok(matches) => Ok(matches.clone()),
                Err(_) => Err(StoreError::Database(sqlx::Error::PoolClosed)),
            }
        }

        async fn match_gifts(
            &self,
            _query_embedding: &[f32],
            _threshold: f32,
            _count: usize,
        ) -> Result<Vec<GiftMatch>, StoreError> {
            self.gift_calls.fetch_add(1, Ordering::SeqCst);
            match &self.gifts {
                Ok(matches) => Ok(matches.clone()),
                Err(_) => Err(StoreError::Database(sqlx::Error::PoolClosed)),
            }
        }
    }

    fn testimonial(id: &str, gift_id: &str, similarity: f32) -> TestimonialMatch {
        TestimonialMatch {
            id: id.to_string(),
            gift_id: Some(gift_id.to_string()),
            title: format!("Testimonial {}", id),
            content: "content".to_string(),
            situation: "situation".to_string(),
            similarity,
        }
    }

    fn gift(id: &str, similarity: f32) -> GiftMatch {
        GiftMatch {
            id: id.to_string(),
            name: format!("Gift {}", id),
            description: None,
            category: None,
            price: None,
            similarity,
        }
    }

    fn builder(embedder: Arc<MockEmbedder>, index: Arc<SpyIndex>) -> ContextBuilder {
        ContextBuilder::new(embedder, index, RetrievalPolicy::default())
    }

    #[tokio::test]
    async fn empty_query_fails_before_any_external_call() {
        let embedder = Arc::new(MockEmbedder::new());
        let index = Arc::new(SpyIndex::new(Ok(vec![]), Ok(vec![])));
        let builder = builder(embedder.clone(), index.clone());

        for query in ["", "   ", "\n\t "] {
            let err = builder.build(query).await.unwrap_err();
            assert!(matches!(err, RecommendError::InvalidQuery));
        }

        assert_eq!(embedder.call_count(), 0);
        assert_eq!(index.testimonial_call_count(), 0);
        assert_eq!(index.gift_call_count(), 0);
    }

    #[tokio::test]
    async fn embedding_failure_aborts_before_search() {
        let embedder = Arc::new(MockEmbedder::failing());
        let index = Arc::new(SpyIndex::new(Ok(vec![]), Ok(vec![])));
        let builder = builder(embedder.clone(), index.clone());

        let err = builder.build("any gift").await.unwrap_err();
        assert!(matches!(err, RecommendError::Embedding(_)));
        assert_eq!(index.testimonial_call_count(), 0);
        assert_eq!(index.gift_call_count(), 0);
    }

    #[tokio::test]
    async fn no_evidence_yields_fallback_sentence_and_empty_ranking() {
        let embedder = Arc::new(MockEmbedder::new());
        let index = Arc::new(SpyIndex::new(Ok(vec![]), Ok(vec![])));
        let builder = builder(embedder, index);

        let built = builder.build("anything at all").await.unwrap();
        assert_eq!(built.context, NO_EVIDENCE_FALLBACK);
        assert!(built.recommended_gift_ids.is_empty());
    }

    #[tokio::test]
    async fn rich_primary_results_skip_the_fallback_search() {
        let embedder = Arc::new(MockEmbedder::new());
        let index = Arc::new(SpyIndex::new(
            Ok(vec![
                testimonial("t1", "g1", 0.91),
                testimonial("t2", "g2", 0.85),
                testimonial("t3", "g3", 0.70),
                testimonial("t4", "g4", 0.60),
            ]),
            Ok(vec![gift("g9", 0.99)]),
        ));
        let builder = builder(embedder, index.clone());

        let built = builder
            .build("coffee-loving coworker retirement gift")
            .await
            .unwrap();

        assert_eq!(index.testimonial_call_count(), 1);
        assert_eq!(index.gift_call_count(), 0);
        assert_eq!(
            built.recommended_gift_ids,
            vec!["g1", "g2", "g3", "g4"]
        );
        let mut last_pos = 0;
        for (number, title) in [
            (1, "Testimonial t1"),
            (2, "Testimonial t2"),
            (3, "Testimonial t3"),
            (4, "Testimonial t4"),
        ] {
            let block = format!("[Testimonial {}: {}]", number, title);
            let pos = built.context.find(&block).expect("block missing");
            assert!(pos >= last_pos);
            last_pos = pos;
        }
        assert!(!built.context.contains("[Related Gifts]"));
    }

    #[tokio::test]
    async fn thin_primary_results_invoke_the_fallback_exactly_once() {
        let embedder = Arc::new(MockEmbedder::new());
        let index = Arc::new(SpyIndex::new(
            Ok(vec![testimonial("t1", "g1", 0.55)]),
            Ok(vec![gift("g1", 0.80), gift("g2", 0.65)]),
        ));
        let builder = builder(embedder, index.clone());

        let built = builder.build("obscure gift").await.unwrap();

        assert_eq!(index.gift_call_count(), 1);
        // g1 ranks first only because the catalog value 0.80 replaced the
        // testimonial value 0.55; otherwise g2 at 0.65 would lead.
        assert_eq!(built.recommended_gift_ids, vec!["g1", "g2"]);
        assert!(built.context.contains("[Testimonial 1:"));
        assert!(built.context.contains("[Related Gifts]"));
        assert!(built.context.contains("1. Gift g1"));
        assert!(built.context.contains("2. Gift g2"));
    }

    #[tokio::test]
    async fn ranking_is_duplicate_free_and_non_increasing() {
        let embedder = Arc::new(MockEmbedder::new());
        let index = Arc::new(SpyIndex::new(
            Ok(vec![
                testimonial("t1", "g1", 0.70),
                testimonial("t2", "g1", 0.62),
            ]),
            Ok(vec![gift("g1", 0.70), gift("g2", 0.70)]),
        ));
        let builder = builder(embedder, index);

        let built = builder.build("tie break").await.unwrap();
        let mut unique = built.recommended_gift_ids.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), built.recommended_gift_ids.len());
        // Testimonial-sourced g1 keeps its position at the shared 0.70 score.
        assert_eq!(built.recommended_gift_ids, vec!["g1", "g2"]);
    }

    #[tokio::test]
    async fn primary_search_error_degrades_without_firing_fallback() {
        let embedder = Arc::new(MockEmbedder::new());
        let index = Arc::new(SpyIndex::new(
            Err("store down".to_string()),
            Ok(vec![gift("g1", 0.80)]),
        ));
        let builder = builder(embedder, index.clone());

        let built = builder.build("anything").await.unwrap();
        assert_eq!(index.gift_call_count(), 0);
        assert_eq!(built.context, NO_EVIDENCE_FALLBACK);
        assert!(built.recommended_gift_ids.is_empty());
    }

    #[tokio::test]
    async fn fallback_search_error_keeps_testimonial_context() {
        let embedder = Arc::new(MockEmbedder::new());
        let index = Arc::new(SpyIndex::new(
            Ok(vec![testimonial("t1", "g1", 0.55)]),
            Err("gift index down".to_string()),
        ));
        let builder = builder(embedder, index.clone());

        let built = builder.build("sparse evidence").await.unwrap();
        assert_eq!(index.gift_call_count(), 1);
        assert_eq!(built.recommended_gift_ids, vec!["g1"]);
        assert!(built.context.contains("[Testimonial 1:"));
        assert!(!built.context.contains("[Related Gifts]"));
    }

    #[test]
    fn policy_from_config_overrides_and_defaults() {
        let config = serde_json::json!({
            "retrieval": {
                "similarity_threshold": 0.35,
                "match_count": 8
            }
        });

        let policy = RetrievalPolicy::from_config(&config);
        assert!((policy.similarity_threshold - 0.35).abs() < f32::EPSILON);
        assert_eq!(policy.match_count, 8);
        assert_eq!(policy.min_primary_matches, 3);

        let defaults = RetrievalPolicy::from_config(&serde_json::Value::Null);
        assert!((defaults.similarity_threshold - 0.5).abs() < f32::EPSILON);
        assert_eq!(defaults.match_count, 5);
    }
}
