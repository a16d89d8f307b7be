use std::sync::Arc;

use crate::core::config::{AppPaths, ConfigService};
use crate::embedding::{EmbeddingService, EmbeddingSettings, OpenAiEmbeddingClient};
use crate::llm::{ChatSettings, OpenAiChatClient};
use crate::recommend::{ContextBuilder, RetrievalPolicy};
use crate::store::{SimilarityIndex, SqliteGiftStore};

pub mod error;

use error::InitializationError;

/// Global application state shared across all routes.
///
/// Contains the configuration, the gift/testimonial store, the embedding
/// and chat clients, and the recommendation context builder wired on top
/// of them.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: ConfigService,
    pub gifts: SqliteGiftStore,
    pub embedder: Arc<dyn EmbeddingService>,
    pub chat: OpenAiChatClient,
    pub recommender: ContextBuilder,
}

impl AppState {
    pub async fn initialize() -> Result<Arc<Self>, InitializationError> {
        let paths = Arc::new(AppPaths::new());
        let config = ConfigService::new(paths.clone());
        let config_value = config.load_config();

        let gifts = SqliteGiftStore::new(paths.as_ref()).await?;

        let embedder: Arc<dyn EmbeddingService> = Arc::new(OpenAiEmbeddingClient::new(
            EmbeddingSettings::from_config(&config_value),
        ));
        let chat = OpenAiChatClient::new(ChatSettings::from_config(&config_value));

        let index: Arc<dyn SimilarityIndex> = Arc::new(gifts.clone());
        let recommender = ContextBuilder::new(
            embedder.clone(),
            index,
            RetrievalPolicy::from_config(&config_value),
        );

        Ok(Arc::new(AppState {
            paths,
            config,
            gifts,
            embedder,
            chat,
            recommender,
        }))
    }
}
