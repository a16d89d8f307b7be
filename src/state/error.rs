use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("failed to initialize gift store: {0}")]
    Store(#[from] StoreError),
}
