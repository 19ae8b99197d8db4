use crate::semantic::{EmbeddingError, RankError};

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(#[from] EmbeddingError),

    #[error("ranking failed: {0}")]
    Ranking(#[from] RankError),

    #[error("hydration failed: {0:?}")]
    Hydration(anyhow::Error),

    #[error("unexpected error: {0:?}")]
    Other(#[from] anyhow::Error),
}
