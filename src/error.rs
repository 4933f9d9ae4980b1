use thiserror::Error;

#[derive(Error, Debug)]
pub enum VidshelfError {
    #[error("Catalog store unavailable: {0}")]
    StoreUnavailable(#[from] sqlx::Error),

    #[error("{0}")]
    NotFound(String),

    #[error("Frame extraction failed: {0}")]
    ExternalToolFailure(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VidshelfError {
    pub fn video_not_found() -> Self {
        Self::NotFound("Video not found".to_string())
    }

    pub fn thumbnail_not_found() -> Self {
        Self::NotFound("Thumbnail not found".to_string())
    }
}

pub type Result<T> = std::result::Result<T, VidshelfError>;
