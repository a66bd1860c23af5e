use thiserror::Error;

/// Library error type for slideshow operations.
#[derive(Debug, Error)]
pub enum Error {
    /// One or more configured photo directories are invalid or unreadable.
    #[error("invalid photo directory: {0}")]
    BadDir(String),

    /// The player was created outside of a tokio runtime.
    #[error("slideshow player requires a running tokio runtime")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

/// Why a single image could not be turned into a [`crate::events::LoadedImage`].
///
/// These never leave the loader pool; workers log them and move on.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read image: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("decode task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("{0}")]
    Other(String),
}
