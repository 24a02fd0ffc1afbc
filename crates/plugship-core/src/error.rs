/// Core error types for plugship.
use std::path::PathBuf;

/// A specialized Result type for plugship operations.
pub type PlugshipResult<T> = Result<T, PlugshipError>;

/// Top-level error type shared by the catalog, archiver and config loader.
#[derive(Debug, thiserror::Error)]
pub enum PlugshipError {
    #[error("IO error: {source} ({path:?})")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("config error: {message} ({path:?})")]
    Config { message: String, path: PathBuf },

    #[error("archive entry escapes extraction root: {0}")]
    UnsafeEntry(String),
}

impl PlugshipError {
    /// Wrap an IO error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PlugshipError::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        PlugshipError::Config {
            message: message.into(),
            path: path.into(),
        }
    }
}
