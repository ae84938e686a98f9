use thiserror::Error;

/// Failures that reject a whole workspace operation.
///
/// Per-file parse problems never surface here; they are logged, or for
/// platform files recorded as diagnostics.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Path does not exist: {path}")]
    PathNotFound { path: String },

    #[error("Workspace root is not a directory: {path}")]
    NotADirectory { path: String },

    #[error("Failed to enumerate workspace: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Invalid discovery pattern: {0}")]
    InvalidPattern(#[from] globset::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Path is outside the workspace: {path}")]
    OutsideWorkspace { path: String },
}
