//! Error types for the command-line runner.

use thiserror::Error;
use worldweaver_core::error::ImprovementError;

/// Startup and runtime errors for the command-line runner.
#[derive(Debug, Error)]
pub enum AppError {
    /// A command-line argument or environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// The world file could not be read or written.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The world file is not a valid storylet list.
    #[error("invalid world file: {0}")]
    Json(#[from] serde_json::Error),

    /// The engine refused to start or the store failed.
    #[error("engine error: {0}")]
    Engine(#[from] ImprovementError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_errors_keep_their_message() {
        let error = AppError::from(ImprovementError::Configuration("empty table".into()));

        assert_eq!(
            error.to_string(),
            "engine error: configuration error: empty table"
        );
    }

    #[test]
    fn test_json_errors_convert() {
        let parse = serde_json::from_str::<Vec<u8>>("{").unwrap_err();

        assert!(matches!(AppError::from(parse), AppError::Json(_)));
    }
}
