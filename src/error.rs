//! Error types for the WGAN-GP trainer

use thiserror::Error;

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, WganError>;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum WganError {
    /// Failure reported by libtorch
    #[error("Torch error: {0}")]
    Tch(#[from] tch::TchError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// TOML write error
    #[error("TOML write error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Dataset contains no images
    #[error("No images found under {0}")]
    EmptyDataset(String),

    /// Tensor shapes do not line up
    #[error("Shape mismatch: {0}")]
    Shape(String),

    /// Data loading error
    #[error("Data error: {0}")]
    Data(String),
}

impl WganError {
    /// Build a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Build a data error
    pub fn data(msg: impl Into<String>) -> Self {
        Self::Data(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = WganError::config("batch size must be > 0");
        assert_eq!(err.to_string(), "Invalid configuration: batch size must be > 0");

        let err = WganError::EmptyDataset("/datasets/lsun".to_string());
        assert!(err.to_string().contains("/datasets/lsun"));
    }

    #[test]
    fn test_io_conversion() {
        fn open_missing() -> Result<String> {
            Ok(std::fs::read_to_string("/definitely/not/here.toml")?)
        }
        assert!(matches!(open_missing(), Err(WganError::Io(_))));
    }
}
