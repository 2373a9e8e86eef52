//! Error types for the prediction service

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PredictorError>;

/// Failures surfaced by the fetch → feature → infer pipeline.
///
/// Feature-alignment misses (a trained column absent from fresh data)
/// are not errors: they are filled with 0 and logged as warnings.
#[derive(Error, Debug)]
pub enum PredictorError {
    /// Provider unreachable, unknown symbol, or empty/malformed series
    #[error("Data fetch failed: {0}")]
    DataFetch(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Inference attempted with no classifier loaded
    #[error("Model not trained yet; train or load a model first")]
    UntrainedModel,

    #[error("Model persistence failed: {0}")]
    Persistence(String),

    /// Catch-all for any other failure during prediction
    #[error("Prediction failed: {0}")]
    Prediction(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PredictorError::DataFetch("symbol UNKNOWN not found".to_string());
        assert!(err.to_string().contains("UNKNOWN"));

        let err = PredictorError::UntrainedModel;
        assert!(err.to_string().contains("not trained"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: PredictorError = io_err.into();
        assert!(matches!(err, PredictorError::Io(_)));
    }
}
