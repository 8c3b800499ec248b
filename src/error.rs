//! Error types for hubert-frontend.

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid construction parameter or configuration file.
    ///
    /// Gate size of zero or larger than the channel count, an empty ensemble,
    /// a zero downsample factor, an unknown extractor key.
    #[error("config: {0}")]
    Config(String),

    /// Top-k gating hit channel slices whose retained values sum to zero.
    #[error("degenerate normalization: {positions} gated frame(s) sum to zero")]
    DegenerateNormalization {
        /// Number of (batch, time) positions with a zero sum.
        positions: usize,
    },

    /// Ensemble members disagree on batch size or frame count.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Candle tensor/model error.
    #[error("candle: {0}")]
    Candle(#[from] candle_core::Error),

    /// Audio decoding or resampling error.
    #[error("audio: {0}")]
    Audio(String),

    /// Model weight loading error.
    #[error("weight loading: {0}")]
    WeightLoad(String),

    /// I/O error.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// HuggingFace Hub or checkpoint download error.
    #[error("hub: {0}")]
    Hub(String),
}

impl From<hound::Error> for Error {
    fn from(error: hound::Error) -> Self {
        Error::Audio(error.to_string())
    }
}

#[cfg(feature = "hub")]
impl From<hf_hub::api::sync::ApiError> for Error {
    fn from(error: hf_hub::api::sync::ApiError) -> Self {
        Error::Hub(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = Error::Config("gate size 0".into());
        assert_eq!(err.to_string(), "config: gate size 0");

        let err = Error::DegenerateNormalization { positions: 3 };
        assert!(err.to_string().contains("3 gated frame(s)"));
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.wav");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("missing.wav"));
    }
}
