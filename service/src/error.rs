//! Service error taxonomy.
//!
//! Recoverable conditions (back-end fallback, the internal element-type
//! retry) never surface here; they are handled inside the worker or
//! reported as result metadata. What remains is the typed set a caller
//! can meaningfully react to.

use thiserror::Error;

use inference::EngineError;
use recognition::RecognitionError;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Image decode failed or a model/position payload is malformed.
    #[error("load error: {0}")]
    Load(String),

    /// Featurization, runtime, or recognition processing failed
    /// unrecoverably.
    #[error("analysis error: {0}")]
    Analysis(String),

    /// The request references a board size, batch size, or option the
    /// engine is not configured for.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Superseded by a newer request, or rejected by cancel_all /
    /// dispose.
    #[error("cancelled")]
    Cancelled,
}

impl From<EngineError> for ServiceError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Load(msg) => ServiceError::Load(msg),
            EngineError::Analysis(msg) => ServiceError::Analysis(msg),
            EngineError::Configuration(msg) => ServiceError::Configuration(msg),
        }
    }
}

impl From<RecognitionError> for ServiceError {
    fn from(err: RecognitionError) -> Self {
        match err {
            RecognitionError::InvalidImage(msg) => ServiceError::Load(msg),
            RecognitionError::UnsupportedBoardSize(size) => {
                ServiceError::Configuration(format!("unsupported board size {size}"))
            }
            RecognitionError::DegenerateGeometry(msg) => ServiceError::Analysis(msg),
        }
    }
}
