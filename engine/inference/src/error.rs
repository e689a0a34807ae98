//! Engine error taxonomy.
//!
//! Back-end fallback is deliberately not an error: a session that came up
//! on a weaker back-end is still a working session, and the fallback is
//! reported through [`crate::session::RuntimeInfo`] instead.

use thiserror::Error;

/// Errors surfaced by the inference engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The model bytes could not be loaded into any requested back-end.
    #[error("model load failed: {0}")]
    Load(String),

    /// Featurization or a runtime call failed and was not recoverable by
    /// the internal element-type retry.
    #[error("analysis failed: {0}")]
    Analysis(String),

    /// The request references a board size or batch size the engine is
    /// not compiled for.
    #[error("engine not configured for request: {0}")]
    Configuration(String),
}
