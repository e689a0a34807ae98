//! The sente analysis service: a single asynchronous façade over the
//! board-recognition pipeline and the neural inference engine.
//!
//! The host application (a UI layer) owns one [`AnalysisService`] and
//! calls it from its main context; a dedicated worker thread runs every
//! pipeline. Requests carry sequence numbers, corner-drag bursts are
//! debounced, and superseded responses are discarded on return, so at
//! most one live response exists per user intent.

pub mod error;
pub mod facade;
pub mod model_store;
pub mod protocol;
mod worker;

pub use error::ServiceError;
pub use facade::AnalysisService;
pub use model_store::ModelStore;
pub use protocol::{
    AnalyzeOptions, BatchItem, ImagePayload, LoadModelOptions, RecognizeOptions, RuntimeInfoDto,
};
pub use worker::BenchmarkDto;

/// Initialise tracing for a host binary; `debug` widens the filter.
pub fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
