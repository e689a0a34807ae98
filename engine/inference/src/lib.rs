//! Neural inference engine: featurization, ONNX Runtime session driving,
//! output decoding, and result caching for KataGo-style networks.
//!
//! The engine is created once per (model, back-end, batch, board-size)
//! combination and owned by a single worker; it exposes synchronous
//! `analyze` / `analyze_batch` entry points plus `benchmark` and
//! `runtime_info` for diagnostics.

pub mod backend;
pub mod cache;
pub mod decode;
pub mod error;
pub mod features;
pub mod session;

pub use backend::Backend;
pub use cache::FifoCache;
pub use decode::{decode_outputs, softmax, RawOutputs, TOP_MOVES};
pub use error::EngineError;
pub use features::{featurize, fill_features, NUM_BIN_FEATURES, NUM_GLOBAL_FEATURES};
pub use session::{BenchmarkResult, ElementType, Engine, EngineConfig, RuntimeInfo};
