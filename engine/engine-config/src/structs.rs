//! Configuration struct definitions.
//!
//! All config structs with serde deserialization support and default
//! values.

use crate::defaults;
use serde::Deserialize;

// ============================================================================
// Serde default functions (required for #[serde(default = "...")])
// ============================================================================

fn d_data_dir() -> String {
    defaults::DATA_DIR.into()
}
fn d_log_level() -> String {
    defaults::LOG_LEVEL.into()
}
fn d_debug() -> bool {
    defaults::DEBUG
}
fn d_backend() -> String {
    defaults::BACKEND.into()
}
fn d_static_batch_size() -> i64 {
    defaults::STATIC_BATCH_SIZE
}
fn d_enable_graph_capture() -> bool {
    defaults::ENABLE_GRAPH_CAPTURE
}
fn d_enable_cache() -> bool {
    defaults::ENABLE_CACHE
}
fn d_cache_capacity() -> usize {
    defaults::CACHE_CAPACITY
}
fn d_threads() -> usize {
    defaults::THREADS
}
fn d_komi() -> f32 {
    defaults::KOMI
}
fn d_num_visits() -> u32 {
    defaults::NUM_VISITS
}
fn d_output_size() -> usize {
    defaults::OUTPUT_SIZE
}
fn d_black_threshold() -> f32 {
    defaults::BLACK_THRESHOLD
}
fn d_white_threshold() -> f32 {
    defaults::WHITE_THRESHOLD
}
fn d_debounce_ms() -> u64 {
    defaults::DEBOUNCE_MS
}
fn d_model_dir() -> String {
    defaults::MODEL_DIR.into()
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Root configuration structure matching config.toml
#[derive(Debug, Deserialize, Default, Clone)]
pub struct CentralConfig {
    #[serde(default)]
    pub common: CommonConfig,
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub recognition: RecognitionSection,
    #[serde(default)]
    pub service: ServiceSection,
}

/// Common configuration shared by all components
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CommonConfig {
    #[serde(default = "d_data_dir")]
    pub data_dir: String,
    #[serde(default = "d_log_level")]
    pub log_level: String,
    /// Gates verbose diagnostic emission.
    #[serde(default = "d_debug")]
    pub debug: bool,
}

impl Default for CommonConfig {
    fn default() -> Self {
        Self {
            data_dir: defaults::DATA_DIR.into(),
            log_level: defaults::LOG_LEVEL.into(),
            debug: defaults::DEBUG,
        }
    }
}

/// Inference engine configuration
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngineSection {
    /// Preferred back-end name, or "auto" for the default preference
    /// order.
    #[serde(default = "d_backend")]
    pub backend: String,
    /// Compiled batch size; 0 = auto-detect from the model.
    #[serde(default = "d_static_batch_size")]
    pub static_batch_size: i64,
    #[serde(default = "d_enable_graph_capture")]
    pub enable_graph_capture: bool,
    #[serde(default = "d_enable_cache")]
    pub enable_cache: bool,
    #[serde(default = "d_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default = "d_threads")]
    pub threads: usize,
    #[serde(default = "d_komi")]
    pub default_komi: f32,
    #[serde(default = "d_num_visits")]
    pub default_num_visits: u32,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            backend: defaults::BACKEND.into(),
            static_batch_size: defaults::STATIC_BATCH_SIZE,
            enable_graph_capture: defaults::ENABLE_GRAPH_CAPTURE,
            enable_cache: defaults::ENABLE_CACHE,
            cache_capacity: defaults::CACHE_CAPACITY,
            threads: defaults::THREADS,
            default_komi: defaults::KOMI,
            default_num_visits: defaults::NUM_VISITS,
        }
    }
}

/// Board recognition configuration
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RecognitionSection {
    #[serde(default = "d_output_size")]
    pub output_size: usize,
    #[serde(default = "d_black_threshold")]
    pub black_threshold: f32,
    #[serde(default = "d_white_threshold")]
    pub white_threshold: f32,
}

impl Default for RecognitionSection {
    fn default() -> Self {
        Self {
            output_size: defaults::OUTPUT_SIZE,
            black_threshold: defaults::BLACK_THRESHOLD,
            white_threshold: defaults::WHITE_THRESHOLD,
        }
    }
}

/// Service / façade configuration
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceSection {
    /// Corner-drag debounce window in milliseconds.
    #[serde(default = "d_debounce_ms")]
    pub debounce_ms: u64,
    /// Directory of the persisted model store.
    #[serde(default = "d_model_dir")]
    pub model_dir: String,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            debounce_ms: defaults::DEBOUNCE_MS,
            model_dir: defaults::MODEL_DIR.into(),
        }
    }
}
