//! Default configuration values.
//!
//! Single source of truth for every default used across the sente
//! components.

// Common defaults
pub const DATA_DIR: &str = "./data";
pub const LOG_LEVEL: &str = "info";
pub const DEBUG: bool = false;

// Engine defaults
pub const BACKEND: &str = "auto";
/// 0 means auto-detect from the model's first input dimension.
pub const STATIC_BATCH_SIZE: i64 = 0;
pub const ENABLE_GRAPH_CAPTURE: bool = false;
pub const ENABLE_CACHE: bool = true;
pub const CACHE_CAPACITY: usize = 1000;
/// 0 means derive from hardware parallelism (bounded at 8).
pub const THREADS: usize = 0;
pub const KOMI: f32 = 7.5;
pub const NUM_VISITS: u32 = 1;

// Recognition defaults
pub const OUTPUT_SIZE: usize = 800;
pub const BLACK_THRESHOLD: f32 = 45.0;
pub const WHITE_THRESHOLD: f32 = 30.0;

// Service defaults
pub const DEBOUNCE_MS: u64 = 350;
pub const MODEL_DIR: &str = "./data/models";
