//! Configuration loading logic.
//!
//! Handles loading config from files and applying environment variable
//! overrides.

use crate::CentralConfig;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Standard locations to search for config.toml
pub const CONFIG_SEARCH_PATHS: &[&str] = &[
    "config.toml",    // Current directory
    "../config.toml", // Parent directory (when running from subdirectory)
];

/// Load the central configuration from config.toml.
///
/// Searches for config.toml in the following order:
/// 1. Path specified by SENTE_CONFIG environment variable
/// 2. Current directory (config.toml)
/// 3. Parent directory (../config.toml)
///
/// After loading, environment variable overrides are applied.
pub fn load_config() -> CentralConfig {
    if let Ok(path) = std::env::var("SENTE_CONFIG") {
        let path = PathBuf::from(&path);
        if path.exists() {
            info!("Loading config from SENTE_CONFIG: {}", path.display());
            return load_from_path(&path);
        }
        warn!(
            "SENTE_CONFIG={} not found, searching defaults",
            path.display()
        );
    }

    for path_str in CONFIG_SEARCH_PATHS {
        let path = PathBuf::from(path_str);
        if path.exists() {
            info!("Loading config from {}", path.display());
            return load_from_path(&path);
        }
    }

    debug!("No config.toml found, using built-in defaults");
    apply_env_overrides(CentralConfig::default())
}

/// Load configuration from a specific path.
pub fn load_from_path(path: &PathBuf) -> CentralConfig {
    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => apply_env_overrides(config),
            Err(e) => {
                warn!("Failed to parse {}: {}, using defaults", path.display(), e);
                apply_env_overrides(CentralConfig::default())
            }
        },
        Err(e) => {
            warn!("Failed to read {}: {}, using defaults", path.display(), e);
            apply_env_overrides(CentralConfig::default())
        }
    }
}

/// Macro to reduce env override boilerplate
macro_rules! env_override {
    // String field
    ($config:expr, $section:ident . $field:ident, $key:expr) => {
        if let Ok(v) = std::env::var($key) {
            $config.$section.$field = v;
        }
    };
    // Parseable field (i64, u64, f32, bool, etc.)
    ($config:expr, $section:ident . $field:ident, $key:expr, parse) => {
        if let Ok(v) =
            std::env::var($key).and_then(|s| s.parse().map_err(|_| std::env::VarError::NotPresent))
        {
            $config.$section.$field = v;
        }
    };
}

/// Apply environment variable overrides to a configuration.
///
/// Environment variables follow the pattern: SENTE_<SECTION>_<KEY>
pub fn apply_env_overrides(mut config: CentralConfig) -> CentralConfig {
    // Common
    env_override!(config, common.data_dir, "SENTE_COMMON_DATA_DIR");
    env_override!(config, common.log_level, "SENTE_COMMON_LOG_LEVEL");
    env_override!(config, common.debug, "SENTE_COMMON_DEBUG", parse);

    // Engine
    env_override!(config, engine.backend, "SENTE_ENGINE_BACKEND");
    env_override!(
        config,
        engine.static_batch_size,
        "SENTE_ENGINE_STATIC_BATCH_SIZE",
        parse
    );
    env_override!(
        config,
        engine.enable_graph_capture,
        "SENTE_ENGINE_ENABLE_GRAPH_CAPTURE",
        parse
    );
    env_override!(config, engine.enable_cache, "SENTE_ENGINE_ENABLE_CACHE", parse);
    env_override!(
        config,
        engine.cache_capacity,
        "SENTE_ENGINE_CACHE_CAPACITY",
        parse
    );
    env_override!(config, engine.threads, "SENTE_ENGINE_THREADS", parse);
    env_override!(config, engine.default_komi, "SENTE_ENGINE_DEFAULT_KOMI", parse);
    env_override!(
        config,
        engine.default_num_visits,
        "SENTE_ENGINE_DEFAULT_NUM_VISITS",
        parse
    );

    // Recognition
    env_override!(
        config,
        recognition.output_size,
        "SENTE_RECOGNITION_OUTPUT_SIZE",
        parse
    );
    env_override!(
        config,
        recognition.black_threshold,
        "SENTE_RECOGNITION_BLACK_THRESHOLD",
        parse
    );
    env_override!(
        config,
        recognition.white_threshold,
        "SENTE_RECOGNITION_WHITE_THRESHOLD",
        parse
    );

    // Service
    env_override!(config, service.debounce_ms, "SENTE_SERVICE_DEBOUNCE_MS", parse);
    env_override!(config, service.model_dir, "SENTE_SERVICE_MODEL_DIR");

    config
}
