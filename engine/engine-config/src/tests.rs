//! Tests for the configuration module.

use super::*;

#[test]
fn test_default_config() {
    let config = CentralConfig::default();
    assert_eq!(config.common.data_dir, "./data");
    assert_eq!(config.common.log_level, "info");
    assert!(!config.common.debug);
    assert_eq!(config.engine.backend, "auto");
    assert_eq!(config.engine.static_batch_size, 0);
    assert!(config.engine.enable_cache);
    assert_eq!(config.engine.cache_capacity, 1000);
}

#[test]
fn test_engine_defaults() {
    let config = CentralConfig::default();
    assert!(!config.engine.enable_graph_capture);
    assert_eq!(config.engine.threads, 0);
    assert!((config.engine.default_komi - 7.5).abs() < f32::EPSILON);
    assert_eq!(config.engine.default_num_visits, 1);
}

#[test]
fn test_recognition_defaults() {
    let config = CentralConfig::default();
    assert_eq!(config.recognition.output_size, 800);
    assert!((config.recognition.black_threshold - 45.0).abs() < f32::EPSILON);
    assert!((config.recognition.white_threshold - 30.0).abs() < f32::EPSILON);
}

#[test]
fn test_service_defaults() {
    let config = CentralConfig::default();
    assert_eq!(config.service.debounce_ms, 350);
    assert_eq!(config.service.model_dir, "./data/models");
}

#[test]
fn test_partial_toml_fills_defaults() {
    let config: CentralConfig = toml::from_str(
        r#"
        [engine]
        backend = "gpu-compute"
        cache_capacity = 64
        "#,
    )
    .unwrap();
    assert_eq!(config.engine.backend, "gpu-compute");
    assert_eq!(config.engine.cache_capacity, 64);
    // Untouched fields keep their defaults
    assert!(config.engine.enable_cache);
    assert_eq!(config.recognition.output_size, 800);
}

#[test]
fn test_empty_toml_is_all_defaults() {
    let config: CentralConfig = toml::from_str("").unwrap();
    assert_eq!(config.engine.cache_capacity, 1000);
    assert_eq!(config.service.debounce_ms, 350);
}
