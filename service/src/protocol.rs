//! Request and response types crossing the façade boundary.
//!
//! Every payload is a typed envelope: the façade stamps a sequence
//! number on submission and filters stale responses on return. Binary
//! buffers (images, model bytes) move through the channel by ownership,
//! never by copy. Unknown option fields are rejected at
//! deserialization, not silently ignored.

use serde::{Deserialize, Serialize};

use goban::{KoRestriction, Player};
use recognition::{Hint, Point};

use crate::error::ServiceError;

/// A raw RGBA image handed across the boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ImagePayload {
    /// Tightly packed RGBA bytes, row-major.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl ImagePayload {
    /// Decode into an image buffer, consuming the payload.
    pub fn into_image(self) -> Result<image::RgbaImage, ServiceError> {
        let expected = self.width as usize * self.height as usize * 4;
        if self.data.len() != expected {
            return Err(ServiceError::Load(format!(
                "image buffer is {} bytes, expected {} for {}x{} RGBA",
                self.data.len(),
                expected,
                self.width,
                self.height
            )));
        }
        image::RgbaImage::from_raw(self.width, self.height, self.data)
            .ok_or_else(|| ServiceError::Load("image decode failed".to_string()))
    }
}

fn default_output_size() -> usize {
    engine_config::OUTPUT_SIZE
}
fn default_black_threshold() -> f32 {
    engine_config::BLACK_THRESHOLD
}
fn default_white_threshold() -> f32 {
    engine_config::WHITE_THRESHOLD
}
fn default_komi() -> f32 {
    engine_config::KOMI
}
fn default_num_visits() -> u32 {
    engine_config::NUM_VISITS
}

/// Options for recognition requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RecognizeOptions {
    pub board_size: usize,
    #[serde(default = "default_output_size")]
    pub output_size: usize,
    #[serde(default = "default_black_threshold")]
    pub black_threshold: f32,
    #[serde(default = "default_white_threshold")]
    pub white_threshold: f32,
    #[serde(default)]
    pub grid_corners: Option<[Point; 4]>,
}

impl RecognizeOptions {
    pub fn new(board_size: usize) -> Self {
        Self {
            board_size,
            output_size: default_output_size(),
            black_threshold: default_black_threshold(),
            white_threshold: default_white_threshold(),
            grid_corners: None,
        }
    }
}

/// Options for position analysis requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AnalyzeOptions {
    #[serde(default = "default_komi")]
    pub komi: f32,
    /// None means infer from the stone balance.
    #[serde(default)]
    pub next_to_play: Option<Player>,
    /// Recent moves as display coordinates, oldest first.
    #[serde(default)]
    pub history: Vec<String>,
    #[serde(default)]
    pub ko_info: Option<KoRestriction>,
    #[serde(default = "default_num_visits")]
    pub num_visits: u32,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            komi: default_komi(),
            next_to_play: None,
            history: Vec::new(),
            ko_info: None,
            num_visits: default_num_visits(),
        }
    }
}

/// One item of a batch analysis request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BatchItem {
    pub sign_map: Vec<Vec<i8>>,
    #[serde(default)]
    pub options: AnalyzeOptions,
}

/// Engine construction options for model loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LoadModelOptions {
    pub board_size: usize,
    /// Back-end preference order; empty means the default order.
    #[serde(default)]
    pub backend_preference: Vec<inference::Backend>,
    #[serde(default)]
    pub wasm_path: Option<String>,
    #[serde(default)]
    pub enable_graph_capture: bool,
    /// None or 0 means auto-detect from the model.
    #[serde(default)]
    pub static_batch_size: Option<usize>,
    #[serde(default)]
    pub threads: usize,
    #[serde(default = "default_enable_cache")]
    pub enable_cache: bool,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

fn default_enable_cache() -> bool {
    engine_config::ENABLE_CACHE
}
fn default_cache_capacity() -> usize {
    engine_config::CACHE_CAPACITY
}

impl LoadModelOptions {
    pub fn new(board_size: usize) -> Self {
        Self {
            board_size,
            backend_preference: Vec::new(),
            wasm_path: None,
            enable_graph_capture: false,
            static_batch_size: None,
            threads: 0,
            enable_cache: default_enable_cache(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

/// Serializable view of the engine's runtime state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeInfoDto {
    pub backend: inference::Backend,
    pub requested_backend: inference::Backend,
    pub did_fallback: bool,
    pub element_type: String,
    pub static_batch_size: usize,
    pub graph_capture: bool,
    /// Whether the model bytes were rewritten before session creation.
    pub was_rewritten: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_option_rejected() {
        let json = r#"{"komi": 6.5, "turboMode": true}"#;
        let parsed: Result<AnalyzeOptions, _> = serde_json::from_str(json);
        assert!(parsed.is_err(), "unknown fields must be rejected");
    }

    #[test]
    fn test_analyze_defaults() {
        let parsed: AnalyzeOptions = serde_json::from_str("{}").unwrap();
        assert!((parsed.komi - 7.5).abs() < f32::EPSILON);
        assert_eq!(parsed.num_visits, 1);
        assert!(parsed.next_to_play.is_none());
    }

    #[test]
    fn test_recognize_defaults() {
        let parsed: RecognizeOptions = serde_json::from_str(r#"{"boardSize": 19}"#).unwrap();
        assert_eq!(parsed.board_size, 19);
        assert_eq!(parsed.output_size, 800);
        assert!((parsed.black_threshold - 45.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_image_payload_length_check() {
        let payload = ImagePayload {
            data: vec![0; 12],
            width: 2,
            height: 2,
        };
        assert!(payload.into_image().is_err());

        let payload = ImagePayload {
            data: vec![0; 16],
            width: 2,
            height: 2,
        };
        assert!(payload.into_image().is_ok());
    }
}
