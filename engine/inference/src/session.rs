//! ONNX Runtime session driver.
//!
//! One `Engine` owns one compiled session for one (model, back-end,
//! batch, board-size) combination. Requests are serialised by the owning
//! worker, so all entry points take `&mut self`; there is no internal
//! locking.

use std::path::PathBuf;
use std::time::Instant;

use half::f16;
use ndarray::{ArrayView2, ArrayView4};
use ort::session::Session;
use ort::value::TensorRef;
use tracing::{debug, info, warn};

use goban::{AnalysisResult, Position};
use mcts::evaluator::{EvaluatorError, PositionEvaluator};
use model_rewriter::proto::data_type;

use crate::backend::Backend;
use crate::cache::FifoCache;
use crate::decode::{decode_outputs, RawOutputs};
use crate::error::EngineError;
use crate::features::{self, NUM_BIN_FEATURES, NUM_GLOBAL_FEATURES};

/// Upper bound on runtime-internal threads.
const MAX_RUNTIME_THREADS: usize = 8;

/// Element type the session is fed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    F32,
    F16,
}

/// Engine construction parameters.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Back-ends to try, most preferred first. Empty means the default
    /// preference order.
    pub backend_preference: Vec<Backend>,
    /// Location of the portable runtime artefact, when the portable
    /// back-end is in play.
    pub wasm_path: Option<PathBuf>,
    pub enable_graph_capture: bool,
    /// Compiled batch size; None means auto-detect from the model.
    pub static_batch_size: Option<usize>,
    pub board_size: usize,
    /// Runtime-internal threads; zero means auto.
    pub threads: usize,
    pub enable_cache: bool,
    pub cache_capacity: usize,
}

impl EngineConfig {
    pub fn new(board_size: usize) -> Self {
        Self {
            backend_preference: Backend::default_preference(),
            wasm_path: None,
            enable_graph_capture: false,
            static_batch_size: None,
            board_size,
            threads: 0,
            enable_cache: true,
            cache_capacity: 1000,
        }
    }

    fn resolved_threads(&self) -> usize {
        if self.threads > 0 {
            return self.threads.min(MAX_RUNTIME_THREADS);
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(MAX_RUNTIME_THREADS)
    }
}

/// How the engine actually came up, as opposed to how it was asked to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeInfo {
    pub backend: Backend,
    pub requested_backend: Backend,
    pub did_fallback: bool,
    pub element_type: ElementType,
    pub static_batch_size: usize,
    pub graph_capture: bool,
}

/// Timing summary from [`Engine::benchmark`].
#[derive(Debug, Clone)]
pub struct BenchmarkResult {
    pub single_ms: f64,
    pub batch_ms: f64,
    pub batch_size: usize,
    pub inferences_per_second: f64,
}

/// Per-run outputs with their per-item strides.
struct NetworkOutputs {
    policy: Vec<f32>,
    policy_stride: usize,
    value: Vec<f32>,
    misc: Vec<f32>,
    misc_stride: usize,
    ownership: Option<Vec<f32>>,
}

/// Resolve the compiled batch size: explicit option first, then the
/// model's declared first dimension, then 1. Graph capture pins it to 1.
fn resolve_static_batch(
    explicit: Option<usize>,
    model_batch_dim: Option<i64>,
    graph_capture: bool,
) -> usize {
    let batch = explicit
        .or_else(|| model_batch_dim.map(|d| d as usize))
        .unwrap_or(1)
        .max(1);
    if graph_capture {
        1
    } else {
        batch
    }
}

/// IEEE-754 half conversion with subnormal results flushed to zero.
/// Overflow saturates to the signed infinity, which `f16::from_f32`
/// already provides.
fn f32_to_f16_flushed(value: f32) -> f16 {
    let half = f16::from_f32(value);
    if matches!(half.classify(), std::num::FpCategory::Subnormal) {
        if value.is_sign_negative() {
            f16::NEG_ZERO
        } else {
            f16::ZERO
        }
    } else {
        half
    }
}

/// Whether a runtime error indicates the model expected half-precision
/// input.
fn mentions_half_type(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("float16") || lower.contains("(half)")
}

pub struct Engine {
    session: Session,
    board_size: usize,
    runtime: RuntimeInfo,
    /// Once a run has succeeded (or the retry resolved a mismatch), the
    /// element mode no longer changes.
    element_pinned: bool,
    bin_input_name: String,
    global_input_name: String,
    policy_output: String,
    value_output: String,
    misc_output: String,
    ownership_output: Option<String>,
    /// Engine-owned input buffers, allocated once and reused by every
    /// run. Sized for the full compiled batch.
    scratch_bin: Vec<f32>,
    scratch_global: Vec<f32>,
    /// Half-precision mirrors of the scratch buffers, filled in place
    /// when the session is fed f16. Same lifetime as the engine.
    scratch_bin_f16: Vec<f16>,
    scratch_global_f16: Vec<f16>,
    cache: Option<FifoCache>,
    inference_runs: u64,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("board_size", &self.board_size)
            .field("runtime", &self.runtime)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Compile a session from model bytes, negotiating the back-end in
    /// preference order. Fails only when every candidate fails.
    pub fn new(model_bytes: &[u8], config: EngineConfig) -> Result<Self, EngineError> {
        let preference = if config.backend_preference.is_empty() {
            Backend::default_preference()
        } else {
            config.backend_preference.clone()
        };
        let requested = preference[0];

        // Element type and declared batch from the model's first input;
        // lookup failure means f32 until a run proves otherwise.
        let input_info = model_rewriter::inspect_first_input(model_bytes);
        let element_type = match input_info.as_ref().map(|i| i.elem_type) {
            Some(data_type::FLOAT16) => ElementType::F16,
            _ => ElementType::F32,
        };
        let model_batch_dim = input_info.as_ref().and_then(|i| i.batch_dim);

        let threads = config.resolved_threads();
        let mut chosen = None;
        for &backend in &preference {
            let Some(provider) = backend.execution_provider() else {
                warn!(backend = %backend, "back-end unavailable on this host, trying next");
                continue;
            };
            let built = Session::builder()
                .and_then(|b| b.with_execution_providers([provider]))
                .and_then(|b| b.with_intra_threads(threads))
                .and_then(|b| b.commit_from_memory(model_bytes));
            match built {
                Ok(session) => {
                    chosen = Some((backend, session));
                    break;
                }
                Err(err) => {
                    warn!(backend = %backend, error = %err, "session creation failed, trying next");
                }
            }
        }
        let Some((backend, session)) = chosen else {
            return Err(EngineError::Load(
                "no requested back-end could create a session".to_string(),
            ));
        };

        let did_fallback = backend != requested;
        // On the portable last resort neither graph capture nor
        // device-side input binding is possible.
        let graph_capture = config.enable_graph_capture
            && backend.supports_graph_capture()
            && backend != Backend::PortableBytecode;
        if backend == Backend::PortableBytecode {
            if let Some(path) = &config.wasm_path {
                debug!(path = %path.display(), "portable back-end runtime artefact");
            }
        }

        let static_batch_size =
            resolve_static_batch(config.static_batch_size, model_batch_dim, graph_capture);

        let inputs: Vec<String> = session.inputs.iter().map(|i| i.name.clone()).collect();
        if inputs.len() < 2 {
            return Err(EngineError::Load(format!(
                "model declares {} inputs, expected dense + global",
                inputs.len()
            )));
        }
        let outputs: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();
        let (policy_output, value_output, misc_output, ownership_output) =
            resolve_output_names(&outputs)?;

        let size = config.board_size;
        let runtime = RuntimeInfo {
            backend,
            requested_backend: requested,
            did_fallback,
            element_type,
            static_batch_size,
            graph_capture,
        };
        info!(
            backend = %runtime.backend,
            requested = %runtime.requested_backend,
            fallback = runtime.did_fallback,
            batch = runtime.static_batch_size,
            capture = runtime.graph_capture,
            "inference session ready"
        );

        Ok(Self {
            session,
            board_size: size,
            runtime,
            element_pinned: false,
            bin_input_name: inputs[0].clone(),
            global_input_name: inputs[1].clone(),
            policy_output,
            value_output,
            misc_output,
            ownership_output,
            scratch_bin: vec![0.0; static_batch_size * features::bin_len(size)],
            scratch_global: vec![0.0; static_batch_size * NUM_GLOBAL_FEATURES],
            scratch_bin_f16: vec![f16::ZERO; static_batch_size * features::bin_len(size)],
            scratch_global_f16: vec![f16::ZERO; static_batch_size * NUM_GLOBAL_FEATURES],
            cache: config
                .enable_cache
                .then(|| FifoCache::new(config.cache_capacity)),
            inference_runs: 0,
        })
    }

    pub fn runtime_info(&self) -> &RuntimeInfo {
        &self.runtime
    }

    pub fn board_size(&self) -> usize {
        self.board_size
    }

    /// Back-ends constructible on this host.
    pub fn capabilities() -> Vec<Backend> {
        [
            Backend::PortableBytecode,
            Backend::GpuCompute,
            Backend::NeuralCoprocessor,
            Backend::Native,
            Backend::NativeCpu,
            Backend::NativeGpuTensor,
        ]
        .into_iter()
        .filter(|b| b.is_available())
        .collect()
    }

    /// Number of network runs performed so far; cache hits do not count.
    pub fn inference_count(&self) -> u64 {
        self.inference_runs
    }

    /// Analyse a single position from the network alone (one visit).
    pub fn analyze(&mut self, position: &Position) -> Result<AnalysisResult, EngineError> {
        self.check_board_size(position)?;
        let fingerprint = position.fingerprint();
        if let Some(cached) = self.cache.as_ref().and_then(|c| c.get(fingerprint)) {
            return Ok(cached.clone());
        }

        features::fill_features(position, &mut self.scratch_bin, &mut self.scratch_global, 0);
        if self.runtime.graph_capture {
            self.zero_padding_rows(1);
        }
        let outputs = self.run_network(1)?;
        let result = self.decode_item(&outputs, 0, position, 1);

        if let Some(cache) = self.cache.as_mut() {
            cache.insert(fingerprint, result.clone());
        }
        Ok(result)
    }

    /// Analyse several positions, preserving input order. Batches larger
    /// than the compiled batch size are split into sequential runs.
    pub fn analyze_batch(
        &mut self,
        positions: &[Position],
    ) -> Result<Vec<AnalysisResult>, EngineError> {
        let mut results: Vec<Option<AnalysisResult>> = vec![None; positions.len()];
        let mut pending = Vec::new();

        for (i, position) in positions.iter().enumerate() {
            self.check_board_size(position)?;
            let fingerprint = position.fingerprint();
            if let Some(cached) = self.cache.as_ref().and_then(|c| c.get(fingerprint)) {
                results[i] = Some(cached.clone());
            } else {
                pending.push(i);
            }
        }

        let batch = self.runtime.static_batch_size;
        let chunks: Vec<Vec<usize>> = pending.chunks(batch).map(|c| c.to_vec()).collect();
        for chunk in chunks {
            for (offset, &index) in chunk.iter().enumerate() {
                features::fill_features(
                    &positions[index],
                    &mut self.scratch_bin,
                    &mut self.scratch_global,
                    offset,
                );
            }
            // A captured graph only replays at the compiled batch; pad
            // with zero rows and discard the surplus outputs.
            let run_rows = if self.runtime.graph_capture {
                self.zero_padding_rows(chunk.len());
                batch
            } else {
                chunk.len()
            };
            let outputs = self.run_network(run_rows)?;
            for (offset, &index) in chunk.iter().enumerate() {
                let result = self.decode_item(&outputs, offset, &positions[index], 1);
                if let Some(cache) = self.cache.as_mut() {
                    cache.insert(positions[index].fingerprint(), result.clone());
                }
                results[index] = Some(result);
            }
        }

        Ok(results.into_iter().map(|r| r.expect("all slots filled")).collect())
    }

    /// Time a single-position run and a full-batch run against the empty
    /// board, bypassing the cache.
    pub fn benchmark(&mut self, iterations: usize) -> Result<BenchmarkResult, EngineError> {
        let position = Position::empty(self.board_size, goban::Player::B, 7.5);
        let batch = self.runtime.static_batch_size;
        let iterations = iterations.max(1);

        features::fill_features(&position, &mut self.scratch_bin, &mut self.scratch_global, 0);
        // Warm-up run compiles kernels and records the capture.
        self.run_network(1)?;

        let start = Instant::now();
        for _ in 0..iterations {
            self.run_network(1)?;
        }
        let single_ms = start.elapsed().as_secs_f64() * 1000.0 / iterations as f64;

        for offset in 0..batch {
            features::fill_features(
                &position,
                &mut self.scratch_bin,
                &mut self.scratch_global,
                offset,
            );
        }
        let start = Instant::now();
        for _ in 0..iterations {
            self.run_network(batch)?;
        }
        let batch_ms = start.elapsed().as_secs_f64() * 1000.0 / iterations as f64;

        Ok(BenchmarkResult {
            single_ms,
            batch_ms,
            batch_size: batch,
            inferences_per_second: if batch_ms > 0.0 {
                batch as f64 / (batch_ms / 1000.0)
            } else {
                0.0
            },
        })
    }

    fn check_board_size(&self, position: &Position) -> Result<(), EngineError> {
        if position.size() != self.board_size {
            return Err(EngineError::Configuration(format!(
                "engine compiled for {0}x{0}, request is {1}x{1}",
                self.board_size,
                position.size()
            )));
        }
        Ok(())
    }

    fn zero_padding_rows(&mut self, used: usize) {
        let size = self.board_size;
        self.scratch_bin[used * features::bin_len(size)..].fill(0.0);
        self.scratch_global[used * NUM_GLOBAL_FEATURES..].fill(0.0);
    }

    fn decode_item(
        &self,
        outputs: &NetworkOutputs,
        item: usize,
        position: &Position,
        visits: u32,
    ) -> AnalysisResult {
        let area = self.board_size * self.board_size;
        let policy_start = item * outputs.policy_stride;
        let raw = RawOutputs {
            policy: &outputs.policy[policy_start..policy_start + area + 1],
            value: &outputs.value[item * 3..item * 3 + 3],
            misc: &outputs.misc[item * outputs.misc_stride..(item + 1) * outputs.misc_stride],
            ownership: outputs
                .ownership
                .as_ref()
                .map(|own| &own[item * area..(item + 1) * area]),
        };
        decode_outputs(
            &raw,
            self.board_size,
            position.to_play,
            position.ko_for_to_play(),
            visits,
        )
    }

    /// Run the network over the first `rows` positions in the scratch
    /// buffers. A failed run that names the half element type triggers
    /// one conversion retry before the mode is pinned.
    fn run_network(&mut self, rows: usize) -> Result<NetworkOutputs, EngineError> {
        match self.run_network_as(rows, self.runtime.element_type) {
            Ok(outputs) => {
                self.element_pinned = true;
                self.inference_runs += 1;
                Ok(outputs)
            }
            Err(message) => {
                if !self.element_pinned && mentions_half_type(&message) {
                    let flipped = match self.runtime.element_type {
                        ElementType::F32 => ElementType::F16,
                        ElementType::F16 => ElementType::F32,
                    };
                    warn!(
                        "run failed with element-type mismatch, retrying as {:?}",
                        flipped
                    );
                    let outputs = self
                        .run_network_as(rows, flipped)
                        .map_err(EngineError::Analysis)?;
                    self.runtime.element_type = flipped;
                    self.element_pinned = true;
                    self.inference_runs += 1;
                    return Ok(outputs);
                }
                Err(EngineError::Analysis(message))
            }
        }
    }

    /// One run at a fixed element type. The input tensors wrap the
    /// engine-owned scratch buffers as borrowed views; no per-run
    /// allocation happens. When the session is fed f16, the conversion
    /// writes into the persistent half-precision mirror first.
    fn run_network_as(
        &mut self,
        rows: usize,
        element_type: ElementType,
    ) -> Result<NetworkOutputs, String> {
        let size = self.board_size;
        let bin_len = rows * features::bin_len(size);
        let global_len = rows * NUM_GLOBAL_FEATURES;

        if element_type == ElementType::F16 {
            for (dst, &src) in self.scratch_bin_f16[..bin_len]
                .iter_mut()
                .zip(&self.scratch_bin[..bin_len])
            {
                *dst = f32_to_f16_flushed(src);
            }
            for (dst, &src) in self.scratch_global_f16[..global_len]
                .iter_mut()
                .zip(&self.scratch_global[..global_len])
            {
                *dst = f32_to_f16_flushed(src);
            }
        }

        let outputs = match element_type {
            ElementType::F32 => {
                let bin_view = ArrayView4::from_shape(
                    (rows, NUM_BIN_FEATURES, size, size),
                    &self.scratch_bin[..bin_len],
                )
                .map_err(|e| e.to_string())?;
                let global_view = ArrayView2::from_shape(
                    (rows, NUM_GLOBAL_FEATURES),
                    &self.scratch_global[..global_len],
                )
                .map_err(|e| e.to_string())?;
                let bin_value =
                    TensorRef::from_array_view(bin_view).map_err(|e| e.to_string())?;
                let global_value =
                    TensorRef::from_array_view(global_view).map_err(|e| e.to_string())?;
                self.session
                    .run(ort::inputs![
                        self.bin_input_name.as_str() => bin_value,
                        self.global_input_name.as_str() => global_value,
                    ])
                    .map_err(|e| e.to_string())?
            }
            ElementType::F16 => {
                let bin_view = ArrayView4::from_shape(
                    (rows, NUM_BIN_FEATURES, size, size),
                    &self.scratch_bin_f16[..bin_len],
                )
                .map_err(|e| e.to_string())?;
                let global_view = ArrayView2::from_shape(
                    (rows, NUM_GLOBAL_FEATURES),
                    &self.scratch_global_f16[..global_len],
                )
                .map_err(|e| e.to_string())?;
                let bin_value =
                    TensorRef::from_array_view(bin_view).map_err(|e| e.to_string())?;
                let global_value =
                    TensorRef::from_array_view(global_view).map_err(|e| e.to_string())?;
                self.session
                    .run(ort::inputs![
                        self.bin_input_name.as_str() => bin_value,
                        self.global_input_name.as_str() => global_value,
                    ])
                    .map_err(|e| e.to_string())?
            }
        };

        let fetch = |name: &str| {
            outputs
                .get(name)
                .ok_or_else(|| format!("missing output {name}"))
        };

        let (policy_shape, policy) = extract_f32(fetch(&self.policy_output)?)?;
        let (_, value) = extract_f32(fetch(&self.value_output)?)?;
        let (_, misc) = extract_f32(fetch(&self.misc_output)?)?;
        let ownership = match self.ownership_output.as_deref() {
            Some(name) => Some(extract_f32(fetch(name)?)?.1),
            None => None,
        };

        // Some exports carry extra policy channels; the per-item stride
        // comes from the declared shape, the decoder uses the first
        // size*size+1 entries of each item.
        let policy_stride = if policy_shape.len() > 1 {
            policy_shape[1..].iter().product::<i64>() as usize
        } else {
            policy.len() / rows
        };
        let misc_stride = misc.len() / rows;

        Ok(NetworkOutputs {
            policy,
            policy_stride,
            value,
            misc,
            misc_stride,
            ownership,
        })
    }
}

/// Extract any float tensor output as f32, accepting f16 models.
fn extract_f32(value: &ort::value::DynValue) -> Result<(Vec<i64>, Vec<f32>), String> {
    if let Ok((shape, data)) = value.try_extract_tensor::<f32>() {
        return Ok((shape.to_vec(), data.to_vec()));
    }
    let (shape, data) = value
        .try_extract_tensor::<f16>()
        .map_err(|e| e.to_string())?;
    Ok((shape.to_vec(), data.iter().map(|v| v.to_f32()).collect()))
}

/// Map declared output names onto the policy/value/misc/ownership heads.
/// Falls back to positional order for models with unhelpful names.
fn resolve_output_names(
    outputs: &[String],
) -> Result<(String, String, String, Option<String>), EngineError> {
    if outputs.len() < 3 {
        return Err(EngineError::Load(format!(
            "model declares {} outputs, expected policy/value/misc heads",
            outputs.len()
        )));
    }

    let find = |needle: &str, exclude: Option<&str>| {
        outputs.iter().find(|name| {
            let lower = name.to_ascii_lowercase();
            lower.contains(needle) && exclude.map_or(true, |e| !lower.contains(e))
        })
    };

    let policy = find("policy", None).cloned();
    let misc = find("misc", None).cloned();
    let value = find("value", Some("misc")).cloned();
    let ownership = find("ownership", None).cloned();

    match (policy, value, misc) {
        (Some(p), Some(v), Some(m)) => Ok((p, v, m, ownership)),
        _ => Ok((
            outputs[0].clone(),
            outputs[1].clone(),
            outputs[2].clone(),
            outputs.get(3).cloned(),
        )),
    }
}

impl PositionEvaluator for Engine {
    fn evaluate(&mut self, position: &Position) -> Result<AnalysisResult, EvaluatorError> {
        self.analyze(position)
            .map_err(|e| EvaluatorError::EvaluationFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_static_batch() {
        assert_eq!(resolve_static_batch(Some(4), Some(8), false), 4);
        assert_eq!(resolve_static_batch(None, Some(8), false), 8);
        assert_eq!(resolve_static_batch(None, None, false), 1);
        // Graph capture clamps to one regardless of source
        assert_eq!(resolve_static_batch(Some(4), None, true), 1);
        assert_eq!(resolve_static_batch(None, Some(8), true), 1);
    }

    #[test]
    fn test_f16_flush_subnormals() {
        // Smaller than the smallest f16 normal (~6.1e-5): flushed
        let flushed = f32_to_f16_flushed(1e-6);
        assert_eq!(flushed, f16::ZERO);
        let flushed = f32_to_f16_flushed(-1e-6);
        assert_eq!(flushed.to_bits(), f16::NEG_ZERO.to_bits());

        // Normal values convert exactly
        assert_eq!(f32_to_f16_flushed(1.0), f16::ONE);
        // Overflow saturates to infinity
        assert_eq!(f32_to_f16_flushed(1e6), f16::INFINITY);
        assert_eq!(f32_to_f16_flushed(-1e6), f16::NEG_INFINITY);
    }

    #[test]
    fn test_mentions_half_type() {
        assert!(mentions_half_type(
            "Unexpected input data type. Actual: (float) , expected: (float16)"
        ));
        assert!(mentions_half_type("tensor(Half) expected"));
        assert!(!mentions_half_type("shape mismatch on input 0"));
    }

    #[test]
    fn test_resolve_output_names_by_content() {
        let outputs = vec![
            "out_policy".to_string(),
            "out_value".to_string(),
            "out_miscvalue".to_string(),
            "out_ownership".to_string(),
        ];
        let (p, v, m, o) = resolve_output_names(&outputs).unwrap();
        assert_eq!(p, "out_policy");
        assert_eq!(v, "out_value");
        assert_eq!(m, "out_miscvalue");
        assert_eq!(o, Some("out_ownership".to_string()));
    }

    #[test]
    fn test_resolve_output_names_positional_fallback() {
        let outputs = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let (p, v, m, o) = resolve_output_names(&outputs).unwrap();
        assert_eq!((p.as_str(), v.as_str(), m.as_str()), ("a", "b", "c"));
        assert_eq!(o, None);
    }

    #[test]
    fn test_too_few_outputs_rejected() {
        let outputs = vec!["policy".to_string()];
        assert!(resolve_output_names(&outputs).is_err());
    }

    #[test]
    fn test_config_thread_clamp() {
        let mut config = EngineConfig::new(19);
        config.threads = 32;
        assert_eq!(config.resolved_threads(), MAX_RUNTIME_THREADS);
        config.threads = 2;
        assert_eq!(config.resolved_threads(), 2);
    }
}
