//! The dedicated worker: one OS thread owning the inference engine and
//! the recognition pipeline.
//!
//! All pipelines run synchronously on this thread; the façade talks to
//! it through a channel of sequence-stamped envelopes and receives each
//! reply on a oneshot. Binary payloads move by ownership in both
//! directions.

use std::sync::mpsc;
use std::thread::JoinHandle;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use goban::{AnalysisResult, Board, Player, Position, Vertex};
use inference::{Backend, Engine, EngineConfig};
use mcts::{run_search, PositionEvaluator, SearchConfig};
use model_rewriter::{rewrite_model, RewriteOptions};
use recognition::{
    recognize_board, reclassify_with_corners, reclassify_with_hints, Hint, Point,
    RecognitionOptions, RecognitionResult,
};

use crate::error::ServiceError;
use crate::protocol::{
    AnalyzeOptions, BatchItem, ImagePayload, LoadModelOptions, RecognizeOptions, RuntimeInfoDto,
};

/// Work the façade can submit.
pub(crate) enum WorkerRequest {
    LoadModel {
        bytes: Vec<u8>,
        options: LoadModelOptions,
    },
    Analyze {
        sign_map: Vec<Vec<i8>>,
        options: AnalyzeOptions,
    },
    AnalyzeBatch {
        items: Vec<BatchItem>,
    },
    Recognize {
        image: ImagePayload,
        options: RecognizeOptions,
        corners: Option<[Point; 4]>,
        hints: Vec<Hint>,
    },
    Benchmark {
        iterations: usize,
    },
    RuntimeInfo,
}

/// Replies, one variant per request kind.
pub(crate) enum WorkerResponse {
    ModelLoaded(RuntimeInfoDto),
    Analysis(AnalysisResult),
    Batch(Vec<AnalysisResult>),
    Recognition(Box<RecognitionResult>),
    Benchmark(BenchmarkDto),
    RuntimeInfo(Option<RuntimeInfoDto>),
}

/// Serializable benchmark summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkDto {
    pub single_ms: f64,
    pub batch_ms: f64,
    pub batch_size: usize,
    pub inferences_per_second: f64,
}

/// A sequence-stamped request envelope.
pub(crate) struct Envelope {
    pub seq: u64,
    pub request: WorkerRequest,
    pub reply: oneshot::Sender<Result<WorkerResponse, ServiceError>>,
}

/// Worker state: at most one engine at a time; loading a new model
/// disposes the previous session.
struct Worker {
    engine: Option<Engine>,
    was_rewritten: bool,
}

/// Spawn the worker thread. Dropping the sender terminates it after the
/// request in flight.
pub(crate) fn spawn_worker() -> (mpsc::Sender<Envelope>, JoinHandle<()>) {
    let (sender, receiver) = mpsc::channel::<Envelope>();
    let handle = std::thread::Builder::new()
        .name("sente-worker".to_string())
        .spawn(move || {
            let mut worker = Worker {
                engine: None,
                was_rewritten: false,
            };
            while let Ok(envelope) = receiver.recv() {
                let seq = envelope.seq;
                let result = worker.handle(envelope.request);
                if envelope.reply.send(result).is_err() {
                    debug!(seq, "reply dropped, caller went away");
                }
            }
            debug!("worker channel closed, exiting");
        })
        .expect("worker thread spawn");
    (sender, handle)
}

impl Worker {
    fn handle(&mut self, request: WorkerRequest) -> Result<WorkerResponse, ServiceError> {
        match request {
            WorkerRequest::LoadModel { bytes, options } => {
                self.load_model(bytes, options).map(WorkerResponse::ModelLoaded)
            }
            WorkerRequest::Analyze { sign_map, options } => {
                let position = build_position(&sign_map, &options)?;
                let engine = self.engine_mut()?;
                let result = if options.num_visits > 1 {
                    let config = SearchConfig::default().with_visits(options.num_visits);
                    run_search(&position, engine, config)
                        .map_err(|e| ServiceError::Analysis(e.to_string()))?
                } else {
                    engine.analyze(&position)?
                };
                Ok(WorkerResponse::Analysis(result))
            }
            WorkerRequest::AnalyzeBatch { items } => {
                // Multi-visit items go through the search one by one;
                // plain evaluations share batched runs.
                let mut results: Vec<Option<AnalysisResult>> = vec![None; items.len()];
                let mut single: Vec<(usize, Position)> = Vec::new();
                for (i, item) in items.iter().enumerate() {
                    let position = build_position(&item.sign_map, &item.options)?;
                    if item.options.num_visits > 1 {
                        let engine = self.engine_mut()?;
                        let config =
                            SearchConfig::default().with_visits(item.options.num_visits);
                        let result = run_search(&position, engine, config)
                            .map_err(|e| ServiceError::Analysis(e.to_string()))?;
                        results[i] = Some(result);
                    } else {
                        single.push((i, position));
                    }
                }
                if !single.is_empty() {
                    let positions: Vec<Position> =
                        single.iter().map(|(_, p)| p.clone()).collect();
                    let batch = self.engine_mut()?.analyze_batch(&positions)?;
                    for ((index, _), result) in single.into_iter().zip(batch) {
                        results[index] = Some(result);
                    }
                }
                Ok(WorkerResponse::Batch(
                    results.into_iter().map(|r| r.expect("all slots filled")).collect(),
                ))
            }
            WorkerRequest::Recognize {
                image,
                options,
                corners,
                hints,
            } => {
                let image = image.into_image()?;
                let mut recognition_options = RecognitionOptions::new(options.board_size);
                recognition_options.output_size = options.output_size;
                recognition_options.black_threshold = options.black_threshold;
                recognition_options.white_threshold = options.white_threshold;
                recognition_options.grid_corners = options.grid_corners;

                let result = match (corners, hints.is_empty()) {
                    (None, _) => recognize_board(&image, &recognition_options)?,
                    (Some(corners), true) => {
                        reclassify_with_corners(&image, corners, &recognition_options)?
                    }
                    (Some(corners), false) => {
                        reclassify_with_hints(&image, corners, &hints, &recognition_options)?
                    }
                };
                Ok(WorkerResponse::Recognition(Box::new(result)))
            }
            WorkerRequest::Benchmark { iterations } => {
                let engine = self.engine_mut()?;
                let bench = engine.benchmark(iterations)?;
                Ok(WorkerResponse::Benchmark(BenchmarkDto {
                    single_ms: bench.single_ms,
                    batch_ms: bench.batch_ms,
                    batch_size: bench.batch_size,
                    inferences_per_second: bench.inferences_per_second,
                }))
            }
            WorkerRequest::RuntimeInfo => Ok(WorkerResponse::RuntimeInfo(
                self.engine
                    .as_ref()
                    .map(|e| runtime_dto(e, self.was_rewritten)),
            )),
        }
    }

    fn engine_mut(&mut self) -> Result<&mut Engine, ServiceError> {
        self.engine
            .as_mut()
            .ok_or_else(|| ServiceError::Configuration("no model loaded".to_string()))
    }

    /// Build a new session, rewriting the model first when the
    /// preferred back-end cannot compile dynamic shapes. Any previous
    /// engine is dropped before the new one is created.
    fn load_model(
        &mut self,
        bytes: Vec<u8>,
        options: LoadModelOptions,
    ) -> Result<RuntimeInfoDto, ServiceError> {
        self.engine = None;

        let preference = if options.backend_preference.is_empty() {
            Backend::default_preference()
        } else {
            options.backend_preference.clone()
        };
        let primary = preference[0];

        let (bytes, was_rewritten) = if primary.requires_static_shapes() {
            let rewrite_options = match primary {
                Backend::NeuralCoprocessor => {
                    RewriteOptions::for_coprocessor(options.board_size as i64)
                }
                _ => RewriteOptions::for_graph_capture(
                    options.static_batch_size.map(|b| b as i64).unwrap_or(8),
                ),
            };
            let outcome = rewrite_model(&bytes, &rewrite_options);
            if outcome.was_converted {
                info!(
                    dims = outcome.dims_changed,
                    softplus = outcome.softplus_replaced,
                    logsoftmax = outcome.logsoftmax_replaced,
                    "model rewritten for static-shape back-end"
                );
            } else {
                warn!("model rewrite skipped, loading original bytes");
            }
            (outcome.bytes, outcome.was_converted)
        } else {
            (bytes, false)
        };

        let engine_config = EngineConfig {
            backend_preference: preference,
            wasm_path: options.wasm_path.map(std::path::PathBuf::from),
            enable_graph_capture: options.enable_graph_capture,
            static_batch_size: options.static_batch_size.filter(|&b| b > 0),
            board_size: options.board_size,
            threads: options.threads,
            enable_cache: options.enable_cache,
            cache_capacity: options.cache_capacity,
        };
        let engine = Engine::new(&bytes, engine_config)?;
        let dto = runtime_dto(&engine, was_rewritten);
        self.engine = Some(engine);
        self.was_rewritten = was_rewritten;
        Ok(dto)
    }
}

fn runtime_dto(engine: &Engine, was_rewritten: bool) -> RuntimeInfoDto {
    let info = engine.runtime_info();
    RuntimeInfoDto {
        backend: info.backend,
        requested_backend: info.requested_backend,
        did_fallback: info.did_fallback,
        element_type: match info.element_type {
            inference::ElementType::F32 => "float32".to_string(),
            inference::ElementType::F16 => "float16".to_string(),
        },
        static_batch_size: info.static_batch_size,
        graph_capture: info.graph_capture,
        was_rewritten,
    }
}

/// Assemble a [`Position`] from the wire inputs.
pub(crate) fn build_position(
    sign_map: &[Vec<i8>],
    options: &AnalyzeOptions,
) -> Result<Position, ServiceError> {
    let board = Board::from_sign_map(sign_map)
        .ok_or_else(|| ServiceError::Load("sign map is not a square grid".to_string()))?;
    let size = board.size();
    if !matches!(size, 9 | 13 | 19) {
        return Err(ServiceError::Configuration(format!(
            "unsupported board size {size}"
        )));
    }

    let to_play = options.next_to_play.unwrap_or_else(|| {
        let black = board.grid().iter().filter(|&&v| v == 1).count();
        let white = board.grid().iter().filter(|&&v| v == -1).count();
        if black > white {
            Player::W
        } else {
            Player::B
        }
    });

    let mut position = Position::new(board, to_play, options.komi);
    for text in &options.history {
        let vertex = Vertex::from_display(text, size)
            .ok_or_else(|| ServiceError::Load(format!("bad history coordinate '{text}'")))?;
        position.history.push(vertex);
    }
    position.ko = options.ko_info;
    Ok(position)
}

// The engine implements the evaluator seam; make sure the bound holds.
const _: fn() = || {
    fn assert_evaluator<E: PositionEvaluator>() {}
    assert_evaluator::<Engine>();
};
