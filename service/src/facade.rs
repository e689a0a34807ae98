//! The analysis façade.
//!
//! The façade owns the worker channel and a small amount of request
//! bookkeeping: a monotonically increasing sequence number, the newest
//! recognition sequence (for staleness filtering), a corner-drag
//! debounce epoch, and a cancellation generation. All responses are
//! checked on return; anything superseded is discarded and reported as
//! [`ServiceError::Cancelled`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, info};

use goban::AnalysisResult;
use recognition::{Hint, Point, RecognitionResult};

use crate::error::ServiceError;
use crate::protocol::{
    AnalyzeOptions, BatchItem, ImagePayload, LoadModelOptions, RecognizeOptions, RuntimeInfoDto,
};
use crate::worker::{spawn_worker, BenchmarkDto, Envelope, WorkerRequest, WorkerResponse};

/// Asynchronous gateway over the recognition and inference pipelines.
///
/// One façade owns one worker. Requests are serialised by the worker;
/// ordering and cancellation guarantees live here.
pub struct AnalysisService {
    sender: Mutex<Option<mpsc::Sender<Envelope>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    /// Next request sequence number.
    seq: AtomicU64,
    /// Newest sequence issued for a recognition-family request.
    latest_recognition: AtomicU64,
    /// Corner-drag debounce epoch; bursts coalesce onto the newest.
    corner_epoch: AtomicU64,
    /// Bumped by cancel_all and dispose; responses from an older
    /// generation are rejected on return.
    generation: AtomicU64,
    debounce: Duration,
}

impl AnalysisService {
    /// Start the service with the given corner-drag debounce window.
    pub fn start(debounce: Duration) -> Self {
        let (sender, handle) = spawn_worker();
        Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(handle)),
            seq: AtomicU64::new(0),
            latest_recognition: AtomicU64::new(0),
            corner_epoch: AtomicU64::new(0),
            generation: AtomicU64::new(0),
            debounce,
        }
    }

    /// Start with configuration-file settings.
    pub fn from_config(config: &engine_config::CentralConfig) -> Self {
        Self::start(Duration::from_millis(config.service.debounce_ms))
    }

    /// Load (and possibly rewrite) a model, building a fresh session.
    pub async fn load_model(
        &self,
        model_bytes: Vec<u8>,
        options: LoadModelOptions,
    ) -> Result<RuntimeInfoDto, ServiceError> {
        match self
            .submit(
                WorkerRequest::LoadModel {
                    bytes: model_bytes,
                    options,
                },
                false,
            )
            .await?
        {
            WorkerResponse::ModelLoaded(info) => Ok(info),
            _ => Err(ServiceError::Analysis("unexpected reply".to_string())),
        }
    }

    /// Analyse one position.
    pub async fn analyze_position(
        &self,
        sign_map: Vec<Vec<i8>>,
        options: AnalyzeOptions,
    ) -> Result<AnalysisResult, ServiceError> {
        match self
            .submit(WorkerRequest::Analyze { sign_map, options }, false)
            .await?
        {
            WorkerResponse::Analysis(result) => Ok(result),
            _ => Err(ServiceError::Analysis("unexpected reply".to_string())),
        }
    }

    /// Analyse several positions, preserving order.
    pub async fn analyze_batch(
        &self,
        items: Vec<BatchItem>,
    ) -> Result<Vec<AnalysisResult>, ServiceError> {
        match self
            .submit(WorkerRequest::AnalyzeBatch { items }, false)
            .await?
        {
            WorkerResponse::Batch(results) => Ok(results),
            _ => Err(ServiceError::Analysis("unexpected reply".to_string())),
        }
    }

    /// Detect and classify a photographed board.
    pub async fn recognize_board(
        &self,
        image: ImagePayload,
        options: RecognizeOptions,
    ) -> Result<RecognitionResult, ServiceError> {
        self.submit_recognition(image, options, None, Vec::new()).await
    }

    /// Re-run classification with caller-adjusted corners. Bursts of
    /// corner drags are debounced; only the newest request in a window
    /// survives.
    pub async fn reclassify_with_corners(
        &self,
        image: ImagePayload,
        corners: [Point; 4],
        options: RecognizeOptions,
    ) -> Result<RecognitionResult, ServiceError> {
        let epoch = self.corner_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.debounce).await;
        if self.corner_epoch.load(Ordering::SeqCst) != epoch {
            debug!(epoch, "corner drag coalesced away");
            return Err(ServiceError::Cancelled);
        }
        self.submit_recognition(image, options, Some(corners), Vec::new())
            .await
    }

    /// Re-run classification with corners and calibration hints.
    pub async fn reclassify_with_hints(
        &self,
        image: ImagePayload,
        corners: [Point; 4],
        hints: Vec<Hint>,
        options: RecognizeOptions,
    ) -> Result<RecognitionResult, ServiceError> {
        self.submit_recognition(image, options, Some(corners), hints)
            .await
    }

    /// Time the loaded model.
    pub async fn benchmark(&self, iterations: usize) -> Result<BenchmarkDto, ServiceError> {
        match self
            .submit(WorkerRequest::Benchmark { iterations }, false)
            .await?
        {
            WorkerResponse::Benchmark(result) => Ok(result),
            _ => Err(ServiceError::Analysis("unexpected reply".to_string())),
        }
    }

    /// Back-ends constructible on this host.
    pub fn capabilities() -> Vec<inference::Backend> {
        inference::Engine::capabilities()
    }

    /// Runtime state of the loaded engine, if any.
    pub async fn runtime_info(&self) -> Result<Option<RuntimeInfoDto>, ServiceError> {
        match self.submit(WorkerRequest::RuntimeInfo, false).await? {
            WorkerResponse::RuntimeInfo(info) => Ok(info),
            _ => Err(ServiceError::Analysis("unexpected reply".to_string())),
        }
    }

    /// Reject everything in flight but keep the worker alive.
    pub fn cancel_all(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        info!("pending requests cancelled");
    }

    /// Reject everything in flight and terminate the worker. Idempotent.
    pub fn dispose(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let sender = self.sender.lock().expect("facade lock").take();
        if sender.is_some() {
            info!("service disposed, worker terminating");
        }
        drop(sender);
        // The worker exits once the channel drains; detach its handle.
        let _ = self.worker.lock().expect("facade lock").take();
    }

    async fn submit_recognition(
        &self,
        image: ImagePayload,
        options: RecognizeOptions,
        corners: Option<[Point; 4]>,
        hints: Vec<Hint>,
    ) -> Result<RecognitionResult, ServiceError> {
        match self
            .submit(
                WorkerRequest::Recognize {
                    image,
                    options,
                    corners,
                    hints,
                },
                true,
            )
            .await?
        {
            WorkerResponse::Recognition(result) => Ok(*result),
            _ => Err(ServiceError::Analysis("unexpected reply".to_string())),
        }
    }

    /// Send one envelope and await its reply, applying the generation
    /// and (for recognition) sequence staleness rules on return. A
    /// discarded response is dropped here, which releases its buffers.
    async fn submit(
        &self,
        request: WorkerRequest,
        recognition_intent: bool,
    ) -> Result<WorkerResponse, ServiceError> {
        let generation = self.generation.load(Ordering::SeqCst);
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        if recognition_intent {
            self.latest_recognition.store(seq, Ordering::SeqCst);
        }

        let (reply, receiver) = oneshot::channel();
        {
            let guard = self.sender.lock().expect("facade lock");
            let sender = guard.as_ref().ok_or(ServiceError::Cancelled)?;
            sender
                .send(Envelope {
                    seq,
                    request,
                    reply,
                })
                .map_err(|_| ServiceError::Cancelled)?;
        }

        let result = receiver.await.map_err(|_| ServiceError::Cancelled)?;

        if recognition_intent && self.latest_recognition.load(Ordering::SeqCst) != seq {
            debug!(seq, "stale recognition response discarded");
            return Err(ServiceError::Cancelled);
        }
        if self.generation.load(Ordering::SeqCst) != generation {
            return Err(ServiceError::Cancelled);
        }
        result
    }
}

impl Drop for AnalysisService {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.sender.lock() {
            guard.take();
        }
    }
}
