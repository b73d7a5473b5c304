//! InferenceRuntime (C11): loads/unloads model instances and serves single +
//! batched + queued inference with a per-model concurrency cap.
//!
//! `ModelLoader` is a trait object so a real framework binding (onnxruntime,
//! torch, a remote serving call) can be swapped in later; [`StubLoader`] is
//! the default — a deterministic hash-based pseudo-output — since no
//! concrete framework is mandated (Open Question, recorded in DESIGN.md).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{Mutex, Semaphore};

use crate::error::{AppError, AppResult};

const DEFAULT_UNHEALTHY_THRESHOLD: u32 = 10;
const DEFAULT_MODEL_CONCURRENCY: usize = 4;
const DEFAULT_QUEUE_CAPACITY: usize = 256;

#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self, model_id: &str) -> AppResult<()>;
    async fn infer(&self, model_id: &str, input: &Value) -> AppResult<Value>;
}

/// Deterministic stand-in: hashes `(model_id, input)` into a pseudo-output so
/// tests can assert on exact values without a real runtime.
pub struct StubLoader;

#[async_trait]
impl ModelLoader for StubLoader {
    async fn load(&self, _model_id: &str) -> AppResult<()> {
        Ok(())
    }

    async fn infer(&self, model_id: &str, input: &Value) -> AppResult<Value> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};
        let mut hasher = DefaultHasher::new();
        model_id.hash(&mut hasher);
        input.to_string().hash(&mut hasher);
        let score = (hasher.finish() % 1000) as f64 / 1000.0;
        Ok(serde_json::json!({ "modelId": model_id, "score": score }))
    }
}

struct ModelState {
    loaded: bool,
    consecutive_failures: AtomicU32,
    unhealthy: std::sync::atomic::AtomicBool,
    concurrency: Arc<Semaphore>,
    queue_len: AtomicU32,
}

impl ModelState {
    fn new(concurrency: usize) -> Self {
        Self {
            loaded: false,
            consecutive_failures: AtomicU32::new(0),
            unhealthy: std::sync::atomic::AtomicBool::new(false),
            concurrency: Arc::new(Semaphore::new(concurrency)),
            queue_len: AtomicU32::new(0),
        }
    }
}

/// Runtime serving loaded models. `models` holds per-model state keyed by
/// model id (the id InferenceRuntime uses is opaque to ModelRegistry — a
/// caller typically passes a production version's `model_id`).
pub struct InferenceRuntime {
    loader: Arc<dyn ModelLoader>,
    models: Arc<DashMap<String, Mutex<ModelState>>>,
    unhealthy_threshold: u32,
    queue_capacity: usize,
}

impl InferenceRuntime {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            models: Arc::new(DashMap::new()),
            unhealthy_threshold: DEFAULT_UNHEALTHY_THRESHOLD,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    pub fn with_stub_loader() -> Self {
        Self::new(Arc::new(StubLoader))
    }

    pub async fn load_model(&self, model_id: &str) -> AppResult<()> {
        self.loader.load(model_id).await?;
        self.models
            .entry(model_id.to_string())
            .or_insert_with(|| Mutex::new(ModelState::new(DEFAULT_MODEL_CONCURRENCY)));
        self.models.get(model_id).unwrap().lock().await.loaded = true;
        Ok(())
    }

    pub async fn unload_model(&self, model_id: &str) {
        if let Some(entry) = self.models.get(model_id) {
            entry.lock().await.loaded = false;
        }
    }

    pub async fn is_loaded(&self, model_id: &str) -> bool {
        match self.models.get(model_id) {
            Some(entry) => entry.lock().await.loaded,
            None => false,
        }
    }

    async fn ensure_healthy(&self, model_id: &str) -> AppResult<()> {
        let entry = self
            .models
            .get(model_id)
            .ok_or_else(|| AppError::not_found(format!("model {model_id} is not loaded")))?;
        let state = entry.lock().await;
        if !state.loaded {
            return Err(AppError::not_found(format!("model {model_id} is not loaded")));
        }
        if state.unhealthy.load(Ordering::SeqCst) {
            return Err(AppError::new(
                crate::error::ErrorKind::ModelUnhealthy,
                format!("model {model_id} is unhealthy after repeated inference failures"),
            ));
        }
        Ok(())
    }

    /// A failed inference never unloads the model; it only counts toward the
    /// unhealthy threshold (§4.8).
    async fn record_outcome(&self, model_id: &str, succeeded: bool) {
        if let Some(entry) = self.models.get(model_id) {
            let state = entry.lock().await;
            if succeeded {
                state.consecutive_failures.store(0, Ordering::SeqCst);
            } else {
                let failures = state.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                if failures >= self.unhealthy_threshold {
                    state.unhealthy.store(true, Ordering::SeqCst);
                }
            }
        }
    }

    pub async fn infer(&self, model_id: &str, input: Value) -> AppResult<Value> {
        self.ensure_healthy(model_id).await?;
        let permit = {
            let entry = self.models.get(model_id).unwrap();
            let semaphore = entry.lock().await.concurrency.clone();
            semaphore.acquire_owned().await.map_err(|_| AppError::internal("semaphore closed"))?
        };

        let result = self.loader.infer(model_id, &input).await;
        self.record_outcome(model_id, result.is_ok()).await;
        drop(permit);
        result
    }

    pub async fn infer_batch(&self, model_id: &str, inputs: Vec<Value>) -> AppResult<Vec<Value>> {
        let mut outputs = Vec::with_capacity(inputs.len());
        for input in inputs {
            outputs.push(self.infer(model_id, input).await?);
        }
        Ok(outputs)
    }

    /// FIFO queue per model; rejects with `queueFull` once `queue_capacity`
    /// in-flight + queued requests are outstanding for this model (§4.8).
    pub async fn queue_infer(&self, model_id: &str, input: Value) -> AppResult<Value> {
        let entry = self
            .models
            .get(model_id)
            .ok_or_else(|| AppError::not_found(format!("model {model_id} is not loaded")))?;
        let queue_len = {
            let state = entry.lock().await;
            state.queue_len.fetch_add(1, Ordering::SeqCst) + 1
        };
        if queue_len as usize > self.queue_capacity {
            if let Some(entry) = self.models.get(model_id) {
                entry.lock().await.queue_len.fetch_sub(1, Ordering::SeqCst);
            }
            return Err(AppError::new(
                crate::error::ErrorKind::QueueFull,
                format!("inference queue for model {model_id} is full"),
            ));
        }

        let result = self.infer(model_id, input).await;
        if let Some(entry) = self.models.get(model_id) {
            entry.lock().await.queue_len.fetch_sub(1, Ordering::SeqCst);
        }
        result
    }

    /// Operator action clearing a model previously marked unhealthy.
    pub async fn clear_unhealthy(&self, model_id: &str) {
        if let Some(entry) = self.models.get(model_id) {
            let state = entry.lock().await;
            state.unhealthy.store(false, Ordering::SeqCst);
            state.consecutive_failures.store(0, Ordering::SeqCst);
        }
    }

    /// Internal FIFO ordering is implied by awaiting each queued call in
    /// submission order at the call site; this helper exists for callers
    /// that want to pre-validate a batch shape before dispatch.
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }
}
