//! Once-only model initialization
//!
//! The gate moves through `Unloaded -> Loading -> Ready`. While loading, it
//! holds a single shared future; every caller that arrives before the load
//! finishes awaits that same future instead of starting its own load. A
//! failed load returns the gate to `Unloaded` so the next call retries.
//!
//! The load itself runs on a spawned task, so it still completes (and the
//! gate still becomes `Ready`) if every waiting request is cancelled.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{error, info};

use super::{ModelError, ModelHandle, ModelLoader};

type PendingLoad = Shared<BoxFuture<'static, Result<ModelHandle, ModelError>>>;

enum GateState {
    Unloaded,
    Loading { id: u64, load: PendingLoad },
    Ready(ModelHandle),
}

struct GateInner {
    loader: Arc<dyn ModelLoader>,
    state: Mutex<GateState>,
    next_load_id: AtomicU64,
}

impl GateInner {
    fn lock_state(&self) -> MutexGuard<'_, GateState> {
        // State transitions are single assignments, so a poisoned lock still
        // holds a consistent value
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the outcome of load `id`, unless a newer load has taken over
    fn finish_load(&self, id: u64, result: &Result<ModelHandle, ModelError>) {
        let mut state = self.lock_state();
        let current = match &*state {
            GateState::Loading { id, .. } => Some(*id),
            _ => None,
        };
        if current == Some(id) {
            *state = match result {
                Ok(handle) => GateState::Ready(handle.clone()),
                Err(_) => GateState::Unloaded,
            };
        }
    }
}

/// Process-wide owner of the classification model (cheap to clone)
#[derive(Clone)]
pub struct ModelGate {
    inner: Arc<GateInner>,
}

impl ModelGate {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            inner: Arc::new(GateInner {
                loader,
                state: Mutex::new(GateState::Unloaded),
                next_load_id: AtomicU64::new(1),
            }),
        }
    }

    /// Return the loaded model, loading it first if needed
    ///
    /// `threshold` only matters to the call that starts the load; once a model
    /// is loaded or loading, every caller gets that same instance.
    pub async fn ensure_loaded(&self, threshold: f64) -> Result<ModelHandle, ModelError> {
        let pending = {
            let mut state = self.inner.lock_state();
            match &*state {
                GateState::Ready(handle) => return Ok(handle.clone()),
                GateState::Loading { load, .. } => load.clone(),
                GateState::Unloaded => {
                    let id = self.inner.next_load_id.fetch_add(1, Ordering::SeqCst);
                    let load = self.start_load(id, threshold);
                    *state = GateState::Loading {
                        id,
                        load: load.clone(),
                    };
                    load
                }
            }
        };

        pending.await
    }

    /// True once a model instance is ready; never triggers a load
    pub fn is_loaded(&self) -> bool {
        matches!(&*self.inner.lock_state(), GateState::Ready(_))
    }

    /// True while a load is in flight
    pub fn is_loading(&self) -> bool {
        matches!(&*self.inner.lock_state(), GateState::Loading { .. })
    }

    fn start_load(&self, id: u64, threshold: f64) -> PendingLoad {
        let inner = Arc::clone(&self.inner);

        let task = tokio::spawn(async move {
            let started = Instant::now();
            info!("Loading toxicity model (threshold {})", threshold);

            let result = match inner.loader.load(threshold).await {
                Ok(model) => {
                    info!("Model loaded in {} ms", started.elapsed().as_millis());
                    Ok(ModelHandle::new(model, threshold))
                }
                Err(e) => {
                    error!("Model load failed after {} ms: {:#}", started.elapsed().as_millis(), e);
                    Err(ModelError::Load(format!("{:#}", e)))
                }
            };

            inner.finish_load(id, &result);
            result
        });

        let inner = Arc::clone(&self.inner);
        async move {
            match task.await {
                Ok(result) => result,
                Err(join_error) => {
                    // The task panicked before recording its outcome
                    let result = Err(ModelError::Load(format!("load task aborted: {}", join_error)));
                    inner.finish_load(id, &result);
                    result
                }
            }
        }
        .boxed()
        .shared()
    }
}
