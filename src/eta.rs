use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::trace;

use crate::error::KiraError;
use crate::progress::StatusHub;

#[derive(Debug, Clone, Default)]
pub struct EtaModel {
    last: Option<Instant>,
    intervals: u32,
    mean_secs: f64,
}

impl EtaModel {
    pub fn sample(&mut self, at: Instant, remaining: u64) -> Option<Duration> {
        if let Some(last) = self.last.replace(at) {
            let interval = at.saturating_duration_since(last).as_secs_f64();
            self.intervals += 1;
            self.mean_secs += (interval - self.mean_secs) / f64::from(self.intervals);
        }
        self.estimate(remaining)
    }

    pub fn estimate(&self, remaining: u64) -> Option<Duration> {
        (self.intervals > 0).then(|| Duration::from_secs_f64(self.mean_secs * remaining as f64))
    }
}

struct EtaState {
    epoch: AtomicU64,
    model: Mutex<EtaModel>,
    status: Arc<StatusHub>,
}

/// Serializes estimate updates on a dedicated single-thread pool, off the
/// workers that report completions.
pub struct EtaEstimator {
    pool: ThreadPool,
    state: Arc<EtaState>,
}

impl EtaEstimator {
    pub fn new(status: Arc<StatusHub>) -> Result<Self, KiraError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(1)
            .thread_name(|_| "kira-cu-eta".to_string())
            .build()
            .map_err(|err| KiraError::WorkerPool(err.to_string()))?;
        Ok(Self {
            pool,
            state: Arc::new(EtaState {
                epoch: AtomicU64::new(0),
                model: Mutex::new(EtaModel::default()),
                status,
            }),
        })
    }

    pub fn record(&self, remaining: u64) {
        let at = Instant::now();
        let epoch = self.state.epoch.load(Ordering::SeqCst);
        let state = Arc::clone(&self.state);
        self.pool.spawn(move || {
            let mut model = state.model.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if state.epoch.load(Ordering::SeqCst) != epoch {
                trace!(epoch, "dropping stale eta sample");
                return;
            }
            // Published under the lock, ordered against `reset`.
            let eta = model.sample(at, remaining);
            if eta.is_some() {
                state.status.set_eta(eta);
            }
        });
    }

    pub fn reset(&self) {
        let mut model = self
            .state
            .model
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.state.epoch.fetch_add(1, Ordering::SeqCst);
        *model = EtaModel::default();
        self.state.status.set_eta(None);
    }

    pub fn settle(&self) {
        self.pool.install(|| ());
    }
}
