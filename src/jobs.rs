use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::pipeline::{PROCESSING_SENTINEL, ReportOrchestrator, ReportRequest};

/// Anything that can turn a report request into a document id.
#[async_trait::async_trait]
pub trait ReportExecutor: Send + Sync {
    async fn execute(&self, request: &ReportRequest, cancel: &CancellationToken) -> String;
}

#[async_trait::async_trait]
impl ReportExecutor for ReportOrchestrator {
    async fn execute(&self, request: &ReportRequest, cancel: &CancellationToken) -> String {
        self.run(request, cancel).await
    }
}

/// A spawned run. Dropping it detaches the run; cancelling the token stops it.
pub struct RunHandle {
    pub id: Uuid,
    pub cancel: CancellationToken,
    pub join: JoinHandle<String>,
}

/// Bounded pool of concurrent report runs.
#[derive(Clone)]
pub struct ReportRunner {
    executor: Arc<dyn ReportExecutor>,
    permits: Arc<Semaphore>,
    active: Arc<Mutex<HashMap<Uuid, CancellationToken>>>,
}

impl ReportRunner {
    pub fn new(executor: Arc<dyn ReportExecutor>, pool_size: usize) -> Self {
        Self {
            executor,
            permits: Arc::new(Semaphore::new(pool_size.max(1))),
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, CancellationToken>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queues `request`; it starts once a worker slot is free.
    pub fn spawn(&self, request: ReportRequest) -> RunHandle {
        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        self.lock().insert(id, cancel.clone());

        let span = tracing::info_span!("job.run", run.id = %id, report.website = %request.website);
        let runner = self.clone();
        let token = cancel.clone();
        let join = tokio::spawn(
            async move {
                let result = runner.run_when_permitted(&request, &token).await;
                runner.lock().remove(&id);
                result
            }
            .instrument(span),
        );

        tracing::info!(run.id = %id, "report run queued");
        RunHandle { id, cancel, join }
    }

    async fn run_when_permitted(&self, request: &ReportRequest, cancel: &CancellationToken) -> String {
        let permit = tokio::select! {
            permit = self.permits.clone().acquire_owned() => permit,
            _ = cancel.cancelled() => {
                tracing::info!("report run cancelled before it started");
                return PROCESSING_SENTINEL.to_string();
            }
        };
        let Ok(_permit) = permit else {
            return PROCESSING_SENTINEL.to_string();
        };
        self.executor.execute(request, cancel).await
    }

    /// Cancels every queued or running report; returns how many were signalled.
    pub fn cancel_all(&self) -> usize {
        let active = self.lock();
        for token in active.values() {
            token.cancel();
        }
        tracing::info!(runs = active.len(), "cancelled active report runs");
        active.len()
    }

    pub fn active_runs(&self) -> usize {
        self.lock().len()
    }
}
