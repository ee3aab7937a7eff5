use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::CrawlerConfig;
use crate::error::AppError;
use crate::job::WorkerConfig;
use crate::queue_store::QueueStore;
use crate::traits::{Extractor, RendererFactory};
use crate::worker::{TracingWorkerReporter, WorkerService};

/// Handle to a group of independent workers sharing one queue store.
///
/// Every worker launches its own renderer session on startup and keeps it
/// until shutdown; sessions are never shared between workers.
pub struct WorkerPool {
    cancel_token: CancellationToken,
    handles: Vec<JoinHandle<Result<(), AppError>>>,
}

impl WorkerPool {
    /// Spawn `config.workers` workers onto the current tokio runtime.
    pub fn spawn<Q, F, E>(queue: Q, factory: F, extractor: E, config: &CrawlerConfig) -> Self
    where
        Q: QueueStore + 'static,
        F: RendererFactory,
        E: Extractor,
    {
        let cancel_token = CancellationToken::new();
        let pool_id = Uuid::new_v4().to_string()[..8].to_string();

        let handles = (0..config.workers)
            .map(|index| {
                let worker_config = WorkerConfig::default()
                    .with_worker_id(format!("worker-{pool_id}-{index}"))
                    .with_poll_interval(config.poll_interval)
                    .with_page_load_timeout(config.max_page_load_timeout);
                let queue = queue.clone();
                let factory = factory.clone();
                let extractor = extractor.clone();
                let cancel_token = cancel_token.clone();

                tokio::spawn(async move {
                    let renderer = factory.launch().await.inspect_err(|e| {
                        tracing::error!(
                            worker_id = %worker_config.worker_id,
                            error = %e,
                            "Failed to launch renderer session"
                        );
                    })?;
                    WorkerService::new(queue, renderer, extractor, worker_config)
                        .run(cancel_token, &TracingWorkerReporter)
                        .await
                })
            })
            .collect();

        Self {
            cancel_token,
            handles,
        }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Token that stops every worker in the pool once cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Wait for all workers to exit, without asking them to.
    pub async fn join(self) -> Result<(), AppError> {
        let mut first_error = None;
        for handle in self.handles {
            let result = handle
                .await
                .map_err(|e| AppError::Generic(format!("Worker task panicked: {e}")))
                .and_then(|r| r);
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Stop taking new jobs, let in-flight jobs finish, and wait for every worker.
    pub async fn shutdown(self) -> Result<(), AppError> {
        self.cancel_token.cancel();
        self.join().await
    }
}
