use std::time::Instant;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::job::{JobDescriptor, JobId, JobOutcome, WorkerConfig};
use crate::queue_store::QueueStore;
use crate::traits::{Extractor, Renderer};

/// Events emitted by the worker for monitoring/logging.
#[derive(Debug, Clone)]
pub enum WorkerEvent<'a> {
    Started {
        worker_id: &'a str,
    },
    Polling,
    JobClaimed {
        job_id: JobId,
        url: &'a str,
    },
    JobCompleted {
        job_id: JobId,
        elapsed_ms: u128,
    },
    JobFailed {
        job_id: JobId,
        error: &'a str,
    },
    ShuttingDown {
        worker_id: &'a str,
        jobs_released: u64,
    },
    Stopped {
        worker_id: &'a str,
    },
}

/// Trait for receiving worker events (decoupled logging).
pub trait WorkerReporter: Send + Sync {
    fn report(&self, event: WorkerEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingWorkerReporter;

impl WorkerReporter for TracingWorkerReporter {
    fn report(&self, event: WorkerEvent<'_>) {
        match event {
            WorkerEvent::Started { worker_id } => {
                tracing::info!(%worker_id, "Worker started");
            }
            WorkerEvent::Polling => {
                tracing::trace!("Polling for jobs");
            }
            WorkerEvent::JobClaimed { job_id, url } => {
                tracing::info!(%job_id, %url, "Job claimed");
            }
            WorkerEvent::JobCompleted { job_id, elapsed_ms } => {
                tracing::info!(%job_id, %elapsed_ms, "Job finished");
            }
            WorkerEvent::JobFailed { job_id, error } => {
                tracing::warn!(%job_id, %error, "Job failed");
            }
            WorkerEvent::ShuttingDown {
                worker_id,
                jobs_released,
            } => {
                tracing::info!(%worker_id, %jobs_released, "Worker shutting down");
            }
            WorkerEvent::Stopped { worker_id } => {
                tracing::info!(%worker_id, "Worker stopped");
            }
        }
    }
}

/// A single worker: polls the queue and crawls one job at a time on its own renderer session.
pub struct WorkerService<Q, R, E>
where
    Q: QueueStore,
    R: Renderer,
    E: Extractor,
{
    queue: Q,
    renderer: R,
    extractor: E,
    config: WorkerConfig,
}

impl<Q, R, E> WorkerService<Q, R, E>
where
    Q: QueueStore,
    R: Renderer,
    E: Extractor,
{
    pub fn new(queue: Q, renderer: R, extractor: E, config: WorkerConfig) -> Self {
        Self {
            queue,
            renderer,
            extractor,
            config,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.config.worker_id
    }

    /// Run the worker loop until cancellation, then close the renderer session.
    ///
    /// Cancellation is only observed between jobs; a claimed job always runs
    /// to completion or failure.
    pub async fn run<WR: WorkerReporter>(
        mut self,
        cancel_token: CancellationToken,
        reporter: &WR,
    ) -> Result<(), AppError> {
        reporter.report(WorkerEvent::Started {
            worker_id: &self.config.worker_id,
        });

        loop {
            if cancel_token.is_cancelled() {
                break;
            }

            reporter.report(WorkerEvent::Polling);

            match self.queue.dequeue(&self.config.worker_id).await {
                Ok(Some((job_id, descriptor))) => {
                    reporter.report(WorkerEvent::JobClaimed {
                        job_id,
                        url: &descriptor.url,
                    });
                    self.process_job(job_id, &descriptor, reporter).await;
                }
                Ok(None) => {
                    tokio::select! {
                        () = tokio::time::sleep(self.config.poll_interval) => {}
                        () = cancel_token.cancelled() => break,
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to dequeue job");
                    tokio::select! {
                        () = tokio::time::sleep(self.config.poll_interval * 2) => {}
                        () = cancel_token.cancelled() => break,
                    }
                }
            }
        }

        let released = self
            .queue
            .release_worker_jobs(&self.config.worker_id)
            .await
            .unwrap_or(0);

        reporter.report(WorkerEvent::ShuttingDown {
            worker_id: &self.config.worker_id,
            jobs_released: released,
        });

        let Self {
            renderer, config, ..
        } = self;
        renderer.close().await;

        reporter.report(WorkerEvent::Stopped {
            worker_id: &config.worker_id,
        });

        Ok(())
    }

    async fn process_job<WR: WorkerReporter>(
        &mut self,
        job_id: JobId,
        descriptor: &JobDescriptor,
        reporter: &WR,
    ) {
        let started = Instant::now();
        let outcome = self.execute(descriptor).await;

        match outcome.failure_reason() {
            Some(error) => reporter.report(WorkerEvent::JobFailed { job_id, error }),
            None => reporter.report(WorkerEvent::JobCompleted {
                job_id,
                elapsed_ms: started.elapsed().as_millis(),
            }),
        }

        if let Err(e) = self.queue.write_outcome(job_id, &outcome).await {
            tracing::error!(%job_id, error = %e, "Failed to write job outcome");
        }
    }

    /// Crawl one descriptor. Never fails: execution errors become a failure outcome.
    pub async fn execute(&mut self, descriptor: &JobDescriptor) -> JobOutcome {
        let started_at = Utc::now();

        match self.capture(descriptor).await {
            Ok(page) => {
                let x_path_results = if descriptor.x_paths.is_empty() {
                    None
                } else {
                    Some(self.evaluate(&page, &descriptor.x_paths))
                };
                let page_source = descriptor.return_source.then_some(page);
                JobOutcome::success(descriptor.clone(), started_at, page_source, x_path_results)
            }
            Err(e) => JobOutcome::failure(descriptor.clone(), started_at, e.to_string()),
        }
    }

    async fn capture(&mut self, descriptor: &JobDescriptor) -> Result<String, AppError> {
        let timeout = self.config.page_load_timeout;

        tracing::debug!(url = %descriptor.url, simplify = descriptor.simplify_source, "Navigating");
        tokio::time::timeout(
            timeout,
            self.renderer
                .navigate(&descriptor.url, descriptor.simplify_source),
        )
        .await
        .map_err(|_| AppError::Timeout(timeout.as_secs()))??;

        let wait = descriptor.load_wait();
        if !wait.is_zero() {
            tracing::debug!(wait_ms = wait.as_millis() as u64, "Waiting for page to settle");
            tokio::time::sleep(wait).await;
        }

        let page = tokio::time::timeout(timeout, self.renderer.capture())
            .await
            .map_err(|_| AppError::Timeout(timeout.as_secs()))??;
        tracing::debug!(bytes = page.len(), "Captured page");

        Ok(page)
    }

    /// One match list per expression, in order. A failing expression yields `[]`.
    fn evaluate(&self, page: &str, x_paths: &[String]) -> Vec<Vec<String>> {
        x_paths
            .iter()
            .map(|expression| match self.extractor.extract(page, expression) {
                Ok(matches) => matches,
                Err(e) => {
                    tracing::warn!(%expression, error = %e, "Extraction failed, returning no matches");
                    Vec::new()
                }
            })
            .collect()
    }
}
