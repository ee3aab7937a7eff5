use crawlq_core::config::CrawlerConfig;
use crawlq_core::error::AppError;
use crawlq_core::job::{JobDescriptor, JobId, JobOutcome, JobState};
use crawlq_core::memory::InMemoryQueueStore;
use crawlq_core::queue_store::{OutcomeLookup, QueueStore};
use crawlq_core::{StatusService, SubmissionService};
use crawlq_db::PgQueueStore;

/// The queue store backing this server process, picked at startup.
#[derive(Clone)]
pub enum AnyQueueStore {
    Postgres(PgQueueStore),
    Memory(InMemoryQueueStore),
}

impl AnyQueueStore {
    pub fn backend(&self) -> &'static str {
        match self {
            Self::Postgres(_) => "postgres",
            Self::Memory(_) => "memory",
        }
    }
}

macro_rules! delegate {
    ($self:ident, $store:ident => $call:expr) => {
        match $self {
            AnyQueueStore::Postgres($store) => $call.await,
            AnyQueueStore::Memory($store) => $call.await,
        }
    };
}

impl QueueStore for AnyQueueStore {
    async fn enqueue(&self, descriptor: JobDescriptor) -> Result<JobId, AppError> {
        delegate!(self, s => s.enqueue(descriptor))
    }

    async fn dequeue(&self, worker_id: &str) -> Result<Option<(JobId, JobDescriptor)>, AppError> {
        delegate!(self, s => s.dequeue(worker_id))
    }

    async fn position(&self, id: JobId) -> Result<Option<u64>, AppError> {
        delegate!(self, s => s.position(id))
    }

    async fn status(&self, id: JobId) -> Result<Option<JobState>, AppError> {
        delegate!(self, s => s.status(id))
    }

    async fn write_outcome(&self, id: JobId, outcome: &JobOutcome) -> Result<(), AppError> {
        delegate!(self, s => s.write_outcome(id, outcome))
    }

    async fn read_outcome(&self, id: JobId) -> Result<OutcomeLookup, AppError> {
        delegate!(self, s => s.read_outcome(id))
    }

    async fn queue_depth(&self) -> Result<u64, AppError> {
        delegate!(self, s => s.queue_depth())
    }

    async fn release_worker_jobs(&self, worker_id: &str) -> Result<u64, AppError> {
        delegate!(self, s => s.release_worker_jobs(worker_id))
    }

    async fn purge_expired(&self) -> Result<u64, AppError> {
        delegate!(self, s => s.purge_expired())
    }

    async fn health_check(&self) -> Result<(), AppError> {
        delegate!(self, s => s.health_check())
    }
}

/// Shared application state, available to all route handlers via `State<Arc<AppState>>`.
pub struct AppState {
    pub store: AnyQueueStore,
    pub submission: SubmissionService<AnyQueueStore>,
    pub status: StatusService<AnyQueueStore>,
}

impl AppState {
    pub fn new(store: AnyQueueStore, config: &CrawlerConfig) -> Self {
        Self {
            submission: SubmissionService::new(store.clone(), config.default_results_ttl)
                .with_max_load_wait(config.max_page_load_timeout),
            status: StatusService::new(store.clone()),
            store,
        }
    }
}
