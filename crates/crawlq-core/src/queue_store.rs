use std::future::Future;

use crate::error::AppError;
use crate::job::{JobDescriptor, JobId, JobOutcome, JobState};

/// Result of looking up a job's outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum OutcomeLookup {
    /// The job finished (successfully or not) and its outcome has not expired.
    Found(JobOutcome),
    /// The job exists but has not produced an outcome yet.
    NotFinished(JobState),
    /// Unknown identifier, or the outcome's TTL has elapsed.
    NotFound,
}

/// Shared FIFO of pending crawl jobs plus a keyed store of their outcomes.
///
/// The store is the single source of truth for job state. Producers call
/// [`enqueue`](Self::enqueue), workers call [`dequeue`](Self::dequeue), and
/// every queued descriptor must be delivered to exactly one worker.
/// Implementations must claim atomically (`SELECT FOR UPDATE SKIP LOCKED`
/// or equivalent).
///
/// # Known limitation
///
/// There is no lease or heartbeat. A worker that dies after
/// [`dequeue`](Self::dequeue) and before [`write_outcome`](Self::write_outcome)
/// leaves its job in `running` forever. Only a graceful shutdown hands jobs
/// back, via [`release_worker_jobs`](Self::release_worker_jobs).
pub trait QueueStore: Send + Sync + Clone {
    /// Append a descriptor to the queue. Returns its new identifier.
    fn enqueue(
        &self,
        descriptor: JobDescriptor,
    ) -> impl Future<Output = Result<JobId, AppError>> + Send;

    /// Atomically claim the oldest queued job and mark it `running`.
    ///
    /// Returns `None` if the queue is empty.
    fn dequeue(
        &self,
        worker_id: &str,
    ) -> impl Future<Output = Result<Option<(JobId, JobDescriptor)>, AppError>> + Send;

    /// Number of queued jobs ahead of this one, or `None` unless it is still queued.
    fn position(&self, id: JobId) -> impl Future<Output = Result<Option<u64>, AppError>> + Send;

    /// Current state, or `None` for unknown/evicted jobs.
    fn status(&self, id: JobId)
    -> impl Future<Output = Result<Option<JobState>, AppError>> + Send;

    /// Record the outcome of a running job and start its TTL clock.
    ///
    /// Fails with [`AppError::OutcomeAlreadyWritten`] on a second write and
    /// with [`AppError::NotFound`] for unknown ids.
    fn write_outcome(
        &self,
        id: JobId,
        outcome: &JobOutcome,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    fn read_outcome(
        &self,
        id: JobId,
    ) -> impl Future<Output = Result<OutcomeLookup, AppError>> + Send;

    /// Number of jobs still waiting to be claimed.
    fn queue_depth(&self) -> impl Future<Output = Result<u64, AppError>> + Send;

    /// Hand every job a worker is still running back to the queue (for graceful shutdown).
    fn release_worker_jobs(
        &self,
        worker_id: &str,
    ) -> impl Future<Output = Result<u64, AppError>> + Send;

    /// Physically delete finished jobs whose TTL has elapsed. Returns how many went.
    fn purge_expired(&self) -> impl Future<Output = Result<u64, AppError>> + Send;

    fn health_check(&self) -> impl Future<Output = Result<(), AppError>> + Send;
}
