use crate::error::AppError;
use crate::job::{JobId, JobOutcome, JobState};
use crate::queue_store::{OutcomeLookup, QueueStore};

/// Current state of one job, plus its place in line while queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobStatusReport {
    pub state: JobState,
    pub position: Option<u64>,
}

/// Per-identifier entry of a batch result lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum JobResult {
    /// Finished without error.
    Ready(JobOutcome),
    /// Still queued or running.
    NotReady {
        state: JobState,
        position: Option<u64>,
    },
    /// Finished with an execution failure.
    Failed { reason: String, outcome: JobOutcome },
    /// Unknown or evicted identifier.
    NotFound,
}

/// Read-side queries over the queue store.
#[derive(Clone)]
pub struct StatusService<Q: QueueStore> {
    store: Q,
}

impl<Q: QueueStore> StatusService<Q> {
    pub fn new(store: Q) -> Self {
        Self { store }
    }

    /// State of a single job. Fails with [`AppError::NotFound`] for unknown or evicted ids.
    pub async fn get_status(&self, id: JobId) -> Result<JobStatusReport, AppError> {
        let state = self
            .store
            .status(id)
            .await?
            .ok_or_else(|| AppError::NotFound(id.to_string()))?;

        if state != JobState::Queued {
            return Ok(JobStatusReport {
                state,
                position: None,
            });
        }

        match self.store.position(id).await? {
            Some(position) => Ok(JobStatusReport {
                state,
                position: Some(position),
            }),
            // Claimed between the two reads.
            None => {
                let state = self
                    .store
                    .status(id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(id.to_string()))?;
                Ok(JobStatusReport {
                    state,
                    position: None,
                })
            }
        }
    }

    /// Look up each id independently.
    ///
    /// An unfinished, failed or unknown job never prevents the others from
    /// being returned. Only a store outage fails the whole batch.
    pub async fn get_results(&self, ids: &[JobId]) -> Result<Vec<(JobId, JobResult)>, AppError> {
        let mut results = Vec::with_capacity(ids.len());
        for &id in ids {
            let result = match self.get_result(id).await {
                Ok(result) => result,
                Err(e) => {
                    // A reachable store means only this id's record is bad.
                    self.store.health_check().await?;
                    tracing::warn!(%id, error = %e, "Result lookup failed, reporting job as not found");
                    JobResult::NotFound
                }
            };
            results.push((id, result));
        }
        Ok(results)
    }

    async fn get_result(&self, id: JobId) -> Result<JobResult, AppError> {
        match self.store.read_outcome(id).await? {
            OutcomeLookup::NotFound => Ok(JobResult::NotFound),
            OutcomeLookup::NotFinished(JobState::Queued) => {
                Ok(match self.store.position(id).await? {
                    Some(position) => JobResult::NotReady {
                        state: JobState::Queued,
                        position: Some(position),
                    },
                    // A queued job only ever leaves the queue by being claimed.
                    None => JobResult::NotReady {
                        state: JobState::Running,
                        position: None,
                    },
                })
            }
            OutcomeLookup::NotFinished(state) => Ok(JobResult::NotReady {
                state,
                position: None,
            }),
            OutcomeLookup::Found(outcome) => match outcome.failure_reason().map(str::to_owned) {
                Some(reason) => Ok(JobResult::Failed { reason, outcome }),
                None => Ok(JobResult::Ready(outcome)),
            },
        }
    }
}
