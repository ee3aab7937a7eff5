//! Process-local queue store.
//!
//! Useful for tests and single-process development. Nothing survives a
//! restart, so production deployments should use the PostgreSQL store.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::error::AppError;
use crate::job::{JobDescriptor, JobId, JobOutcome, JobState};
use crate::queue_store::{OutcomeLookup, QueueStore};

struct Entry {
    seq: u64,
    descriptor: JobDescriptor,
    state: JobState,
    worker_id: Option<String>,
    outcome: Option<JobOutcome>,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Default)]
struct Inner {
    next_seq: u64,
    pending: VecDeque<JobId>,
    jobs: HashMap<JobId, Entry>,
}

impl Inner {
    /// Live entry lookup; expired entries are dropped on the way.
    fn live(&mut self, id: JobId, now: DateTime<Utc>) -> Option<&Entry> {
        if self.jobs.get(&id).is_some_and(|e| e.is_expired(now)) {
            self.jobs.remove(&id);
            return None;
        }
        self.jobs.get(&id)
    }
}

/// In-memory [`QueueStore`] guarded by a single mutex.
#[derive(Clone)]
pub struct InMemoryQueueStore {
    inner: Arc<Mutex<Inner>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryQueueStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Use a custom clock for expiry decisions.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            clock,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, AppError> {
        self.inner
            .lock()
            .map_err(|_| AppError::Generic("in-memory queue store lock poisoned".into()))
    }
}

impl Default for InMemoryQueueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueStore for InMemoryQueueStore {
    async fn enqueue(&self, descriptor: JobDescriptor) -> Result<JobId, AppError> {
        let mut inner = self.lock()?;
        let id = Uuid::new_v4();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.jobs.insert(
            id,
            Entry {
                seq,
                descriptor,
                state: JobState::Queued,
                worker_id: None,
                outcome: None,
                expires_at: None,
            },
        );
        inner.pending.push_back(id);
        Ok(id)
    }

    async fn dequeue(&self, worker_id: &str) -> Result<Option<(JobId, JobDescriptor)>, AppError> {
        let mut inner = self.lock()?;
        while let Some(id) = inner.pending.pop_front() {
            if let Some(entry) = inner.jobs.get_mut(&id) {
                entry.state = JobState::Running;
                entry.worker_id = Some(worker_id.to_string());
                return Ok(Some((id, entry.descriptor.clone())));
            }
        }
        Ok(None)
    }

    async fn position(&self, id: JobId) -> Result<Option<u64>, AppError> {
        let inner = self.lock()?;
        match inner.jobs.get(&id) {
            Some(entry) if entry.state == JobState::Queued => Ok(inner
                .pending
                .iter()
                .position(|queued| *queued == id)
                .map(|p| p as u64)),
            _ => Ok(None),
        }
    }

    async fn status(&self, id: JobId) -> Result<Option<JobState>, AppError> {
        let now = self.clock.now();
        let mut inner = self.lock()?;
        Ok(inner.live(id, now).map(|e| e.state))
    }

    async fn write_outcome(&self, id: JobId, outcome: &JobOutcome) -> Result<(), AppError> {
        let now = self.clock.now();
        let mut inner = self.lock()?;
        let entry = inner
            .jobs
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(id.to_string()))?;

        match entry.state {
            JobState::Running => {
                entry.state = outcome.state();
                entry.expires_at = Some(entry.descriptor.expires_at(now));
                entry.outcome = Some(outcome.clone());
                entry.worker_id = None;
                Ok(())
            }
            JobState::Finished | JobState::Failed => {
                Err(AppError::OutcomeAlreadyWritten(id.to_string()))
            }
            JobState::Queued => Err(AppError::Generic(format!(
                "Job {id} has not been dequeued; refusing outcome"
            ))),
        }
    }

    async fn read_outcome(&self, id: JobId) -> Result<OutcomeLookup, AppError> {
        let now = self.clock.now();
        let mut inner = self.lock()?;
        Ok(match inner.live(id, now) {
            None => OutcomeLookup::NotFound,
            Some(Entry {
                outcome: Some(outcome),
                ..
            }) => OutcomeLookup::Found(outcome.clone()),
            Some(entry) => OutcomeLookup::NotFinished(entry.state),
        })
    }

    async fn queue_depth(&self) -> Result<u64, AppError> {
        Ok(self.lock()?.pending.len() as u64)
    }

    async fn release_worker_jobs(&self, worker_id: &str) -> Result<u64, AppError> {
        let mut inner = self.lock()?;
        let mut released = Vec::new();
        for (id, entry) in inner.jobs.iter_mut() {
            if entry.state == JobState::Running && entry.worker_id.as_deref() == Some(worker_id) {
                entry.state = JobState::Queued;
                entry.worker_id = None;
                released.push(*id);
            }
        }

        let count = released.len() as u64;
        if count > 0 {
            // Released jobs go back to their original place in line.
            inner.pending.extend(released);
            let Inner { pending, jobs, .. } = &mut *inner;
            pending
                .make_contiguous()
                .sort_by_key(|id| jobs.get(id).map_or(u64::MAX, |e| e.seq));
        }
        Ok(count)
    }

    async fn purge_expired(&self) -> Result<u64, AppError> {
        let now = self.clock.now();
        let mut inner = self.lock()?;
        let before = inner.jobs.len();
        inner.jobs.retain(|_, entry| !entry.is_expired(now));
        Ok((before - inner.jobs.len()) as u64)
    }

    async fn health_check(&self) -> Result<(), AppError> {
        self.lock().map(|_| ())
    }
}
