use chrono::Utc;
use sqlx::types::Json;
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

use crawlq_core::error::AppError;
use crawlq_core::job::{JobDescriptor, JobId, JobOutcome, JobState};
use crawlq_core::queue_store::{OutcomeLookup, QueueStore};

/// PostgreSQL-backed queue store using `SELECT FOR UPDATE SKIP LOCKED`.
///
/// Jobs are claimed in `seq` order. Outcome expiry is checked against the
/// database clock on every read, and expired rows are physically removed by
/// [`purge_expired`](QueueStore::purge_expired).
#[derive(Clone)]
pub struct PgQueueStore {
    pool: Pool<Postgres>,
}

impl PgQueueStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_error(e: sqlx::Error) -> AppError {
    AppError::DatabaseError(e.to_string())
}

fn parse_state(raw: &str) -> Result<JobState, AppError> {
    raw.parse()
        .map_err(|_| AppError::DatabaseError(format!("Unknown job status '{raw}' in crawl_jobs")))
}

#[derive(sqlx::FromRow)]
struct ClaimedRow {
    id: Uuid,
    descriptor: Json<JobDescriptor>,
}

#[derive(sqlx::FromRow)]
struct OutcomeRow {
    status: String,
    outcome: Option<Json<JobOutcome>>,
}

impl QueueStore for PgQueueStore {
    async fn enqueue(&self, descriptor: JobDescriptor) -> Result<JobId, AppError> {
        let id = Uuid::new_v4();
        sqlx::query(r#"INSERT INTO crawl_jobs (id, descriptor) VALUES ($1, $2)"#)
            .bind(id)
            .bind(Json(&descriptor))
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(id)
    }

    async fn dequeue(&self, worker_id: &str) -> Result<Option<(JobId, JobDescriptor)>, AppError> {
        let row = sqlx::query_as::<_, ClaimedRow>(
            r#"
            UPDATE crawl_jobs
            SET status = 'running', worker_id = $1, started_at = NOW()
            WHERE id = (
                SELECT id FROM crawl_jobs
                WHERE status = 'queued'
                ORDER BY seq ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING id, descriptor
            "#,
        )
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(row.map(|r| (r.id, r.descriptor.0)))
    }

    async fn position(&self, id: JobId) -> Result<Option<u64>, AppError> {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT (
                SELECT COUNT(*) FROM crawl_jobs ahead
                WHERE ahead.status = 'queued' AND ahead.seq < job.seq
            )
            FROM crawl_jobs job
            WHERE job.id = $1 AND job.status = 'queued'
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(row.map(|(ahead,)| ahead.max(0) as u64))
    }

    async fn status(&self, id: JobId) -> Result<Option<JobState>, AppError> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT status FROM crawl_jobs
            WHERE id = $1 AND (expires_at IS NULL OR expires_at > NOW())
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(|(status,)| parse_state(&status)).transpose()
    }

    async fn write_outcome(&self, id: JobId, outcome: &JobOutcome) -> Result<(), AppError> {
        let expires_at = outcome.descriptor.expires_at(Utc::now());
        let result = sqlx::query(
            r#"
            UPDATE crawl_jobs
            SET status = $2, outcome = $3, finished_at = NOW(), expires_at = $4, worker_id = NULL
            WHERE id = $1 AND status = 'running'
            "#,
        )
        .bind(id)
        .bind(outcome.state().as_str())
        .bind(Json(outcome))
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        // Nothing updated: explain why.
        match self.status(id).await? {
            None => Err(AppError::NotFound(id.to_string())),
            Some(JobState::Finished | JobState::Failed) => {
                Err(AppError::OutcomeAlreadyWritten(id.to_string()))
            }
            Some(state) => Err(AppError::Generic(format!(
                "Job {id} is {state}; refusing outcome"
            ))),
        }
    }

    async fn read_outcome(&self, id: JobId) -> Result<OutcomeLookup, AppError> {
        let row = sqlx::query_as::<_, OutcomeRow>(
            r#"
            SELECT status, outcome FROM crawl_jobs
            WHERE id = $1 AND (expires_at IS NULL OR expires_at > NOW())
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(match row {
            None => OutcomeLookup::NotFound,
            Some(OutcomeRow {
                outcome: Some(outcome),
                ..
            }) => OutcomeLookup::Found(outcome.0),
            Some(OutcomeRow { status, .. }) => OutcomeLookup::NotFinished(parse_state(&status)?),
        })
    }

    async fn queue_depth(&self) -> Result<u64, AppError> {
        let (count,): (i64,) =
            sqlx::query_as(r#"SELECT COUNT(*) FROM crawl_jobs WHERE status = 'queued'"#)
                .fetch_one(&self.pool)
                .await
                .map_err(db_error)?;

        Ok(count.max(0) as u64)
    }

    async fn release_worker_jobs(&self, worker_id: &str) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE crawl_jobs
            SET status = 'queued', worker_id = NULL, started_at = NULL
            WHERE worker_id = $1 AND status = 'running'
            "#,
        )
        .bind(worker_id)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(result.rows_affected())
    }

    async fn purge_expired(&self) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"DELETE FROM crawl_jobs WHERE expires_at IS NOT NULL AND expires_at <= NOW()"#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        let purged = result.rows_affected();
        if purged > 0 {
            tracing::debug!(purged, "Purged expired crawl jobs");
        }
        Ok(purged)
    }

    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }
}
