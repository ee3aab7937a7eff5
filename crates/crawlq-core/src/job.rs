use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque job identifier, assigned by the queue store at enqueue time.
pub type JobId = Uuid;

/// Lifecycle state of a crawl job.
///
/// Transitions are monotonic: `queued -> running -> finished | failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Finished,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Finished => "finished",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Finished | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "queued" => Ok(JobState::Queued),
            "running" => Ok(JobState::Running),
            "finished" => Ok(JobState::Finished),
            "failed" => Ok(JobState::Failed),
            _ => Err(format!("Unknown job state: {}", s)),
        }
    }
}

/// Prompt template plus the credential needed to run it.
///
/// Carried through the job untouched; prompt execution is not wired up.
///
/// The key is never serialized, so it does not reach a persistent store
/// and comes back empty from one.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptConfig {
    pub prompt: String,
    #[serde(skip_serializing, default)]
    pub api_key: String,
}

impl fmt::Debug for PromptConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromptConfig")
            .field("prompt", &self.prompt)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Immutable description of one crawl request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub url: String,
    pub return_source: bool,
    pub simplify_source: bool,
    /// Extra delay after navigation, in seconds.
    pub load_wait_time: f64,
    pub x_paths: Vec<String>,
    /// Outcome retention after completion, in seconds.
    pub results_ttl: u64,
    pub prompt: Option<PromptConfig>,
}

impl JobDescriptor {
    pub fn load_wait(&self) -> Duration {
        Duration::try_from_secs_f64(self.load_wait_time).unwrap_or(Duration::ZERO)
    }

    pub fn results_ttl(&self) -> TimeDelta {
        i64::try_from(self.results_ttl)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX)
    }

    /// When an outcome written at `finished_at` stops being retrievable.
    pub fn expires_at(&self, finished_at: DateTime<Utc>) -> DateTime<Utc> {
        finished_at
            .checked_add_signed(self.results_ttl())
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// A batch crawl request: many URLs sharing one set of options.
#[derive(Debug, Clone)]
pub struct CrawlRequest {
    pub urls: Vec<String>,
    pub return_source: bool,
    pub simplify_source: bool,
    pub load_wait_time: f64,
    /// Falls back to the configured default when `None`.
    pub results_ttl: Option<u64>,
    pub x_paths: Vec<String>,
    pub chatgpt_prompt: Option<String>,
    pub openai_key: Option<String>,
}

impl CrawlRequest {
    pub fn new<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            urls: urls.into_iter().map(Into::into).collect(),
            return_source: true,
            simplify_source: true,
            load_wait_time: 0.0,
            results_ttl: None,
            x_paths: Vec::new(),
            chatgpt_prompt: None,
            openai_key: None,
        }
    }

    pub fn with_return_source(mut self, value: bool) -> Self {
        self.return_source = value;
        self
    }

    pub fn with_simplify_source(mut self, value: bool) -> Self {
        self.simplify_source = value;
        self
    }

    pub fn with_load_wait_time(mut self, seconds: f64) -> Self {
        self.load_wait_time = seconds;
        self
    }

    pub fn with_results_ttl(mut self, seconds: u64) -> Self {
        self.results_ttl = Some(seconds);
        self
    }

    pub fn with_x_paths<I, S>(mut self, x_paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.x_paths = x_paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_prompt(mut self, prompt: Option<String>, api_key: Option<String>) -> Self {
        self.chatgpt_prompt = prompt;
        self.openai_key = api_key;
        self
    }
}

/// What a job produced, explicitly tagged as success or failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OutcomeResult {
    Success {
        /// Present iff the descriptor asked for `return_source`.
        page_source: Option<String>,
        /// One match list per x_path, in input order. Absent when no x_paths were given.
        x_path_results: Option<Vec<Vec<String>>>,
    },
    Failure {
        reason: String,
    },
}

/// The durable, write-once result of executing a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub descriptor: JobDescriptor,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    #[serde(flatten)]
    pub result: OutcomeResult,
}

impl JobOutcome {
    pub fn success(
        descriptor: JobDescriptor,
        started_at: DateTime<Utc>,
        page_source: Option<String>,
        x_path_results: Option<Vec<Vec<String>>>,
    ) -> Self {
        Self {
            descriptor,
            started_at,
            ended_at: Utc::now(),
            result: OutcomeResult::Success {
                page_source,
                x_path_results,
            },
        }
    }

    pub fn failure(
        descriptor: JobDescriptor,
        started_at: DateTime<Utc>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            descriptor,
            started_at,
            ended_at: Utc::now(),
            result: OutcomeResult::Failure {
                reason: reason.into(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.result, OutcomeResult::Success { .. })
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match &self.result {
            OutcomeResult::Failure { reason } => Some(reason),
            OutcomeResult::Success { .. } => None,
        }
    }

    /// The terminal state this outcome moves its job into.
    pub fn state(&self) -> JobState {
        if self.is_success() {
            JobState::Finished
        } else {
            JobState::Failed
        }
    }
}

/// Configuration for a single worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub poll_interval: Duration,
    /// Upper bound on a single render (navigation + capture).
    pub page_load_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", &Uuid::new_v4().to_string()[..8]),
            poll_interval: Duration::from_secs(1),
            page_load_timeout: Duration::from_secs(30),
        }
    }
}

impl WorkerConfig {
    pub fn with_worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = id.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_page_load_timeout(mut self, timeout: Duration) -> Self {
        self.page_load_timeout = timeout;
        self
    }
}
