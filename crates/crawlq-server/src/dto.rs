use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crawlq_core::error::AppError;
use crawlq_core::job::{CrawlRequest, JobDescriptor, JobOutcome, OutcomeResult};
use crawlq_core::status::JobResult;

// ---------------------------------------------------------------------------
// Crawl
// ---------------------------------------------------------------------------

/// Query parameters of `POST /crawl`.
///
/// `urls` and `x_paths` may repeat, so this is parsed from the raw query
/// string rather than through `Query`.
#[derive(Debug, Clone, PartialEq, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CrawlParams {
    /// URLs to crawl, one job each.
    pub urls: Vec<String>,
    /// Return the page source (default true).
    pub return_source: Option<bool>,
    /// Render through the reader view first (default true).
    pub simplify_source: Option<bool>,
    /// Extra seconds to wait after the page loads (default 0).
    pub load_wait_time: Option<f64>,
    /// Seconds to keep the result after the job finishes.
    pub results_ttl: Option<u64>,
    /// XPath expressions evaluated against the captured page.
    pub x_paths: Vec<String>,
    pub chatgpt_prompt: Option<String>,
    /// Required together with `chatgpt_prompt`.
    pub openai_key: Option<String>,
}

impl CrawlParams {
    pub fn from_query(query: &str) -> Result<Self, AppError> {
        let mut params = Self {
            urls: Vec::new(),
            return_source: None,
            simplify_source: None,
            load_wait_time: None,
            results_ttl: None,
            x_paths: Vec::new(),
            chatgpt_prompt: None,
            openai_key: None,
        };

        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "urls" => params.urls.push(value.into_owned()),
                "x_paths" => params.x_paths.push(value.into_owned()),
                "return_source" => params.return_source = Some(parse_bool(&key, &value)?),
                "simplify_source" => params.simplify_source = Some(parse_bool(&key, &value)?),
                "load_wait_time" => {
                    params.load_wait_time = Some(value.trim().parse().map_err(|_| {
                        AppError::ValidationError(format!("load_wait_time '{value}' is not a number"))
                    })?);
                }
                "results_ttl" => {
                    params.results_ttl = Some(value.trim().parse().map_err(|_| {
                        AppError::ValidationError(format!(
                            "results_ttl '{value}' is not a positive integer"
                        ))
                    })?);
                }
                "chatgpt_prompt" => params.chatgpt_prompt = Some(value.into_owned()),
                "openai_key" => params.openai_key = Some(value.into_owned()),
                _ => {}
            }
        }

        Ok(params)
    }

    pub fn into_request(self) -> CrawlRequest {
        let mut request = CrawlRequest::new(self.urls)
            .with_x_paths(self.x_paths)
            .with_prompt(self.chatgpt_prompt, self.openai_key);
        if let Some(value) = self.return_source {
            request = request.with_return_source(value);
        }
        if let Some(value) = self.simplify_source {
            request = request.with_simplify_source(value);
        }
        if let Some(value) = self.load_wait_time {
            request = request.with_load_wait_time(value);
        }
        if let Some(value) = self.results_ttl {
            request = request.with_results_ttl(value);
        }
        request
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, AppError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(AppError::ValidationError(format!(
            "{key} '{value}' is not a boolean"
        ))),
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CrawlResponse {
    #[serde(rename = "jobIDs")]
    pub job_ids: Vec<Uuid>,
    pub current_queue_size: u64,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueueSizeResponse {
    pub current_queue_size: u64,
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct JobStatusQuery {
    /// Returned from `/crawl`.
    #[serde(rename = "jobID")]
    pub job_id: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct JobStatusResponse {
    /// `queued`, `running`, `finished` or `failed`.
    pub status: String,
    /// Jobs ahead of this one; only set while queued.
    pub position: Option<u64>,
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Job options as stored, without the prompt API key.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct DescriptorView {
    pub url: String,
    pub return_source: bool,
    pub simplify_source: bool,
    pub load_wait_time: f64,
    pub x_paths: Vec<String>,
    pub results_ttl: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chatgpt_prompt: Option<String>,
}

impl From<JobDescriptor> for DescriptorView {
    fn from(d: JobDescriptor) -> Self {
        Self {
            url: d.url,
            return_source: d.return_source,
            simplify_source: d.simplify_source,
            load_wait_time: d.load_wait_time,
            x_paths: d.x_paths,
            results_ttl: d.results_ttl,
            chatgpt_prompt: d.prompt.map(|p| p.prompt),
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct OutcomeView {
    pub config: DescriptorView,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x_path_results: Option<Vec<Vec<String>>>,
}

impl From<JobOutcome> for OutcomeView {
    fn from(outcome: JobOutcome) -> Self {
        let (page_source, x_path_results) = match outcome.result {
            OutcomeResult::Success {
                page_source,
                x_path_results,
            } => (page_source, x_path_results),
            OutcomeResult::Failure { .. } => (None, None),
        };
        Self {
            config: outcome.descriptor.into(),
            started_at: outcome.started_at,
            ended_at: outcome.ended_at,
            page_source,
            x_path_results,
        }
    }
}

/// One entry of the `/jobResults` map.
#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobResultEntry {
    Finished {
        result: OutcomeView,
    },
    NotReady {
        /// `queued` or `running`.
        state: String,
        position: Option<u64>,
    },
    Failed {
        error: String,
        result: OutcomeView,
    },
    NotFound,
}

impl From<JobResult> for JobResultEntry {
    fn from(result: JobResult) -> Self {
        match result {
            JobResult::Ready(outcome) => Self::Finished {
                result: outcome.into(),
            },
            JobResult::NotReady { state, position } => Self::NotReady {
                state: state.to_string(),
                position,
            },
            JobResult::Failed { reason, outcome } => Self::Failed {
                error: reason,
                result: outcome.into(),
            },
            JobResult::NotFound => Self::NotFound,
        }
    }
}

/// Results keyed by the job id exactly as it was requested.
pub type JobResultsResponse = BTreeMap<String, JobResultEntry>;

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub store: &'static str,
    pub backend: &'static str,
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
