use std::time::Duration;

use url::Url;

use crate::config::CrawlerConfig;
use crate::error::AppError;
use crate::job::{CrawlRequest, JobDescriptor, JobId, PromptConfig};
use crate::queue_store::QueueStore;

/// What a successful submission hands back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReceipt {
    /// One id per submitted URL, in input order.
    pub job_ids: Vec<JobId>,
    /// Queue depth observed right after enqueuing.
    pub queue_size: u64,
}

/// Turns batch crawl requests into independent queued jobs.
#[derive(Clone)]
pub struct SubmissionService<Q: QueueStore> {
    store: Q,
    default_results_ttl: u64,
    max_load_wait: Duration,
}

impl<Q: QueueStore> SubmissionService<Q> {
    pub fn new(store: Q, default_results_ttl: u64) -> Self {
        Self {
            store,
            default_results_ttl,
            max_load_wait: CrawlerConfig::default().max_page_load_timeout,
        }
    }

    /// Longest `load_wait_time` a request may ask for.
    pub fn with_max_load_wait(mut self, max: Duration) -> Self {
        self.max_load_wait = max;
        self
    }

    /// Validate the whole request, then enqueue one job per URL.
    ///
    /// Nothing is enqueued unless every check passes.
    pub async fn submit(&self, request: CrawlRequest) -> Result<SubmitReceipt, AppError> {
        let descriptors = self.build_descriptors(request)?;

        let mut job_ids = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let url = descriptor.url.clone();
            let id = self.store.enqueue(descriptor).await?;
            tracing::debug!(job_id = %id, %url, "Job enqueued");
            job_ids.push(id);
        }

        let queue_size = self.store.queue_depth().await?;
        tracing::info!(jobs = job_ids.len(), queue_size, "Crawl batch submitted");

        Ok(SubmitReceipt {
            job_ids,
            queue_size,
        })
    }

    /// Current number of queued jobs.
    pub async fn queue_size(&self) -> Result<u64, AppError> {
        self.store.queue_depth().await
    }

    fn build_descriptors(&self, request: CrawlRequest) -> Result<Vec<JobDescriptor>, AppError> {
        let prompt = match (request.chatgpt_prompt, request.openai_key) {
            (Some(prompt), Some(api_key)) => Some(PromptConfig { prompt, api_key }),
            (None, None) => None,
            (Some(_), None) => {
                return Err(AppError::ValidationError(
                    "chatgpt_prompt was provided but openai_key was not - you must provide both or do not set either".into(),
                ));
            }
            (None, Some(_)) => {
                return Err(AppError::ValidationError(
                    "openai_key was provided but chatgpt_prompt was not - you must provide both or do not set either".into(),
                ));
            }
        };

        if request.urls.is_empty() {
            return Err(AppError::ValidationError(
                "at least one url is required".into(),
            ));
        }

        if !request.load_wait_time.is_finite() || request.load_wait_time < 0.0 {
            return Err(AppError::ValidationError(format!(
                "load_wait_time must be a non-negative number of seconds, got {}",
                request.load_wait_time
            )));
        }
        if request.load_wait_time > self.max_load_wait.as_secs_f64() {
            return Err(AppError::ValidationError(format!(
                "load_wait_time must not exceed {} seconds, got {}",
                self.max_load_wait.as_secs_f64(),
                request.load_wait_time
            )));
        }

        let results_ttl = request.results_ttl.unwrap_or(self.default_results_ttl);
        if results_ttl == 0 {
            return Err(AppError::ValidationError(
                "results_ttl must be at least 1 second".into(),
            ));
        }

        if let Some(bad) = request.x_paths.iter().find(|x| x.trim().is_empty()) {
            return Err(AppError::ValidationError(format!(
                "x_paths must not contain empty expressions, got {bad:?}"
            )));
        }

        for url in &request.urls {
            validate_url(url)?;
        }

        Ok(request
            .urls
            .into_iter()
            .map(|url| JobDescriptor {
                url,
                return_source: request.return_source,
                simplify_source: request.simplify_source,
                load_wait_time: request.load_wait_time,
                x_paths: request.x_paths.clone(),
                results_ttl,
                prompt: prompt.clone(),
            })
            .collect())
    }
}

/// Require a well-formed absolute http(s) URL.
fn validate_url(raw: &str) -> Result<(), AppError> {
    let parsed = Url::parse(raw)
        .map_err(|e| AppError::ValidationError(format!("Invalid URL '{raw}': {e}")))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(AppError::ValidationError(format!(
                "URL scheme '{scheme}' is not allowed (only http/https): {raw}"
            )));
        }
    }

    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(AppError::ValidationError(format!("URL has no host: {raw}")));
    }

    Ok(())
}
