//! Test utilities: mock implementations of the core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::clock::Clock;
use crate::error::AppError;
use crate::job::JobDescriptor;
use crate::traits::{Extractor, Renderer, RendererFactory};
use crate::worker::{WorkerEvent, WorkerReporter};

// ---------------------------------------------------------------------------
// MockRenderer
// ---------------------------------------------------------------------------

/// Mock renderer that serves pages from a queue of responses.
pub struct MockRenderer {
    /// Each navigation pops the first element.
    /// If empty, a default HTML page is served.
    responses: Arc<Mutex<Vec<Result<String, AppError>>>>,
    navigate_delay: Duration,
    current: Option<String>,
    /// Recorded calls, e.g. `"navigate https://example.com simplify=true"`, `"capture"`.
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl MockRenderer {
    pub fn new(html: &str) -> Self {
        Self::with_responses(vec![Ok(html.to_string())])
    }

    pub fn with_responses(responses: Vec<Result<String, AppError>>) -> Self {
        Self::from_shared(Arc::new(Mutex::new(responses)))
    }

    fn from_shared(responses: Arc<Mutex<Vec<Result<String, AppError>>>>) -> Self {
        Self {
            responses,
            navigate_delay: Duration::ZERO,
            current: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Make every navigation take this long (for timeout tests).
    pub fn with_navigate_delay(mut self, delay: Duration) -> Self {
        self.navigate_delay = delay;
        self
    }
}

impl Renderer for MockRenderer {
    async fn navigate(&mut self, url: &str, simplify: bool) -> Result<(), AppError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("navigate {url} simplify={simplify}"));

        if !self.navigate_delay.is_zero() {
            tokio::time::sleep(self.navigate_delay).await;
        }

        let next = {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Ok("<html><head><title>default</title></head><body>default</body></html>".to_string())
            } else {
                responses.remove(0)
            }
        };
        self.current = Some(next?);
        Ok(())
    }

    async fn capture(&mut self) -> Result<String, AppError> {
        self.calls.lock().unwrap().push("capture".to_string());
        self.current
            .clone()
            .ok_or_else(|| AppError::RenderError("nothing loaded".into()))
    }
}

// ---------------------------------------------------------------------------
// MockRendererFactory
// ---------------------------------------------------------------------------

/// Factory whose sessions all draw from one shared response queue.
#[derive(Clone)]
pub struct MockRendererFactory {
    responses: Arc<Mutex<Vec<Result<String, AppError>>>>,
    launch_error: Arc<Mutex<Option<AppError>>>,
    /// Number of sessions launched so far.
    pub launches: Arc<AtomicUsize>,
}

impl MockRendererFactory {
    pub fn new(responses: Vec<Result<String, AppError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            launch_error: Arc::new(Mutex::new(None)),
            launches: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_launch_error(error: AppError) -> Self {
        let factory = Self::new(Vec::new());
        *factory.launch_error.lock().unwrap() = Some(error);
        factory
    }

    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

impl RendererFactory for MockRendererFactory {
    type Renderer = MockRenderer;

    async fn launch(&self) -> Result<MockRenderer, AppError> {
        if let Some(e) = self.launch_error.lock().unwrap().take() {
            return Err(e);
        }
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(MockRenderer::from_shared(self.responses.clone()))
    }
}

// ---------------------------------------------------------------------------
// MockExtractor
// ---------------------------------------------------------------------------

/// Mock extractor with canned answers per expression.
///
/// Unknown expressions match nothing.
#[derive(Clone, Default)]
pub struct MockExtractor {
    matches: Arc<Mutex<HashMap<String, Result<Vec<String>, String>>>>,
}

impl MockExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_matches(self, expression: &str, matches: Vec<String>) -> Self {
        self.matches
            .lock()
            .unwrap()
            .insert(expression.to_string(), Ok(matches));
        self
    }

    pub fn with_error(self, expression: &str) -> Self {
        self.matches
            .lock()
            .unwrap()
            .insert(expression.to_string(), Err(format!("invalid expression {expression}")));
        self
    }
}

impl Extractor for MockExtractor {
    fn extract(&self, _page: &str, expression: &str) -> Result<Vec<String>, AppError> {
        match self.matches.lock().unwrap().get(expression) {
            Some(Ok(matches)) => Ok(matches.clone()),
            Some(Err(message)) => Err(AppError::ExtractionError(message.clone())),
            None => Ok(Vec::new()),
        }
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Mock worker reporter that records events.
#[derive(Default)]
pub struct MockReporter {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WorkerReporter for MockReporter {
    fn report(&self, event: WorkerEvent<'_>) {
        let label = match &event {
            WorkerEvent::Started { .. } => "Started",
            WorkerEvent::Polling => "Polling",
            WorkerEvent::JobClaimed { .. } => "JobClaimed",
            WorkerEvent::JobCompleted { .. } => "JobCompleted",
            WorkerEvent::JobFailed { .. } => "JobFailed",
            WorkerEvent::ShuttingDown { .. } => "ShuttingDown",
            WorkerEvent::Stopped { .. } => "Stopped",
        };
        self.events.lock().unwrap().push(label.to_string());
    }
}

// ---------------------------------------------------------------------------
// ManualClock
// ---------------------------------------------------------------------------

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Utc::now()),
        }
    }

    pub fn advance(&self, by: TimeDelta) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// Create a dummy JobDescriptor for testing.
pub fn make_test_descriptor() -> JobDescriptor {
    JobDescriptor {
        url: "https://example.com".to_string(),
        return_source: true,
        simplify_source: true,
        load_wait_time: 0.0,
        x_paths: Vec::new(),
        results_ttl: 500,
        prompt: None,
    }
}
