pub mod clock;
pub mod config;
pub mod error;
pub mod job;
pub mod memory;
pub mod pool;
pub mod queue_store;
pub mod status;
pub mod submission;
pub mod traits;
pub mod worker;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use clock::{Clock, SystemClock};
pub use config::CrawlerConfig;
pub use error::AppError;
pub use job::{
    CrawlRequest, JobDescriptor, JobId, JobOutcome, JobState, OutcomeResult, PromptConfig,
    WorkerConfig,
};
pub use memory::InMemoryQueueStore;
pub use pool::WorkerPool;
pub use queue_store::{OutcomeLookup, QueueStore};
pub use status::{JobResult, JobStatusReport, StatusService};
pub use submission::{SubmissionService, SubmitReceipt};
pub use traits::{Extractor, Renderer, RendererFactory};
pub use worker::{TracingWorkerReporter, WorkerEvent, WorkerReporter, WorkerService};
