use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "crawlq API",
        version = "0.1.0",
        description = "Queue URLs for headless crawling and collect page sources and XPath matches."
    ),
    paths(
        crate::routes::crawl,
        crate::routes::queue_size,
        crate::routes::job_status,
        crate::routes::job_results,
        crate::routes::health,
    ),
    components(schemas(
        crate::dto::CrawlResponse,
        crate::dto::QueueSizeResponse,
        crate::dto::JobStatusResponse,
        crate::dto::JobResultEntry,
        crate::dto::OutcomeView,
        crate::dto::DescriptorView,
        crate::dto::HealthResponse,
        crate::dto::ErrorResponse,
    )),
    tags(
        (name = "jobs", description = "Crawl job submission and results"),
        (name = "system", description = "Health and system status"),
    )
)]
pub struct ApiDoc;
