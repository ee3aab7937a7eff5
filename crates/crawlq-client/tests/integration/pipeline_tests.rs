use std::time::Duration;

use axum::Router;
use axum::response::Html;
use axum::routing::get;
use crawlq_client::{HttpRendererFactory, ReaderView, XPathExtractor};
use crawlq_core::traits::Extractor;
use crawlq_core::{
    CrawlRequest, CrawlerConfig, InMemoryQueueStore, JobResult, StatusService, SubmissionService,
    WorkerPool,
};

const PAGE: &str = r#"<html>
<head><title>Example &amp; Domain</title><style>p { color: red }</style></head>
<body>
  <nav><a href="/home">Home</a></nav>
  <main><h1>Example</h1><p>This domain is for use in examples.</p></main>
  <footer>footer</footer>
</body>
</html>"#;

async fn serve() -> String {
    let app = Router::new().route("/", get(|| async { Html(PAGE) }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{addr}/")
}

#[test]
fn reader_view_keeps_title_for_xpath() {
    let simplified = ReaderView::new().simplify(PAGE);
    let extractor = XPathExtractor::new();

    assert_eq!(
        extractor.extract(&simplified, "//title/text()").unwrap(),
        vec!["Example & Domain"]
    );
    assert_eq!(
        extractor.extract(&simplified, "//h1/text()").unwrap(),
        vec!["Example"]
    );
    assert!(extractor.extract(&simplified, "//nav").unwrap().is_empty());
}

#[tokio::test]
async fn simplified_crawl_without_source_returns_title_matches() {
    let url = serve().await;
    let store = InMemoryQueueStore::new();
    let submission = SubmissionService::new(store.clone(), 500);
    let status = StatusService::new(store.clone());

    let request = CrawlRequest::new([url])
        .with_return_source(false)
        .with_simplify_source(true)
        .with_x_paths(["//title/text()", "//footer/text()"]);
    let id = submission.submit(request).await.unwrap().job_ids[0];

    let config = CrawlerConfig {
        workers: 1,
        poll_interval: Duration::from_millis(5),
        max_page_load_timeout: Duration::from_secs(10),
        ..CrawlerConfig::default()
    };
    let renderer = HttpRendererFactory::with_timeout(config.max_page_load_timeout)
        .unwrap()
        .allow_private_urls();
    let pool = WorkerPool::spawn(store, renderer, XPathExtractor::new(), &config);

    let mut result = None;
    for _ in 0..500 {
        let (_, entry) = status.get_results(&[id]).await.unwrap().remove(0);
        if !matches!(entry, JobResult::NotReady { .. }) {
            result = Some(entry);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    pool.shutdown().await.unwrap();

    match result {
        Some(JobResult::Ready(outcome)) => match outcome.result {
            crawlq_core::OutcomeResult::Success {
                page_source,
                x_path_results,
            } => {
                assert_eq!(page_source, None);
                assert_eq!(
                    x_path_results,
                    Some(vec![vec!["Example & Domain".to_string()], Vec::new()])
                );
            }
            other => panic!("expected success, got {other:?}"),
        },
        other => panic!("expected a finished job, got {other:?}"),
    }
}
