use std::time::Duration;

use axum::http::StatusCode;
use chrono::Utc;
use crawlq_core::job::JobOutcome;
use crawlq_core::queue_store::QueueStore;
use crawlq_core::testutil::{MockExtractor, MockRendererFactory};
use crawlq_core::{CrawlerConfig, WorkerPool};
use uuid::Uuid;

use crate::integration::common::{get, post, setup_test_app};

#[tokio::test]
async fn health_returns_200() {
    let app = setup_test_app();

    let (status, json) = get(&app.router, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["store"], "ok");
    assert_eq!(json["backend"], "memory");
}

#[tokio::test]
async fn crawl_returns_one_id_per_url() {
    let app = setup_test_app();

    let (status, json) = post(
        &app.router,
        "/crawl?urls=https://a.example&urls=https%3A%2F%2Fb.example%2Fpath",
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    let ids = json["jobIDs"].as_array().unwrap();
    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1]);
    assert_eq!(json["currentQueueSize"], 2);

    let (_, descriptor) = app.store.dequeue("test").await.unwrap().unwrap();
    assert_eq!(descriptor.url, "https://a.example");
    assert!(descriptor.return_source);
    assert!(descriptor.simplify_source);
    assert_eq!(descriptor.results_ttl, 500);
}

#[tokio::test]
async fn prompt_without_key_is_rejected_and_nothing_queued() {
    let app = setup_test_app();

    let (status, json) = post(
        &app.router,
        "/crawl?urls=https://a.example&chatgpt_prompt=summarise",
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "validation_error");
    assert!(
        json["message"]
            .as_str()
            .unwrap()
            .contains("chatgpt_prompt was provided but openai_key was not")
    );

    let (_, json) = get(&app.router, "/queueSize").await;
    assert_eq!(json["currentQueueSize"], 0);
}

#[tokio::test]
async fn crawl_rejects_missing_and_invalid_input() {
    let app = setup_test_app();

    for uri in [
        "/crawl",
        "/crawl?urls=not-a-url",
        "/crawl?urls=https://a.example&load_wait_time=-1",
        "/crawl?urls=https://a.example&load_wait_time=1e9",
        "/crawl?urls=https://a.example&return_source=perhaps",
    ] {
        let (status, json) = post(&app.router, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(json["error"], "validation_error", "{uri}");
    }
}

#[tokio::test]
async fn queue_size_counts_waiting_jobs() {
    let app = setup_test_app();

    post(&app.router, "/crawl?urls=https://a.example&urls=https://b.example&urls=https://c.example").await;
    app.store.dequeue("test").await.unwrap();

    let (status, json) = get(&app.router, "/queueSize").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["currentQueueSize"], 2);
}

#[tokio::test]
async fn job_status_reports_state_and_position() {
    let app = setup_test_app();
    let (_, json) = post(&app.router, "/crawl?urls=https://a.example&urls=https://b.example").await;
    let first = json["jobIDs"][0].as_str().unwrap().to_string();
    let second = json["jobIDs"][1].as_str().unwrap().to_string();

    let (status, json) = get(&app.router, &format!("/jobStatus?jobID={second}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "queued");
    assert_eq!(json["position"], 1);

    app.store.dequeue("test").await.unwrap();
    let (_, json) = get(&app.router, &format!("/jobStatus?jobID={first}")).await;
    assert_eq!(json["status"], "running");
    assert!(json["position"].is_null());
}

#[tokio::test]
async fn job_status_unknown_malformed_and_missing() {
    let app = setup_test_app();

    let (status, json) = get(&app.router, &format!("/jobStatus?jobID={}", Uuid::new_v4())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "not_found");

    let (status, _) = get(&app.router, "/jobStatus?jobID=definitely-not-a-uuid").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get(&app.router, "/jobStatus").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn job_results_returns_independent_entries() {
    let app = setup_test_app();
    let (_, json) = post(
        &app.router,
        "/crawl?urls=https://a.example&urls=https://b.example&urls=https://c.example&chatgpt_prompt=p&openai_key=sk-secret",
    )
    .await;
    let ids: Vec<String> = json["jobIDs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();

    let (id, descriptor) = app.store.dequeue("test").await.unwrap().unwrap();
    let ok = JobOutcome::success(descriptor, Utc::now(), Some("<html></html>".into()), None);
    app.store.write_outcome(id, &ok).await.unwrap();

    let (id, descriptor) = app.store.dequeue("test").await.unwrap().unwrap();
    let failed = JobOutcome::failure(descriptor, Utc::now(), "Page load timed out after 30 seconds");
    app.store.write_outcome(id, &failed).await.unwrap();

    let unknown = Uuid::new_v4().to_string();
    let uri = format!(
        "/jobResults?jobIDs={}&jobIDs={}&jobIDs={}&jobIDs={unknown}&jobIDs=garbage",
        ids[0], ids[1], ids[2]
    );
    let (status, json) = get(&app.router, &uri).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_object().unwrap().len(), 5);

    let finished = &json[&ids[0]];
    assert_eq!(finished["status"], "finished");
    assert_eq!(finished["result"]["page_source"], "<html></html>");
    assert_eq!(finished["result"]["config"]["url"], "https://a.example");
    assert_eq!(finished["result"]["config"]["chatgpt_prompt"], "p");
    assert!(!json.to_string().contains("sk-secret"));

    let failed = &json[&ids[1]];
    assert_eq!(failed["status"], "failed");
    assert_eq!(failed["error"], "Page load timed out after 30 seconds");

    let waiting = &json[&ids[2]];
    assert_eq!(waiting["status"], "not_ready");
    assert_eq!(waiting["state"], "queued");
    assert_eq!(waiting["position"], 0);

    assert_eq!(json[&unknown]["status"], "not_found");
    assert_eq!(json["garbage"]["status"], "not_found");
}

#[tokio::test]
async fn job_results_requires_ids() {
    let app = setup_test_app();
    let (status, _) = get(&app.router, "/jobResults").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn submitted_job_is_processed_by_worker_pool() {
    let app = setup_test_app();
    let (_, json) = post(
        &app.router,
        "/crawl?urls=https://example.com&return_source=false&x_paths=%2F%2Ftitle%2Ftext()",
    )
    .await;
    let id = json["jobIDs"][0].as_str().unwrap().to_string();

    let config = CrawlerConfig {
        workers: 1,
        poll_interval: Duration::from_millis(5),
        ..CrawlerConfig::default()
    };
    let pool = WorkerPool::spawn(
        app.store.clone(),
        MockRendererFactory::new(Vec::new()),
        MockExtractor::new().with_matches("//title/text()", vec!["Example Domain".into()]),
        &config,
    );

    let mut status = String::new();
    for _ in 0..200 {
        let (_, json) = get(&app.router, &format!("/jobStatus?jobID={id}")).await;
        status = json["status"].as_str().unwrap_or_default().to_string();
        if status == "finished" || status == "failed" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    pool.shutdown().await.unwrap();
    assert_eq!(status, "finished");

    let (_, json) = get(&app.router, &format!("/jobResults?jobIDs={id}")).await;
    let result = &json[&id]["result"];
    assert!(result.get("page_source").is_none());
    assert_eq!(result["x_path_results"], serde_json::json!([["Example Domain"]]));
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = setup_test_app();
    let (status, json) = get(&app.router, "/api-docs/openapi.json").await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["paths"]["/crawl"].is_object());
}
