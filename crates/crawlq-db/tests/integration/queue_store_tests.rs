use std::collections::HashSet;
use std::time::Duration;

use chrono::Utc;
use crawlq_core::error::AppError;
use crawlq_core::job::{JobOutcome, JobState, PromptConfig};
use crawlq_core::queue_store::{OutcomeLookup, QueueStore};
use crawlq_core::testutil::make_test_descriptor;
use uuid::Uuid;

use crate::integration::common::setup_store;

#[tokio::test]
#[ignore = "requires Docker"]
async fn enqueue_and_dequeue_in_order() {
    let (store, _db, _container) = setup_store().await;

    let mut first = make_test_descriptor();
    first.url = "https://first.example".into();
    let mut second = make_test_descriptor();
    second.url = "https://second.example".into();

    let a = store.enqueue(first.clone()).await.unwrap();
    let b = store.enqueue(second).await.unwrap();
    assert_ne!(a, b);
    assert_eq!(store.queue_depth().await.unwrap(), 2);

    let (claimed, descriptor) = store.dequeue("worker-1").await.unwrap().unwrap();
    assert_eq!(claimed, a);
    assert_eq!(descriptor, first);
    assert_eq!(store.status(a).await.unwrap(), Some(JobState::Running));
    assert_eq!(store.queue_depth().await.unwrap(), 1);

    let (claimed, _) = store.dequeue("worker-2").await.unwrap().unwrap();
    assert_eq!(claimed, b);
    assert!(store.dequeue("worker-3").await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn position_counts_queued_jobs_ahead() {
    let (store, _db, _container) = setup_store().await;

    let a = store.enqueue(make_test_descriptor()).await.unwrap();
    let b = store.enqueue(make_test_descriptor()).await.unwrap();
    let c = store.enqueue(make_test_descriptor()).await.unwrap();

    assert_eq!(store.position(a).await.unwrap(), Some(0));
    assert_eq!(store.position(c).await.unwrap(), Some(2));

    store.dequeue("worker-1").await.unwrap();
    assert_eq!(store.position(a).await.unwrap(), None);
    assert_eq!(store.position(b).await.unwrap(), Some(0));
    assert_eq!(store.position(Uuid::new_v4()).await.unwrap(), None);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn concurrent_claims_deliver_each_job_once() {
    let (store, _db, _container) = setup_store().await;

    for _ in 0..40 {
        store.enqueue(make_test_descriptor()).await.unwrap();
    }

    let mut handles = Vec::new();
    for w in 0..4 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let mut claimed = Vec::new();
            while let Some((id, _)) = store.dequeue(&format!("worker-{w}")).await.unwrap() {
                claimed.push(id);
            }
            claimed
        }));
    }

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.await.unwrap());
    }
    let unique: HashSet<_> = all.iter().collect();
    assert_eq!(all.len(), 40);
    assert_eq!(unique.len(), 40);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn outcome_is_written_once_and_read_back() {
    let (store, _db, _container) = setup_store().await;

    let id = store.enqueue(make_test_descriptor()).await.unwrap();
    assert_eq!(
        store.read_outcome(id).await.unwrap(),
        OutcomeLookup::NotFinished(JobState::Queued)
    );

    let (_, descriptor) = store.dequeue("worker-1").await.unwrap().unwrap();
    let outcome = JobOutcome::success(
        descriptor.clone(),
        Utc::now(),
        Some("<html></html>".into()),
        Some(vec![vec!["Example Domain".into()]]),
    );
    store.write_outcome(id, &outcome).await.unwrap();

    assert_eq!(store.status(id).await.unwrap(), Some(JobState::Finished));
    assert_eq!(
        store.read_outcome(id).await.unwrap(),
        OutcomeLookup::Found(outcome)
    );

    let again = JobOutcome::failure(descriptor, Utc::now(), "late");
    let err = store.write_outcome(id, &again).await.unwrap_err();
    assert!(matches!(err, AppError::OutcomeAlreadyWritten(_)));

    let err = store.write_outcome(Uuid::new_v4(), &again).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn failure_outcome_marks_job_failed() {
    let (store, _db, _container) = setup_store().await;

    let id = store.enqueue(make_test_descriptor()).await.unwrap();
    let (_, descriptor) = store.dequeue("worker-1").await.unwrap().unwrap();
    let outcome = JobOutcome::failure(descriptor, Utc::now(), "Page load timed out after 30 seconds");
    store.write_outcome(id, &outcome).await.unwrap();

    assert_eq!(store.status(id).await.unwrap(), Some(JobState::Failed));
    match store.read_outcome(id).await.unwrap() {
        OutcomeLookup::Found(found) => {
            assert_eq!(found.failure_reason(), Some("Page load timed out after 30 seconds"));
        }
        other => panic!("expected Found, got {other:?}"),
    }
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn expired_outcomes_disappear_and_are_purged() {
    let (store, _db, _container) = setup_store().await;

    let mut descriptor = make_test_descriptor();
    descriptor.results_ttl = 1;
    let short = store.enqueue(descriptor).await.unwrap();
    let long = store.enqueue(make_test_descriptor()).await.unwrap();

    for _ in 0..2 {
        let (id, d) = store.dequeue("worker-1").await.unwrap().unwrap();
        store
            .write_outcome(id, &JobOutcome::success(d, Utc::now(), None, None))
            .await
            .unwrap();
    }

    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert_eq!(store.status(short).await.unwrap(), None);
    assert_eq!(store.read_outcome(short).await.unwrap(), OutcomeLookup::NotFound);
    assert_eq!(store.status(long).await.unwrap(), Some(JobState::Finished));

    assert_eq!(store.purge_expired().await.unwrap(), 1);
    assert_eq!(store.purge_expired().await.unwrap(), 0);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn release_returns_jobs_to_their_place() {
    let (store, _db, _container) = setup_store().await;

    let a = store.enqueue(make_test_descriptor()).await.unwrap();
    let b = store.enqueue(make_test_descriptor()).await.unwrap();
    store.dequeue("worker-1").await.unwrap();

    assert_eq!(store.release_worker_jobs("worker-2").await.unwrap(), 0);
    assert_eq!(store.release_worker_jobs("worker-1").await.unwrap(), 1);

    assert_eq!(store.status(a).await.unwrap(), Some(JobState::Queued));
    assert_eq!(store.position(a).await.unwrap(), Some(0));
    assert_eq!(store.position(b).await.unwrap(), Some(1));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn health_check_succeeds() {
    let (store, _db, _container) = setup_store().await;
    store.health_check().await.unwrap();
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn prompt_key_is_never_persisted() {
    let (store, db, _container) = setup_store().await;

    let mut descriptor = make_test_descriptor();
    descriptor.prompt = Some(PromptConfig {
        prompt: "Summarise".into(),
        api_key: "sk-secret".into(),
    });
    let id = store.enqueue(descriptor).await.unwrap();
    let (_, claimed) = store.dequeue("worker-1").await.unwrap().unwrap();
    let outcome = JobOutcome::success(claimed, Utc::now(), None, None);
    store.write_outcome(id, &outcome).await.unwrap();

    let (stored_descriptor, stored_outcome): (String, String) = sqlx::query_as(
        "SELECT descriptor::text, outcome::text FROM crawl_jobs WHERE id = $1",
    )
    .bind(id)
    .fetch_one(db.pool())
    .await
    .unwrap();

    assert!(stored_descriptor.contains("Summarise"));
    assert!(!stored_descriptor.contains("sk-secret"));
    assert!(!stored_outcome.contains("sk-secret"));
}
