//! Durable backend tests: CAS semantics, exclusive claims, redelivery.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinSet;

use castpipe::database::repositories::{SessionStore, SqliteSessionStore};
use castpipe::database::{init_pool_with_size, run_migrations, DbPool};
use castpipe::domain::{ContentSource, GenerationOptions, Session, SessionPatch, Stage};
use castpipe::pipeline::{builtin_registry, EngineConfig, PipelineEngine};
use castpipe::queue::{QueueTransport, SqliteQueue, StageMessage};
use castpipe::Error;

async fn test_pool(dir: &tempfile::TempDir) -> DbPool {
    let url = format!(
        "sqlite:{}?mode=rwc",
        dir.path().join("castpipe.db").display()
    );
    let pool = init_pool_with_size(&url, 8).await.unwrap();
    run_migrations(&pool).await.unwrap();
    pool
}

fn new_session() -> Session {
    Session::new(
        vec![ContentSource::file("/data/a.txt")],
        0,
        GenerationOptions::default(),
    )
    .unwrap()
}

#[tokio::test]
async fn sqlite_store_roundtrip_and_cas() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteSessionStore::new(test_pool(&dir).await);

    let session = new_session();
    store.create(&session).await.unwrap();

    let loaded = store.get(&session.id).await.unwrap();
    assert_eq!(loaded.stage, Stage::Start);
    assert_eq!(loaded.inputs, session.inputs);

    // Winning CAS applies the patch.
    let advanced = store
        .compare_and_set_stage(
            &session.id,
            Stage::Start,
            Stage::Extract,
            SessionPatch {
                stage_output: Some(serde_json::json!({"sources": 1})),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(advanced);

    // Stale writer changes nothing.
    let stale = store
        .compare_and_set_stage(
            &session.id,
            Stage::Start,
            Stage::Extract,
            SessionPatch::default(),
        )
        .await
        .unwrap();
    assert!(!stale);

    let loaded = store.get(&session.id).await.unwrap();
    assert_eq!(loaded.stage, Stage::Extract);
    assert_eq!(loaded.stage_output, Some(serde_json::json!({"sources": 1})));

    // Deleted rows are reported as NotFound, not as a lost race.
    store.delete(&session.id).await.unwrap();
    let gone = store
        .compare_and_set_stage(
            &session.id,
            Stage::Extract,
            Stage::Combine,
            SessionPatch::default(),
        )
        .await;
    assert!(matches!(gone, Err(Error::NotFound { .. })));
}

#[tokio::test]
async fn sqlite_queue_claims_are_exclusive() {
    let dir = tempfile::tempdir().unwrap();
    let queue = SqliteQueue::new(test_pool(&dir).await);

    queue
        .send(StageMessage::new("session-a", Stage::Start))
        .await
        .unwrap();
    queue
        .send(StageMessage::new("session-b", Stage::Start))
        .await
        .unwrap();

    let first = queue.receive().await.unwrap().unwrap();
    let second = queue.receive().await.unwrap().unwrap();
    assert_ne!(first.message.session_id, second.message.session_id);
    assert!(queue.receive().await.unwrap().is_none());

    queue.ack(&first).await.unwrap();
    queue.ack(&second).await.unwrap();
    assert_eq!(queue.depth().await.unwrap(), 0);
}

#[tokio::test]
async fn sqlite_queue_redelivers_after_visibility_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let queue =
        SqliteQueue::with_visibility_timeout(test_pool(&dir).await, Duration::from_millis(50));

    queue
        .send(StageMessage::new("session-a", Stage::Extract))
        .await
        .unwrap();

    let first = queue.receive().await.unwrap().unwrap();
    assert_eq!(first.attempt, 1);
    assert!(queue.receive().await.unwrap().is_none());

    tokio::time::sleep(Duration::from_millis(120)).await;

    let second = queue.receive().await.unwrap().unwrap();
    assert_eq!(second.message, first.message);
    assert_eq!(second.attempt, 2);

    // The expired claim's receipt no longer deletes the row.
    queue.ack(&first).await.unwrap();
    assert_eq!(queue.depth().await.unwrap(), 1);
    queue.ack(&second).await.unwrap();
    assert_eq!(queue.depth().await.unwrap(), 0);
}

#[tokio::test]
async fn concurrent_workers_never_share_a_claim() {
    const MESSAGES: usize = 60;
    const WORKERS: usize = 6;

    let dir = tempfile::tempdir().unwrap();
    let pool = test_pool(&dir).await;
    let queue = Arc::new(SqliteQueue::new(pool));

    for i in 0..MESSAGES {
        queue
            .send(StageMessage::new(format!("session-{i}"), Stage::Start))
            .await
            .unwrap();
    }

    let claimed = Arc::new(Mutex::new(HashSet::<String>::new()));
    let mut tasks = JoinSet::new();
    for _ in 0..WORKERS {
        let queue = queue.clone();
        let claimed = claimed.clone();
        tasks.spawn(async move {
            loop {
                match queue.receive().await.unwrap() {
                    Some(delivery) => {
                        {
                            let mut seen = claimed.lock().unwrap();
                            assert!(
                                seen.insert(delivery.message.session_id.clone()),
                                "double-claimed {}",
                                delivery.message.session_id
                            );
                        }
                        queue.ack(&delivery).await.unwrap();
                    }
                    None => break,
                }
            }
        });
    }
    while tasks.join_next().await.is_some() {}

    assert_eq!(claimed.lock().unwrap().len(), MESSAGES);
    assert_eq!(queue.depth().await.unwrap(), 0);
}

#[tokio::test]
async fn end_to_end_over_the_durable_backend() {
    let dir = tempfile::tempdir().unwrap();
    let pool = test_pool(&dir).await;

    let store = Arc::new(SqliteSessionStore::new(pool.clone()));
    let queue = Arc::new(SqliteQueue::new(pool));
    let engine = Arc::new(PipelineEngine::new(
        store,
        queue.clone(),
        builtin_registry(),
        EngineConfig {
            data_dir: dir.path().to_path_buf(),
            stage_timeout: Duration::from_secs(30),
            max_delivery_attempts: 5,
        },
    ));

    let source_path = dir.path().join("notes.txt");
    tokio::fs::write(&source_path, "Sessions survive restarts. Queues redeliver.")
        .await
        .unwrap();

    let session = engine
        .submit(
            vec![ContentSource::file(source_path.display().to_string())],
            0,
            GenerationOptions::default(),
        )
        .await
        .unwrap();

    loop {
        let Some(delivery) = queue.receive().await.unwrap() else {
            break;
        };
        engine.handle(&delivery).await.unwrap();
        queue.ack(&delivery).await.unwrap();
    }

    let finished = engine.get(&session.id).await.unwrap();
    assert_eq!(finished.stage, Stage::Completed);
    assert_eq!(finished.progress(), 100);
    let result = finished.result.unwrap();
    assert_eq!(result.chapters.len(), 1);
    assert!(result.total_duration_seconds > 0.0);
}
