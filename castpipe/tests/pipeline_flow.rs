//! End-to-end pipeline tests over the in-memory backends.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use castpipe::database::repositories::MemorySessionStore;
use castpipe::domain::{ContentSource, GenerationOptions, SessionStatus, Stage};
use castpipe::pipeline::{
    builtin_registry, EngineConfig, HandlerRegistry, PipelineEngine, StageContext, StageHandler,
    StageOutput,
};
use castpipe::queue::{MemoryQueue, QueueTransport};
use castpipe::{Error, Result};

struct FailingHandler;

#[async_trait]
impl StageHandler for FailingHandler {
    fn stage(&self) -> Stage {
        Stage::Script
    }

    fn name(&self) -> &'static str {
        "failing-script"
    }

    async fn run(&self, _ctx: &StageContext) -> Result<StageOutput> {
        Err(Error::stage("script generation blew up"))
    }
}

fn build_engine(
    dir: &std::path::Path,
    handlers: HandlerRegistry,
) -> (Arc<PipelineEngine>, Arc<MemoryQueue>) {
    let store = Arc::new(MemorySessionStore::new());
    let queue = Arc::new(MemoryQueue::new());
    let engine = Arc::new(PipelineEngine::new(
        store,
        queue.clone(),
        handlers,
        EngineConfig {
            data_dir: dir.to_path_buf(),
            stage_timeout: Duration::from_secs(30),
            max_delivery_attempts: 5,
        },
    ));
    (engine, queue)
}

async fn write_source(dir: &std::path::Path) -> ContentSource {
    let path = dir.join("ownership.txt");
    tokio::fs::write(
        &path,
        "Ownership is Rust's most distinctive feature. Every value has an owner. \
         When the owner goes out of scope the value is dropped. Borrowing lets \
         code use values without taking ownership.",
    )
    .await
    .unwrap();
    ContentSource::file(path.display().to_string())
}

/// Claim, process, and ack one message. Returns the stage that was run.
async fn drive_one(engine: &PipelineEngine, queue: &MemoryQueue) -> Option<Stage> {
    let delivery = queue.receive().await.unwrap()?;
    let stage = delivery.message.stage;
    engine.handle(&delivery).await.unwrap();
    queue.ack(&delivery).await.unwrap();
    Some(stage)
}

#[tokio::test]
async fn end_to_end_follows_the_progress_table() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, queue) = build_engine(dir.path(), builtin_registry());

    let source = write_source(dir.path()).await;
    let session = engine
        .submit(vec![source], 0, GenerationOptions::default())
        .await
        .unwrap();
    assert_eq!(session.stage, Stage::Start);
    assert_eq!(session.progress(), 0);

    // (stage that runs, progress observed after it commits)
    let expected = [
        (Stage::Start, 30),
        (Stage::Extract, 40),
        (Stage::Combine, 60),
        (Stage::Script, 80),
        (Stage::Audio, 90),
        (Stage::Merge, 100),
        (Stage::Transcript, 100),
    ];

    for (expected_stage, expected_progress) in expected {
        let ran = drive_one(&engine, &queue).await.expect("message expected");
        assert_eq!(ran, expected_stage);

        let snapshot = engine.get(&session.id).await.unwrap();
        assert_eq!(snapshot.progress(), expected_progress);
        if expected_stage != Stage::Transcript {
            assert_eq!(snapshot.status(), SessionStatus::Processing);
        }
    }

    // Terminal: nothing further is enqueued.
    assert!(queue.receive().await.unwrap().is_none());

    let finished = engine.get(&session.id).await.unwrap();
    assert_eq!(finished.stage, Stage::Completed);
    assert_eq!(finished.status(), SessionStatus::Completed);
    assert_eq!(finished.progress(), 100);
    assert!(finished.error.is_none());

    let result = finished.result.expect("completed session has a result");
    assert!(!result.chapters.is_empty());
    assert_eq!(result.chapters[0].index, 1);
    assert_eq!(result.chapters[0].title, "ownership");
    assert!(result.total_duration_seconds > 0.0);

    // The merged audio exists and is non-empty.
    let audio_path = finished.audio_path.expect("audio path recorded");
    let audio = tokio::fs::metadata(&audio_path).await.unwrap();
    assert!(audio.len() > 0);
}

#[tokio::test]
async fn stages_advance_monotonically() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, queue) = build_engine(dir.path(), builtin_registry());

    let source = write_source(dir.path()).await;
    let session = engine
        .submit(vec![source], 0, GenerationOptions::default())
        .await
        .unwrap();

    let mut observed = vec![engine.get(&session.id).await.unwrap().stage];
    while drive_one(&engine, &queue).await.is_some() {
        observed.push(engine.get(&session.id).await.unwrap().stage);
    }

    for pair in observed.windows(2) {
        assert!(
            pair[0].order_index() <= pair[1].order_index(),
            "stage went backwards: {:?}",
            observed
        );
    }
    assert_eq!(*observed.last().unwrap(), Stage::Completed);
}

#[tokio::test]
async fn double_delivery_of_every_message_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, queue) = build_engine(dir.path(), builtin_registry());

    let source = write_source(dir.path()).await;
    let session = engine
        .submit(vec![source], 0, GenerationOptions::default())
        .await
        .unwrap();

    loop {
        let Some(delivery) = queue.receive().await.unwrap() else {
            break;
        };
        // At-least-once: the same message arrives twice; the second pass
        // must be a no-op.
        engine.handle(&delivery).await.unwrap();
        engine.handle(&delivery).await.unwrap();
        queue.ack(&delivery).await.unwrap();
    }

    let finished = engine.get(&session.id).await.unwrap();
    assert_eq!(finished.stage, Stage::Completed);
    assert_eq!(finished.result.unwrap().chapters.len(), 1);
}

#[tokio::test]
async fn script_failure_terminates_the_job() {
    let dir = tempfile::tempdir().unwrap();
    let mut handlers = builtin_registry();
    handlers.insert(Stage::Script, Arc::new(FailingHandler));
    let (engine, queue) = build_engine(dir.path(), handlers);

    let source = write_source(dir.path()).await;
    let session = engine
        .submit(vec![source], 0, GenerationOptions::default())
        .await
        .unwrap();

    let mut ran = Vec::new();
    while let Some(stage) = drive_one(&engine, &queue).await {
        ran.push(stage);
    }

    // The pipeline stopped at script: no audio/merge/transcript messages.
    assert_eq!(
        ran,
        vec![Stage::Start, Stage::Extract, Stage::Combine, Stage::Script]
    );

    let failed = engine.get(&session.id).await.unwrap();
    assert_eq!(failed.status(), SessionStatus::Failed);
    assert_eq!(failed.progress(), -1);
    assert!(failed
        .error
        .as_deref()
        .unwrap()
        .contains("script generation blew up"));
    assert!(failed.result.is_none());
}

#[tokio::test]
async fn deletion_cancels_cooperatively() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, queue) = build_engine(dir.path(), builtin_registry());

    let source = write_source(dir.path()).await;
    let session = engine
        .submit(vec![source], 0, GenerationOptions::default())
        .await
        .unwrap();

    // Run the first stage, then delete while the extract message is queued.
    drive_one(&engine, &queue).await.unwrap();
    engine.delete(&session.id).await.unwrap();

    // The in-flight message finds the session gone and is discarded.
    while drive_one(&engine, &queue).await.is_some() {}

    assert!(matches!(
        engine.get(&session.id).await,
        Err(Error::NotFound { .. })
    ));
}

#[tokio::test]
async fn handler_registry_is_injectable_per_stage() {
    struct RecordingHandler(Stage, Arc<std::sync::atomic::AtomicUsize>);

    #[async_trait]
    impl StageHandler for RecordingHandler {
        fn stage(&self) -> Stage {
            self.0
        }

        fn name(&self) -> &'static str {
            "recording"
        }

        async fn run(&self, _ctx: &StageContext) -> Result<StageOutput> {
            self.1.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(StageOutput::data(serde_json::json!({})))
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let invocations = Arc::new(std::sync::atomic::AtomicUsize::new(0));

    let mut handlers: HandlerRegistry = HashMap::new();
    let mut stage = Stage::Start;
    loop {
        handlers.insert(stage, Arc::new(RecordingHandler(stage, invocations.clone())));
        match stage.next() {
            Some(Stage::Completed) | None => break,
            Some(next) => stage = next,
        }
    }
    let (engine, queue) = build_engine(dir.path(), handlers);

    let session = engine
        .submit(
            vec![ContentSource::file("/ignored.txt")],
            0,
            GenerationOptions::default(),
        )
        .await
        .unwrap();

    while drive_one(&engine, &queue).await.is_some() {}

    // One invocation per work stage, exactly.
    assert_eq!(invocations.load(std::sync::atomic::Ordering::SeqCst), 7);
    assert_eq!(
        engine.get(&session.id).await.unwrap().stage,
        Stage::Completed
    );
}
