use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use castpipe::api::{create_router, serve};
use castpipe::config::{AppConfig, StorageBackend};
use castpipe::database::repositories::{
    MemorySessionStore, SessionStore, SqliteSessionStore,
};
use castpipe::database::{init_pool, run_migrations};
use castpipe::pipeline::{builtin_registry, PipelineEngine, WorkerPool};
use castpipe::queue::{MemoryQueue, QueueTransport, SqliteQueue};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables before anything reads them.
    dotenvy::dotenv().ok();

    let _log_guard = castpipe::logging::init(None);

    let config = AppConfig::from_env_or_default();
    tracing::info!("castpipe starting with {:?} backend", config.backend);

    let (store, queue): (Arc<dyn SessionStore>, Arc<dyn QueueTransport>) = match config.backend {
        StorageBackend::Sqlite => {
            let pool = init_pool(&config.database_url).await?;
            run_migrations(&pool).await?;
            (
                Arc::new(SqliteSessionStore::new(pool.clone())),
                Arc::new(SqliteQueue::with_visibility_timeout(
                    pool,
                    config.visibility_timeout(),
                )),
            )
        }
        StorageBackend::Memory => (
            Arc::new(MemorySessionStore::new()),
            Arc::new(MemoryQueue::with_visibility_timeout(
                config.visibility_timeout(),
            )),
        ),
    };

    let engine = Arc::new(PipelineEngine::new(
        store,
        queue.clone(),
        builtin_registry(),
        config.engine_config(),
    ));

    let worker_pool = WorkerPool::new(config.worker_pool_config());
    worker_pool.start(engine.clone(), queue);

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown signal received");
                shutdown.cancel();
            }
        });
    }

    let router = create_router(castpipe::api::AppState::new(engine));
    serve(&config.server, router, shutdown.clone()).await?;

    worker_pool.stop().await;
    tracing::info!("castpipe stopped");
    Ok(())
}
