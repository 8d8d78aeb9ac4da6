use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use common::storage::BlobStore;
use common::storage::filesystem::FilesystemBlobStore;
use mq::{BroccoliJobQueue, JobQueue, MqConfig, init_mq};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use worker::config::{LogConfig, StorageBackend, StorageConfig};
use worker::database::init_db;
use worker::source::CompendiumClient;
use worker::{
    PoolSettings, ReportBuilder, ReportStore, SeaOrmReportStore, StaleReportSweeper,
    WorkerAppConfig, WorkerError, WorkerPool,
};

fn init_tracing(log: &LogConfig) {
    if log.json {
        tracing_subscriber::fmt().with_target(false).json().init();
    } else {
        tracing_subscriber::fmt().with_target(false).init();
    }
}

async fn init_blob_store(storage: &StorageConfig) -> anyhow::Result<Arc<dyn BlobStore>> {
    match storage.backend {
        StorageBackend::Filesystem => {
            let store = FilesystemBlobStore::new(storage.local_path.clone(), storage.max_size)
                .await
                .context("Failed to initialize filesystem storage")?;
            info!(path = %storage.local_path.display(), "Using filesystem storage");
            Ok(Arc::new(store))
        }
        #[cfg(feature = "object-storage")]
        StorageBackend::S3 => {
            use common::storage::s3::{S3BlobStore, S3Settings};

            let store = S3BlobStore::new(&S3Settings {
                bucket: storage.bucket.clone(),
                region: storage.region.clone(),
                endpoint: storage.endpoint.clone(),
                access_key: storage.access_key.clone(),
                secret_key: storage.secret_key.clone(),
                path_style: storage.path_style,
            })
            .context("Failed to initialize S3 storage")?;
            info!(bucket = %storage.bucket, region = %storage.region, "Using S3 storage");
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "object-storage"))]
        StorageBackend::S3 => anyhow::bail!("S3 storage requires the object-storage feature"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = WorkerAppConfig::load().context("Failed to load config")?;
    init_tracing(&config.log);
    config.worker.validate()?;
    info!(
        worker_id = %config.worker.id,
        max_concurrency = config.worker.max_concurrency,
        redelivery = ?config.worker.redelivery,
        "Worker starting"
    );

    let db = init_db(&config.database.url)
        .await
        .context("Failed to connect to database")?;
    let store: Arc<dyn ReportStore> = Arc::new(SeaOrmReportStore::new(db));

    let broker = init_mq(MqConfig {
        url: config.mq.url.clone(),
        pool_size: config.mq.pool_size,
    })
    .await
    .context("Failed to initialize MQ")?;
    let broccoli = BroccoliJobQueue::new(broker, config.mq.queue_name.clone());
    info!(topic = %broccoli.topic(), "MQ connected");
    let queue: Arc<dyn JobQueue> = Arc::new(broccoli);

    let blobs = init_blob_store(&config.storage).await?;
    let source = CompendiumClient::new(
        &config.source.base_url,
        Duration::from_secs(config.source.timeout_secs),
    )
    .context("Failed to build HTTP client")?;

    let builder = ReportBuilder::new(store.clone(), Arc::new(source), blobs)
        .with_redelivery(config.worker.redelivery);
    let pool = WorkerPool::new(
        queue,
        Arc::new(builder),
        PoolSettings::from_config(&config.worker, &config.mq),
    )?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Shutdown signal received");
                    cancel.cancel();
                }
                Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
            }
        }
    });

    let sweeper = tokio::spawn(
        StaleReportSweeper::new(store, config.worker.stale_after())
            .run(config.worker.sweep_interval(), cancel.clone()),
    );

    match pool.run(cancel.clone()).await {
        Ok(()) | Err(WorkerError::Cancelled) => info!("Worker stopped"),
        Err(e) => error!(error = %e, "Worker stopped unexpectedly"),
    }
    cancel.cancel();
    if let Err(e) = sweeper.await {
        error!(error = %e, "Sweeper task panicked");
    }

    Ok(())
}
