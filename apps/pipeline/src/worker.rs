//! Redis-backed work queue feeding `Pipeline::process`.
//!
//! Producers `LPUSH` application ids onto `pipeline:queue`; each worker task `BRPOP`s one id at a
//! time on its own connection, so a blocked pop never stalls another worker.

use std::sync::Arc;
use std::time::Duration;

use redis::aio::MultiplexedConnection;
use redis::Client as RedisClient;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::pipeline::Pipeline;

pub const QUEUE_KEY: &str = "pipeline:queue";
const PROCESSING_PREFIX: &str = "pipeline:processing:";
const PROCESSING_TTL_SECS: u64 = 15 * 60;
/// Seconds a `BRPOP` waits before looping; keeps idle connections from looking dead.
const POP_TIMEOUT_SECS: u64 = 5;
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

pub fn processing_key(application_id: Uuid) -> String {
    format!("{PROCESSING_PREFIX}{application_id}")
}

/// Parses a popped queue entry. Garbage entries are dropped with a warning by the caller.
pub fn parse_entry(raw: &str) -> Option<Uuid> {
    Uuid::parse_str(raw.trim()).ok()
}

#[derive(Clone)]
pub struct JobQueue {
    client: RedisClient,
}

impl JobQueue {
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }

    pub async fn enqueue(&self, application_id: Uuid) -> Result<(), redis::RedisError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("LPUSH")
            .arg(QUEUE_KEY)
            .arg(application_id.to_string())
            .query_async::<_, ()>(&mut conn)
            .await?;
        info!("Enqueued application {application_id}");
        Ok(())
    }

    /// Starts `concurrency` worker tasks. They run until the process exits.
    pub fn spawn_workers(
        &self,
        concurrency: usize,
        pipeline: Arc<Pipeline>,
    ) -> Vec<JoinHandle<()>> {
        (0..concurrency.max(1))
            .map(|worker| {
                let client = self.client.clone();
                let pipeline = pipeline.clone();
                tokio::spawn(async move { run_worker(worker, client, pipeline).await })
            })
            .collect()
    }
}

async fn run_worker(worker: usize, client: RedisClient, pipeline: Arc<Pipeline>) {
    info!("Worker {worker} started");
    loop {
        let mut conn = match client.get_multiplexed_async_connection().await {
            Ok(conn) => conn,
            Err(e) => {
                error!("Worker {worker} could not connect to Redis: {e}");
                tokio::time::sleep(RECONNECT_DELAY).await;
                continue;
            }
        };

        if let Err(e) = drain(worker, &mut conn, &pipeline).await {
            error!("Worker {worker} lost its Redis connection: {e}");
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    }
}

async fn drain(
    worker: usize,
    conn: &mut MultiplexedConnection,
    pipeline: &Pipeline,
) -> Result<(), redis::RedisError> {
    loop {
        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(QUEUE_KEY)
            .arg(POP_TIMEOUT_SECS)
            .query_async(conn)
            .await?;

        let Some((_, raw)) = popped else {
            continue;
        };
        let Some(application_id) = parse_entry(&raw) else {
            warn!("Worker {worker} dropped malformed queue entry '{raw}'");
            continue;
        };

        let marker = processing_key(application_id);
        redis::cmd("SET")
            .arg(&marker)
            .arg(worker)
            .arg("EX")
            .arg(PROCESSING_TTL_SECS)
            .query_async::<_, ()>(conn)
            .await?;

        match pipeline.process(application_id).await {
            Ok(summary) => info!(
                "Worker {worker} finished {application_id}: status={}, ran={:?}, error={:?}",
                summary.status, summary.stages_run, summary.error
            ),
            Err(e) => error!("Worker {worker} failed to process {application_id}: {e}"),
        }

        redis::cmd("DEL")
            .arg(&marker)
            .query_async::<_, ()>(conn)
            .await?;
    }
}
