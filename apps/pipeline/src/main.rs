mod config;
mod db;
mod decision;
mod errors;
mod llm_client;
mod matching;
mod models;
mod pipeline;
mod resilience;
mod routes;
mod stages;
mod state;
mod store;
mod submission;
mod worker;

#[cfg(test)]
mod testing;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::create_pool;
use crate::llm_client::LlmClient;
use crate::pipeline::{Pipeline, PipelineDefinition};
use crate::resilience::{ChannelLimiters, RetryExecutor};
use crate::routes::build_router;
use crate::stages::{build_agents, StageDeps};
use crate::state::AppState;
use crate::store::PgApplicationStore;
use crate::submission::WebhookSubmissionChannel;
use crate::worker::JobQueue;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars or bad thresholds)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting pipeline service v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url, config.worker_concurrency).await?;
    let store = Arc::new(PgApplicationStore::new(db));

    // Initialize Redis
    let redis = redis::Client::open(config.redis_url.clone())?;
    let queue = JobQueue::new(redis);
    info!("Redis client initialized");

    // Limiters are process-wide: every worker shares one per channel
    let limiters = ChannelLimiters::from_settings(&config.pipeline.rate_limits);

    let llm = LlmClient::new(
        config.anthropic_api_key.clone(),
        limiters.llm.clone(),
        RetryExecutor::new(config.pipeline.retry.clone()),
    )?;
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    let submission = WebhookSubmissionChannel::new(config.submission_endpoint.clone())?;
    info!("Submission channel: {}", config.submission_endpoint);

    if config.candidate_profile.is_empty() {
        warn!("CANDIDATE_PROFILE_PATH not set; documents will be generated without a profile");
    }

    let definition = PipelineDefinition::standard()?;
    let deps = StageDeps {
        llm: Arc::new(llm),
        store: store.clone(),
        submission: Arc::new(submission),
        limiters,
        candidate_profile: Arc::from(config.candidate_profile.as_str()),
        config: config.pipeline.clone(),
    };
    let agents = build_agents(&definition, &deps);
    let pipeline = Arc::new(Pipeline::new(store, definition, agents)?);

    let workers = queue.spawn_workers(config.worker_concurrency, pipeline.clone());
    info!("Started {} queue workers", workers.len());

    let state = AppState { pipeline, queue };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
