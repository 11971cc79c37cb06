use std::sync::Arc;

use anyhow::Context as _;
use sea_orm::Database;
use tokio_util::sync::CancellationToken;
use tracing::info;

use hooki_core::config::Config;
use hooki_core::tracing::init_tracing;
use hooki_gateway::config::GatewayConfig;
use hooki_gateway::infra::events::{EventBusBackend, LocalEventBus, RedisEventBus};
use hooki_gateway::infra::http::HttpDeliveryClient;
use hooki_gateway::infra::rate_limit::{LocalRateLimiter, RateLimiterBackend, RedisRateLimiter};
use hooki_gateway::router::build_router;
use hooki_gateway::state::AppState;
use hooki_gateway::usecase::worker::{DeliveryWorker, WorkerSettings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("info,sqlx=warn");

    let config = GatewayConfig::from_env().context("load gateway config")?;

    let db = Database::connect(&config.database_url)
        .await
        .context("connect to database")?;

    let (limiter, events) = match &config.redis_url {
        Some(url) => {
            let pool = deadpool_redis::Config::from_url(url)
                .create_pool(Some(deadpool_redis::Runtime::Tokio1))
                .context("create Redis pool")?;
            let client = deadpool_redis::redis::Client::open(url.as_str())
                .context("open Redis client")?;
            (
                RateLimiterBackend::Redis(RedisRateLimiter { pool: pool.clone() }),
                EventBusBackend::Redis(RedisEventBus { pool, client }),
            )
        }
        None => {
            tracing::warn!("REDIS_URL not set; rate limits and live events are process-local");
            (
                RateLimiterBackend::Local(LocalRateLimiter::new()),
                EventBusBackend::Local(LocalEventBus::new()),
            )
        }
    };

    let shutdown = CancellationToken::new();
    let state = AppState {
        db,
        limiter,
        events,
        http: HttpDeliveryClient::new()?,
        config: Arc::new(config),
        shutdown: shutdown.clone(),
    };

    let worker = DeliveryWorker {
        engine: Arc::new(state.engine()),
        settings: WorkerSettings::from(state.config.as_ref()),
    };
    let worker = tokio::spawn(worker.run(shutdown.clone()));

    let addr = format!("0.0.0.0:{}", state.config.gateway_port);
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {addr}"))?;

    info!("gateway listening on {addr}");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            info!("shutting down");
            shutdown.cancel();
        })
        .await
        .context("server error")?;

    worker.await.context("delivery worker panicked")?;
    Ok(())
}
