//! Inlet Event Consumer Server
//!
//! Receives pushed deliveries from a pub/sub middleware and answers with
//! the status code that drives the middleware's ack/retry/dead-letter
//! decision. Provides a REST API for the subscription table, health,
//! stats, and warning management.
//!
//! ## Configuration
//!
//! - `INLET_PORT`: HTTP port (default: 8080)
//! - `INLET_TOPICS`: JSON array of topic configurations; built-in defaults
//!   when unset
//! - `INLET_DEAD_LETTER_ROUTE`: dead-letter route (default: /deadletter)
//! - `INLET_IDEMPOTENCY_CAPACITY`: bound on the processed-id set
//!   (default: 100000)
//! - `INLET_FAILURE_RATE`: inject simulated failures at this rate
//!   (0.0 - 1.0, default: off; demo only)
//! - `LOG_FORMAT` / `RUST_LOG`: logging output and filter

use std::sync::Arc;

use anyhow::Result;
use tokio::{net::TcpListener, signal};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use inlet_common::{ConsumerConfig, TopicConfig};
use inlet_consumer::{
    api::create_router, Dispatcher, FailurePlan, HealthService, HealthServiceConfig,
    IdempotencyTracker, LoggingSink, SimulatedHandler, StatsAggregator, TopicHandler,
    WarningService, WarningServiceConfig,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (for local development)
    let _ = dotenvy::dotenv();

    inlet_common::logging::init_logging("inlet-server");

    info!("Starting Inlet Event Consumer");

    let config = load_config()?;
    let port: u16 = std::env::var("INLET_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8080);

    let warning_service = Arc::new(WarningService::new(WarningServiceConfig::default()));
    let health_service = Arc::new(HealthService::new(
        HealthServiceConfig::default(),
        warning_service.clone(),
    ));
    let stats = Arc::new(StatsAggregator::new());
    let idempotency = Arc::new(IdempotencyTracker::new(config.idempotency_capacity));

    let dispatcher = Arc::new(build_dispatcher(
        config.clone(),
        stats,
        idempotency,
        warning_service.clone(),
    )?);

    let app = create_router(dispatcher.clone(), warning_service, health_service)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    log_startup_summary(&config, port);

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    info!(port = port, "Listening for deliveries");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutdown signal received...");
    dispatcher.shutdown();
    info!("Inlet Event Consumer shutdown complete");
    Ok(())
}

/// Load consumer configuration from environment variables.
fn load_config() -> Result<ConsumerConfig> {
    let topics = match std::env::var("INLET_TOPICS") {
        Ok(raw) => serde_json::from_str::<Vec<TopicConfig>>(&raw)
            .map_err(|e| anyhow::anyhow!("INLET_TOPICS is not valid JSON: {}", e))?,
        Err(_) => default_topics(),
    };

    let dead_letter_route = std::env::var("INLET_DEAD_LETTER_ROUTE")
        .unwrap_or_else(|_| "/deadletter".to_string());

    let idempotency_capacity = std::env::var("INLET_IDEMPOTENCY_CAPACITY")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(100_000);

    Ok(ConsumerConfig {
        topics,
        dead_letter_route,
        idempotency_capacity,
    })
}

/// Built-in topic set with distinct isolation tiers: a high-frequency
/// lightweight topic, a medium tier, and a low-frequency heavy tier.
fn default_topics() -> Vec<TopicConfig> {
    vec![
        TopicConfig {
            topic: "users".to_string(),
            route: "/events/users".to_string(),
            concurrency_limit: 50,
            avg_work_ms: 10,
            rate_limit_per_minute: None,
            consumer_group: None,
        },
        TopicConfig {
            topic: "orders".to_string(),
            route: "/events/orders".to_string(),
            concurrency_limit: 20,
            avg_work_ms: 40,
            rate_limit_per_minute: None,
            consumer_group: None,
        },
        TopicConfig {
            topic: "audit".to_string(),
            route: "/events/audit".to_string(),
            concurrency_limit: 5,
            avg_work_ms: 250,
            rate_limit_per_minute: Some(300),
            consumer_group: None,
        },
    ]
}

/// Build the dispatcher, optionally injecting simulated failures for demos.
fn build_dispatcher(
    config: ConsumerConfig,
    stats: Arc<StatsAggregator>,
    idempotency: Arc<IdempotencyTracker>,
    warning_service: Arc<WarningService>,
) -> Result<Dispatcher> {
    let failure_rate: f64 = std::env::var("INLET_FAILURE_RATE")
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|r| (0.0..=1.0).contains(r))
        .unwrap_or(0.0);

    let dispatcher = if failure_rate > 0.0 {
        info!(failure_rate = failure_rate, "Simulated failure injection enabled");
        let handlers = config
            .topics
            .iter()
            .map(|tc| {
                let handler: Arc<dyn TopicHandler> = Arc::new(
                    SimulatedHandler::from_config(tc).with_failure_plan(FailurePlan::Chance {
                        transient: failure_rate / 2.0,
                        permanent: failure_rate / 2.0,
                    }),
                );
                (tc.topic.clone(), handler)
            })
            .collect();
        Dispatcher::with_handlers(
            config,
            handlers,
            stats,
            idempotency,
            warning_service,
            Arc::new(LoggingSink),
        )?
    } else {
        Dispatcher::new(
            config,
            stats,
            idempotency,
            warning_service,
            Arc::new(LoggingSink),
        )?
    };

    Ok(dispatcher)
}

/// Log startup summary
fn log_startup_summary(config: &ConsumerConfig, port: u16) {
    info!("=== Inlet Event Consumer Startup Summary ===");
    for topic in &config.topics {
        info!(
            "  Topic [{}] -> {} (concurrency: {}, rate limit: {})",
            topic.topic,
            topic.route,
            topic.concurrency_limit,
            topic
                .rate_limit_per_minute
                .map(|r| format!("{}/min", r))
                .unwrap_or_else(|| "none".to_string()),
        );
    }
    info!("  Dead-letter route: {}", config.dead_letter_route);
    info!("  Idempotency capacity: {}", config.idempotency_capacity);
    info!("  API port: {}", port);
    info!("===========================================");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
