//! Consumer HTTP API
//!
//! HTTP endpoints consumed by the pub/sub middleware and by operators:
//! - Subscription table (`GET /subscribe`)
//! - One delivery route per configured topic (registered dynamically)
//! - Dead-letter route
//! - Health and Kubernetes probes
//! - Stats snapshot and monitoring
//! - Warning management
//!
//! The delivery routes answer with the status code as the sole signal:
//! 200 acks the message, any non-2xx asks the middleware to redeliver.
//! Delivery routes come from runtime configuration and are therefore not
//! listed in the OpenAPI document.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::warn;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use inlet_common::{
    Disposition, HealthStatus, MessageEnvelope, SubscriptionSpec, Warning, WarningCategory,
    WarningSeverity,
};

use crate::dispatcher::Dispatcher;
use crate::health::HealthService;
use crate::warning::WarningService;

pub mod model;

use model::{
    AcknowledgeResponse, MonitoringResponse, ProbeResponse, SimpleHealthResponse, WarningsQuery,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub warning_service: Arc<WarningService>,
    pub health_service: Arc<HealthService>,
    pub started_at: Instant,
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Inlet Event Consumer API",
        version = "0.1.0",
        description = "Push-delivery event consumer: per-topic delivery routes, health, stats, and warning management"
    ),
    paths(
        subscribe_handler,
        health_handler,
        liveness_probe,
        readiness_probe,
        metrics_handler,
        monitoring_handler,
        list_warnings,
        acknowledge_warning,
    ),
    components(schemas(
        SimpleHealthResponse,
        ProbeResponse,
        MonitoringResponse,
        WarningsQuery,
        AcknowledgeResponse,
        inlet_common::MessageEnvelope,
        inlet_common::SubscriptionSpec,
        inlet_common::SubscriptionMetadata,
        inlet_common::StatsSnapshot,
        inlet_common::StatsSummary,
        inlet_common::TopicStats,
        inlet_common::TopicPoolStats,
        inlet_common::HealthReport,
        inlet_common::HealthStatus,
        inlet_common::Warning,
        inlet_common::WarningCategory,
        inlet_common::WarningSeverity,
    )),
    tags(
        (name = "subscriptions", description = "Subscription table for the middleware"),
        (name = "health", description = "Health check endpoints"),
        (name = "monitoring", description = "Monitoring and stats endpoints"),
        (name = "warnings", description = "Warning management endpoints"),
    )
)]
pub struct ApiDoc;

/// Create the full router with all endpoints.
///
/// Delivery routes and the dead-letter route are registered from the
/// dispatcher's static configuration.
pub fn create_router(
    dispatcher: Arc<Dispatcher>,
    warning_service: Arc<WarningService>,
    health_service: Arc<HealthService>,
) -> Router {
    let state = AppState {
        dispatcher: dispatcher.clone(),
        warning_service,
        health_service,
        started_at: Instant::now(),
    };

    let mut router = Router::new()
        // Swagger UI
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        // Subscription table
        .route("/subscribe", get(subscribe_handler))
        // Basic health
        .route("/health", get(health_handler))
        // Kubernetes probes
        .route("/health/live", get(liveness_probe))
        .route("/health/ready", get(readiness_probe))
        // Stats snapshot
        .route("/metrics", get(metrics_handler))
        // Detailed monitoring
        .route("/monitoring", get(monitoring_handler))
        // Warnings management
        .route("/warnings", get(list_warnings))
        .route("/warnings/{id}/acknowledge", post(acknowledge_warning));

    // Per-topic delivery routes from static configuration
    for (route, topic) in dispatcher.routes() {
        router = router.route(
            route.as_str(),
            post(
                move |state: State<AppState>,
                      payload: Result<Json<MessageEnvelope>, JsonRejection>| {
                    let topic = topic.clone();
                    async move { deliver_handler(state, topic, payload).await }
                },
            ),
        );
    }

    let dead_letter_route = dispatcher.dead_letter_route().to_string();
    router = router.route(dead_letter_route.as_str(), post(dead_letter_handler));

    router.with_state(state)
}

fn status_for(disposition: Disposition) -> StatusCode {
    match disposition {
        Disposition::Ack => StatusCode::OK,
        Disposition::Retry => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ============================================================================
// Delivery Endpoints
// ============================================================================

/// Handle one pushed delivery for a topic route.
async fn deliver_handler(
    State(state): State<AppState>,
    topic: String,
    payload: Result<Json<MessageEnvelope>, JsonRejection>,
) -> StatusCode {
    let envelope = match payload {
        Ok(Json(envelope)) => envelope,
        Err(rejection) => {
            // A body that cannot parse will never parse; ack so the
            // middleware stops redelivering it
            warn!(
                topic = %topic,
                error = %rejection,
                "Rejecting malformed envelope, acknowledging to stop redelivery"
            );
            state.warning_service.add_warning(
                WarningCategory::Configuration,
                WarningSeverity::Error,
                format!("Malformed envelope on topic [{}]: {}", topic, rejection),
                "api".to_string(),
            );
            return StatusCode::OK;
        }
    };

    status_for(state.dispatcher.deliver(&topic, envelope).await)
}

/// Handle a dead-lettered delivery. Always responds 200.
async fn dead_letter_handler(
    State(state): State<AppState>,
    payload: Result<Json<MessageEnvelope>, JsonRejection>,
) -> StatusCode {
    match payload {
        Ok(Json(envelope)) => {
            let _ = state.dispatcher.dead_letter(&envelope).await;
        }
        Err(rejection) => {
            warn!(error = %rejection, "Malformed dead-letter envelope");
            state.warning_service.add_warning(
                WarningCategory::DeadLetter,
                WarningSeverity::Error,
                format!("Malformed dead-letter envelope: {}", rejection),
                "api".to_string(),
            );
        }
    }
    StatusCode::OK
}

// ============================================================================
// Subscription Endpoint
// ============================================================================

/// Subscription table: which route handles which topic, at what tier
#[utoipa::path(
    get,
    path = "/subscribe",
    tag = "subscriptions",
    responses(
        (status = 200, description = "Subscription table", body = Vec<SubscriptionSpec>)
    )
)]
async fn subscribe_handler(State(state): State<AppState>) -> Json<Vec<SubscriptionSpec>> {
    Json(state.dispatcher.subscriptions())
}

// ============================================================================
// Health Endpoints
// ============================================================================

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Health status", body = SimpleHealthResponse)
    )
)]
async fn health_handler(State(state): State<AppState>) -> Json<SimpleHealthResponse> {
    let report = state
        .health_service
        .report(&state.dispatcher.pool_stats(), &state.dispatcher.stats().snapshot());

    let status = match report.status {
        HealthStatus::Healthy | HealthStatus::Warning => "UP",
        HealthStatus::Degraded => "DEGRADED",
    };

    Json(SimpleHealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

/// Kubernetes liveness probe - returns 200 if the application is running
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "health",
    responses(
        (status = 200, description = "Application is live", body = ProbeResponse)
    )
)]
async fn liveness_probe() -> Json<ProbeResponse> {
    Json(ProbeResponse {
        status: "LIVE".to_string(),
    })
}

/// Kubernetes readiness probe - returns 200 if ready to accept deliveries
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "health",
    responses(
        (status = 200, description = "Application is ready", body = ProbeResponse),
        (status = 503, description = "Application is not ready", body = ProbeResponse)
    )
)]
async fn readiness_probe(State(state): State<AppState>) -> Response {
    let report = state
        .health_service
        .report(&state.dispatcher.pool_stats(), &state.dispatcher.stats().snapshot());

    match report.status {
        HealthStatus::Healthy | HealthStatus::Warning => (
            StatusCode::OK,
            Json(ProbeResponse {
                status: "READY".to_string(),
            }),
        )
            .into_response(),
        HealthStatus::Degraded => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ProbeResponse {
                status: "NOT_READY".to_string(),
            }),
        )
            .into_response(),
    }
}

// ============================================================================
// Monitoring Endpoints
// ============================================================================

/// Stats snapshot: per-topic counters plus derived rates
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "monitoring",
    responses(
        (status = 200, description = "Stats snapshot", body = inlet_common::StatsSnapshot)
    )
)]
async fn metrics_handler(State(state): State<AppState>) -> Json<inlet_common::StatsSnapshot> {
    Json(state.dispatcher.stats().snapshot())
}

/// Detailed monitoring information
#[utoipa::path(
    get,
    path = "/monitoring",
    tag = "monitoring",
    responses(
        (status = 200, description = "Monitoring data", body = MonitoringResponse)
    )
)]
async fn monitoring_handler(State(state): State<AppState>) -> Json<MonitoringResponse> {
    let pool_stats = state.dispatcher.pool_stats();
    let snapshot = state.dispatcher.stats().snapshot();
    let health_report = state.health_service.report(&pool_stats, &snapshot);

    let status = match health_report.status {
        HealthStatus::Healthy => "HEALTHY",
        HealthStatus::Warning => "WARNING",
        HealthStatus::Degraded => "DEGRADED",
    };

    Json(MonitoringResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_warnings: state.warning_service.unacknowledged_count() as u32,
        critical_warnings: state.warning_service.critical_count() as u32,
        health_report,
        pool_stats,
        stats: snapshot.summary,
    })
}

// ============================================================================
// Warning Endpoints
// ============================================================================

/// List warnings, optionally filtered by severity and acknowledged status
#[utoipa::path(
    get,
    path = "/warnings",
    tag = "warnings",
    params(
        ("severity" = Option<String>, Query, description = "INFO, WARN, ERROR or CRITICAL"),
        ("acknowledged" = Option<bool>, Query, description = "Filter by acknowledged status")
    ),
    responses(
        (status = 200, description = "Warnings", body = Vec<Warning>)
    )
)]
async fn list_warnings(
    State(state): State<AppState>,
    Query(query): Query<WarningsQuery>,
) -> Json<Vec<Warning>> {
    let mut warnings = match query.severity.as_deref().map(str::to_uppercase) {
        Some(s) => {
            let severity = match s.as_str() {
                "INFO" => WarningSeverity::Info,
                "WARN" | "WARNING" => WarningSeverity::Warn,
                "ERROR" => WarningSeverity::Error,
                "CRITICAL" => WarningSeverity::Critical,
                _ => return Json(Vec::new()),
            };
            state.warning_service.get_warnings_by_severity(severity)
        }
        None => state.warning_service.get_all_warnings(),
    };

    if let Some(acknowledged) = query.acknowledged {
        warnings.retain(|w| w.acknowledged == acknowledged);
    }

    warnings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Json(warnings)
}

/// Acknowledge a warning
#[utoipa::path(
    post,
    path = "/warnings/{id}/acknowledge",
    tag = "warnings",
    params(
        ("id" = String, Path, description = "Warning id")
    ),
    responses(
        (status = 200, description = "Warning acknowledged", body = AcknowledgeResponse),
        (status = 404, description = "Warning not found", body = AcknowledgeResponse)
    )
)]
async fn acknowledge_warning(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    if state.warning_service.acknowledge_warning(&id) {
        (StatusCode::OK, Json(AcknowledgeResponse { acknowledged: true })).into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(AcknowledgeResponse {
                acknowledged: false,
            }),
        )
            .into_response()
    }
}
