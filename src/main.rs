use std::sync::Arc;
use std::time::Duration;

use axum::{routing::delete, routing::get, routing::post, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use breed_classify::app_state::AppState;
use breed_classify::config::AppConfig;
use breed_classify::models::payload::MAX_UPLOAD_BYTES;
use breed_classify::routes;
use breed_classify::services::classifier::{Classifier, HttpClassifier};
use breed_classify::services::controller::{ControllerOptions, JobController};
use breed_classify::services::history::HistoryStore;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing breed-classify server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_histogram!(
        "classification_processing_seconds",
        "Time from submission to a terminal job state"
    );
    metrics::describe_counter!(
        "classification_jobs_submitted",
        "Total classification jobs submitted"
    );
    metrics::describe_counter!(
        "classification_jobs_completed",
        "Total classification jobs that succeeded"
    );
    metrics::describe_counter!(
        "classification_jobs_failed",
        "Total classification jobs that failed"
    );
    metrics::describe_counter!(
        "classification_jobs_cancelled",
        "Total classification jobs cancelled by the user"
    );
    metrics::describe_gauge!(
        "classification_history_records",
        "Current number of records in the history store"
    );

    // Initialize classifier client
    tracing::info!(url = %config.classifier_url, "Initializing classifier client");
    let classifier: Arc<dyn Classifier> = Arc::new(HttpClassifier::new(
        &config.classifier_url,
        &config.classifier_api_token,
    ));

    // Initialize history store and job controller
    let history = Arc::new(HistoryStore::new());
    let controller = JobController::with_options(
        classifier.clone(),
        history.clone(),
        ControllerOptions {
            timeout: Duration::from_secs(config.job_timeout_secs),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        },
    );

    // Create shared application state
    let state = AppState::new(controller, history, classifier);

    // Build API routes
    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route(
            "/api/v1/classify",
            get(routes::classify::get_job).post(routes::classify::submit_classification),
        )
        .route("/api/v1/classify/cancel", post(routes::classify::cancel_job))
        .route("/api/v1/classify/reset", post(routes::classify::reset_job))
        .route("/api/v1/history", get(routes::history::list_history))
        .route("/api/v1/history/export", get(routes::history::export_history))
        .route("/api/v1/history/{id}", delete(routes::history::delete_record))
        .with_state(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(MAX_UPLOAD_BYTES));

    tracing::info!("Starting breed-classify on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
