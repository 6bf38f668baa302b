use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{Request, Response, StatusCode};
use opentelemetry::KeyValue;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::{MakeSpan, OnResponse, TraceLayer},
};
use tracing::Span;

use report_weaver::browser::{ChromeSessionFactory, SessionFactory, SessionRegistry};
use report_weaver::config::PipelineSettings;
use report_weaver::documents::{DocumentPublisher, GoogleDocsPublisher, UnconfiguredPublisher};
use report_weaver::download::LocalFileSystem;
use report_weaver::jobs::ReportRunner;
use report_weaver::notify::StatusNotifier;
use report_weaver::pipeline::ReportOrchestrator;
use report_weaver::telemetry::{HTTP_REQUEST_DURATION, HTTP_REQUESTS_TOTAL, init_telemetry};
use report_weaver::{AppState, Config, routes};

#[derive(Clone)]
struct HttpMakeSpan;

impl<B> MakeSpan<B> for HttpMakeSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let method = request.method().as_str();
        let path = request.uri().path();

        tracing::info_span!(
            "HTTP request",
            otel.name = %format!("{} {}", method, path),
            http.method = %method,
            http.route = %path,
            http.target = %request.uri(),
            http.request_id = request.headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or(""),
            http.user_agent = request.headers()
                .get("user-agent")
                .and_then(|v| v.to_str().ok())
                .unwrap_or(""),
            http.response.status_code = tracing::field::Empty,
            otel.status_code = tracing::field::Empty,
        )
    }
}

#[derive(Clone)]
struct HttpOnResponse;

impl<B> OnResponse<B> for HttpOnResponse {
    fn on_response(self, response: &Response<B>, latency: Duration, span: &Span) {
        let status = response.status().as_u16();

        span.record("http.response.status_code", status as i64);

        if status >= 500 {
            span.record("otel.status_code", "ERROR");
        } else {
            span.record("otel.status_code", "OK");
        }

        let latency_ms = latency.as_secs_f64() * 1000.0;
        let status_class = format!("{}xx", status / 100);

        HTTP_REQUESTS_TOTAL.add(
            1,
            &[
                KeyValue::new("http.status_code", status.to_string()),
                KeyValue::new("http.status_class", status_class.clone()),
            ],
        );

        HTTP_REQUEST_DURATION.record(
            latency_ms,
            &[
                KeyValue::new("http.status_code", status.to_string()),
                KeyValue::new("http.status_class", status_class),
            ],
        );

        tracing::info!(
            http.response.status_code = status,
            latency_ms = latency_ms,
            "finished processing request"
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    let telemetry_guard = init_telemetry(&config)?;

    tracing::info!(
        port = config.port,
        environment = %config.environment,
        portal = %config.portal_url,
        "Starting report-weaver"
    );

    tokio::fs::create_dir_all(&config.download_dir).await?;

    let notifier = StatusNotifier::default();
    let registry = SessionRegistry::new();

    let factory: Arc<dyn SessionFactory> = Arc::new(ChromeSessionFactory::new(
        config.browser_headless,
        config.browser_executable.clone(),
        config.download_dir.clone(),
    ));

    let documents: Arc<dyn DocumentPublisher> = match config.google_access_token.as_deref() {
        Some(token) if !token.trim().is_empty() => {
            Arc::new(GoogleDocsPublisher::new(token, notifier.clone()))
        }
        _ => {
            tracing::warn!("GOOGLE_ACCESS_TOKEN not set, reports will not be published");
            Arc::new(UnconfiguredPublisher)
        }
    };

    tracing::info!(
        publisher = documents.name(),
        download_dir = %config.download_dir.display(),
        workers = config.worker_pool_size,
        "Report pipeline initialized"
    );

    let orchestrator = ReportOrchestrator::new(
        factory,
        registry.clone(),
        Arc::new(LocalFileSystem),
        documents,
        notifier.clone(),
        PipelineSettings::from(&config),
    );
    let runner = ReportRunner::new(Arc::new(orchestrator), config.worker_pool_size);

    let state = AppState {
        config: config.clone(),
        runner: runner.clone(),
        registry: registry.clone(),
        notifier,
    };

    // Handlers answer with 503 at the request deadline; the layer only
    // guards against anything that outlives it.
    let hard_deadline = config.request_timeout() + Duration::from_secs(30);

    let app = routes::create_router(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(HttpMakeSpan)
                .on_response(HttpOnResponse),
        )
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            hard_deadline,
        ))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(%addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(runner.clone()))
        .await?;

    let sessions = registry.close_all().await;
    tracing::info!(sessions, "Server shutdown complete");
    telemetry_guard.shutdown();

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM. In-flight runs are cancelled first.
async fn shutdown_signal(runner: ReportRunner) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    let runs = runner.cancel_all();
    tracing::info!(runs, "Shutdown signal received");
}
