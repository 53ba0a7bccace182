use crate::cli::ServeArgs;
use crate::infra::{
    default_frequencies, default_rule_set, AppState, InMemoryInventoryRepository,
    InMemoryPolicyRepository,
};
use crate::routes::with_governance_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use model_governance::config::AppConfig;
use model_governance::error::AppError;
use model_governance::governance::GovernanceService;
use model_governance::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let inventory = Arc::new(InMemoryInventoryRepository::default());
    let policies = Arc::new(InMemoryPolicyRepository::default());
    let governance_service = Arc::new(
        GovernanceService::new(default_rule_set(), default_frequencies(), inventory, policies)
            .with_chunk_size(config.governance.apply_chunk_size),
    );

    let app = with_governance_routes(governance_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "model governance service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
