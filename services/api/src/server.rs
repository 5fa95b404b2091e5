use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryDriverStore};
use crate::routes::with_driver_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use driver_service::config::AppConfig;
use driver_service::drivers::accounts::HttpAccountGateway;
use driver_service::drivers::router::DriverApi;
use driver_service::drivers::vehicles::HttpVehicleGateway;
use driver_service::drivers::{AssignmentCoordinator, DriverRegistry};
use driver_service::error::AppError;
use driver_service::telemetry;
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

    let store = Arc::new(InMemoryDriverStore::default());
    let vehicles = Arc::new(HttpVehicleGateway::new(
        config.collaborators.vehicle_base_url.clone(),
        config.collaborators.timeout,
    )?);
    let registry = match &config.collaborators.auth_base_url {
        Some(auth_url) => {
            let accounts = Arc::new(HttpAccountGateway::new(
                auth_url.clone(),
                config.collaborators.timeout,
            )?);
            DriverRegistry::with_provisioning(store.clone(), vehicles.clone(), accounts)
        }
        None => DriverRegistry::new(store.clone(), vehicles.clone()),
    };
    let api = DriverApi {
        registry: Arc::new(registry),
        assignments: Arc::new(AssignmentCoordinator::new(store, vehicles)),
    };

    let app = with_driver_routes(api)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "driver service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
