use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use super::accounts::AccountGateway;
use super::assignment::{AssignmentCoordinator, AssignmentRequest};
use super::domain::{Driver, DriverDraft, DriverId, DriverUpdate};
use super::error::DriverServiceError;
use super::lifecycle::DriverRegistry;
use super::store::DriverStore;
use super::vehicles::VehicleGateway;

/// Shared handler state: the lifecycle service plus the assignment
/// coordinator over the same store.
pub struct DriverApi<S, V, A> {
    pub registry: Arc<DriverRegistry<S, V, A>>,
    pub assignments: Arc<AssignmentCoordinator<S, V>>,
}

impl<S, V, A> Clone for DriverApi<S, V, A> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            assignments: Arc::clone(&self.assignments),
        }
    }
}

/// Router builder exposing the driver CRUD and assignment endpoints.
pub fn driver_router<S, V, A>(api: DriverApi<S, V, A>) -> Router
where
    S: DriverStore + 'static,
    V: VehicleGateway + 'static,
    A: AccountGateway + 'static,
{
    Router::new()
        .route(
            "/drivers",
            get(list_handler::<S, V, A>).post(create_handler::<S, V, A>),
        )
        .route("/drivers/assign", post(assign_handler::<S, V, A>))
        .route(
            "/drivers/:id",
            get(get_handler::<S, V, A>)
                .put(update_handler::<S, V, A>)
                .delete(delete_handler::<S, V, A>),
        )
        .with_state(api)
}

pub(crate) async fn list_handler<S, V, A>(
    State(api): State<DriverApi<S, V, A>>,
) -> Result<Response, DriverServiceError>
where
    S: DriverStore + 'static,
    V: VehicleGateway + 'static,
    A: AccountGateway + 'static,
{
    let drivers = api.registry.list()?;
    let views: Vec<_> = drivers.iter().map(Driver::view).collect();
    Ok(Json(views).into_response())
}

pub(crate) async fn create_handler<S, V, A>(
    State(api): State<DriverApi<S, V, A>>,
    Json(draft): Json<DriverDraft>,
) -> Result<Response, DriverServiceError>
where
    S: DriverStore + 'static,
    V: VehicleGateway + 'static,
    A: AccountGateway + 'static,
{
    let driver = api.registry.create(draft).await?;
    Ok((StatusCode::CREATED, Json(driver.view())).into_response())
}

pub(crate) async fn get_handler<S, V, A>(
    State(api): State<DriverApi<S, V, A>>,
    Path(id): Path<u64>,
) -> Result<Response, DriverServiceError>
where
    S: DriverStore + 'static,
    V: VehicleGateway + 'static,
    A: AccountGateway + 'static,
{
    let driver = api.registry.get(DriverId(id))?;
    Ok(Json(driver.view()).into_response())
}

pub(crate) async fn update_handler<S, V, A>(
    State(api): State<DriverApi<S, V, A>>,
    Path(id): Path<u64>,
    Json(update): Json<DriverUpdate>,
) -> Result<Response, DriverServiceError>
where
    S: DriverStore + 'static,
    V: VehicleGateway + 'static,
    A: AccountGateway + 'static,
{
    let driver = api.registry.update(DriverId(id), update).await?;
    Ok(Json(driver.view()).into_response())
}

pub(crate) async fn delete_handler<S, V, A>(
    State(api): State<DriverApi<S, V, A>>,
    Path(id): Path<u64>,
) -> Result<Response, DriverServiceError>
where
    S: DriverStore + 'static,
    V: VehicleGateway + 'static,
    A: AccountGateway + 'static,
{
    api.registry.delete(DriverId(id))?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub(crate) async fn assign_handler<S, V, A>(
    State(api): State<DriverApi<S, V, A>>,
    Json(request): Json<AssignmentRequest>,
) -> Result<Response, DriverServiceError>
where
    S: DriverStore + 'static,
    V: VehicleGateway + 'static,
    A: AccountGateway + 'static,
{
    let driver = api.assignments.assign(request).await?;
    Ok(Json(driver.view()).into_response())
}
