use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::error;

use super::domain::{Driver, DriverId, DriverStatus};
use super::error::{DriverServiceError, UpstreamError, ValidationErrors};
use super::store::DriverStore;
use super::vehicles::{Vehicle, VehicleGateway, VEHICLE_IN_USE};

/// Body of `POST /drivers/assign`. Supplying `vehicle_id` selects explicit
/// mode; omitting it lets the coordinator pick the first available vehicle
/// in listing order.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssignmentRequest {
    pub driver_id: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_opt_vehicle_id")]
    pub vehicle_id: Option<String>,
}

fn deserialize_opt_vehicle_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(id)) => Ok(Some(id)),
        Some(Value::Number(id)) => Ok(Some(id.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "vehicle_id must be a string or number, got {other}"
        ))),
    }
}

/// Links an available driver to a vehicle and keeps both resources' status
/// fields consistent without a shared transaction. The driver-side write
/// commits first (it is locally owned and cheap to reverse); the remote
/// vehicle write follows, and its failure triggers a compensating release.
pub struct AssignmentCoordinator<S, V> {
    store: Arc<S>,
    vehicles: Arc<V>,
}

impl<S, V> AssignmentCoordinator<S, V>
where
    S: DriverStore + 'static,
    V: VehicleGateway + 'static,
{
    pub fn new(store: Arc<S>, vehicles: Arc<V>) -> Self {
        Self { store, vehicles }
    }

    pub async fn assign(&self, request: AssignmentRequest) -> Result<Driver, DriverServiceError> {
        let driver_id = request.driver_id.map(DriverId).ok_or_else(|| {
            DriverServiceError::Validation(ValidationErrors::single("driver_id", "is required"))
        })?;

        // Steps with no side effects first: load, precondition, resolution.
        let driver = self
            .store
            .fetch(driver_id)?
            .ok_or(DriverServiceError::DriverNotFound)?;
        if driver.status != DriverStatus::Available {
            return Err(DriverServiceError::Conflict(
                "Driver is not available".to_string(),
            ));
        }

        let vehicle = self.resolve_vehicle(request.vehicle_id.as_deref()).await?;

        // Phase 1: local commit. The store's compare-and-set keeps two
        // racing assignments from both passing the availability check.
        let claimed = self.store.claim_available(driver_id, &vehicle.id)?;
        let mut compensations = CompensationStack::default();
        compensations.push(Compensation::ReleaseDriver(driver_id));

        // Phase 2: remote commit, a full replace preserving the fields read
        // during resolution.
        match self
            .vehicles
            .update(&vehicle.id, vehicle.update_with_status(VEHICLE_IN_USE))
            .await
        {
            Ok(()) => Ok(claimed),
            Err(cause) => {
                self.unwind(compensations)?;
                Err(DriverServiceError::Upstream(UpstreamError::Vehicles(cause)))
            }
        }
    }

    async fn resolve_vehicle(
        &self,
        requested: Option<&str>,
    ) -> Result<Vehicle, DriverServiceError> {
        match requested {
            Some(vehicle_id) => {
                let vehicle = self
                    .vehicles
                    .fetch(vehicle_id)
                    .await?
                    .ok_or(DriverServiceError::VehicleNotFound)?;
                if !vehicle.is_available() {
                    return Err(DriverServiceError::Conflict(
                        "Vehicle is not available".to_string(),
                    ));
                }
                Ok(vehicle)
            }
            None => {
                // Listing order is whatever the Vehicle Service returns; no
                // tie-break of our own.
                let vehicles = self.vehicles.list().await?;
                vehicles
                    .into_iter()
                    .find(Vehicle::is_available)
                    .ok_or_else(|| {
                        DriverServiceError::Conflict("No available vehicle found".to_string())
                    })
            }
        }
    }

    /// Run pending compensations newest-first. A failed compensation leaves
    /// the driver row disagreeing with the Vehicle Service and is surfaced
    /// as its own error rather than folded into the upstream failure.
    fn unwind(&self, stack: CompensationStack) -> Result<(), DriverServiceError> {
        for compensation in stack.0.into_iter().rev() {
            match compensation {
                Compensation::ReleaseDriver(driver_id) => {
                    if let Err(source) = self.store.release_vehicle(driver_id) {
                        error!(
                            driver = %driver_id,
                            %source,
                            "compensating release failed; driver row disagrees with the vehicle service"
                        );
                        return Err(DriverServiceError::CompensationFailed {
                            driver: driver_id,
                            source,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// One committed step's undo action.
#[derive(Debug)]
enum Compensation {
    ReleaseDriver(DriverId),
}

/// Undo actions for the steps committed so far, executed in reverse.
#[derive(Debug, Default)]
struct CompensationStack(Vec<Compensation>);

impl CompensationStack {
    fn push(&mut self, compensation: Compensation) {
        self.0.push(compensation);
    }
}
