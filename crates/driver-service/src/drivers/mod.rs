//! Driver records, their lifecycle, and the cross-service assignment saga.
//!
//! The store owns driver rows; vehicles are owned by the external Vehicle
//! Service and referenced here only by id. Assignment links the two with an
//! ordered pair of local-then-remote commits and a compensating release for
//! the remote step.

pub mod accounts;
pub mod assignment;
pub mod domain;
pub mod error;
pub mod lifecycle;
pub mod router;
pub mod store;
pub mod vehicles;

#[cfg(test)]
mod tests;

pub use accounts::{AccountGateway, AccountGatewayError, AccountRegistration, HttpAccountGateway};
pub use assignment::{AssignmentCoordinator, AssignmentRequest};
pub use domain::{Driver, DriverDraft, DriverId, DriverStatus, DriverUpdate, DriverView};
pub use error::{DriverServiceError, UpstreamError, ValidationErrors};
pub use lifecycle::DriverRegistry;
pub use router::{driver_router, DriverApi};
pub use store::{DriverChange, DriverStore, NewDriver, StoreError, UniqueClaims, UniqueField};
pub use vehicles::{
    HttpVehicleGateway, Vehicle, VehicleGateway, VehicleGatewayError, VehicleUpdate,
    VEHICLE_AVAILABLE, VEHICLE_IN_USE,
};
